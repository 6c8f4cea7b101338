use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::learning::codec::{
    as_object, bump, bump_nested, decode_counts, decode_nested, encode_counts, encode_nested,
    encode_time, get_time, get_u64, truncate_millis, CountMap, DecodeResult, NestedCountMap,
};
use crate::learning::config::{HybridWeights, LearningToggles, StrategyConfig};
use crate::learning::sampling::{uniform_key, weighted_pick, WeightedPool};
use crate::learning::types::{Currency, Phrase, ResolvedStrategy, Strategy, WordCount};
use crate::wordlist::Wordlist;

/// Word frequency, per-position frequency, and adjacent-pair statistics learned from successes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicLearningState {
    pub word_frequency: CountMap,
    pub position_preferences: NestedCountMap<usize>,
    pub word_pairs: NestedCountMap<String>,
    pub total_successes: u64,
    pub total_attempts: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicStats {
    pub success_rate: f64,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub learned_words: usize,
    pub learned_positions: usize,
    pub learned_pairs: usize,
    pub unexplored_words: usize,
    pub recommended_strategy: Strategy,
    /// Successes per thousand attempts.
    pub efficiency: f64,
}

impl BasicLearningState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_data(&self) -> bool {
        !self.word_frequency.is_empty()
            || !self.position_preferences.is_empty()
            || !self.word_pairs.is_empty()
    }

    pub fn learn(&mut self, phrase: &Phrase, currency: Currency, usd_value: f64) {
        debug!(%currency, usd_value, words = phrase.len(), "learning from success");
        self.learn_with(phrase, LearningToggles::default(), Utc::now());
    }

    pub fn learn_with(&mut self, phrase: &Phrase, toggles: LearningToggles, now: DateTime<Utc>) {
        let words = phrase.words();
        for (i, word) in words.iter().enumerate() {
            if toggles.frequency {
                bump(&mut self.word_frequency, word);
            }
            if toggles.positional {
                bump_nested(&mut self.position_preferences, i, word);
            }
        }
        if toggles.correlation {
            for pair in words.windows(2) {
                bump_nested(&mut self.word_pairs, pair[0].clone(), &pair[1]);
            }
        }
        self.total_successes = self.total_successes.saturating_add(1);
        self.last_updated = Some(truncate_millis(now));
    }

    pub fn record_attempts(&mut self, n: u64) {
        self.total_attempts = self.total_attempts.saturating_add(n);
    }

    pub fn resolve(&self, strategy: Strategy, config: &StrategyConfig) -> ResolvedStrategy {
        strategy.resolve(self.total_successes, &config.auto_switch)
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        strategy: Strategy,
        word_count: WordCount,
        config: &StrategyConfig,
        wordlist: &Wordlist,
        rng: &mut R,
    ) -> Phrase {
        let resolved = self.resolve(strategy, config);
        self.generate_resolved(resolved, word_count, &config.hybrid_weights, wordlist, rng)
    }

    pub fn generate_resolved<R: Rng + ?Sized>(
        &self,
        strategy: ResolvedStrategy,
        word_count: WordCount,
        weights: &HybridWeights,
        wordlist: &Wordlist,
        rng: &mut R,
    ) -> Phrase {
        let n = word_count.get();
        let words = match strategy {
            ResolvedStrategy::Random => random_words(n, wordlist, rng),
            ResolvedStrategy::Frequency => self.frequency_words(n, wordlist, rng),
            ResolvedStrategy::Positional => self.positional_words(n, wordlist, rng),
            ResolvedStrategy::Correlated => {
                let start = uniform_key(&self.word_frequency, rng)
                    .or_else(|| uniform_key(&self.word_pairs, rng))
                    .map(str::to_string);
                match start {
                    Some(start) => self.chain_from(start, n, wordlist, rng),
                    None => random_words(n, wordlist, rng),
                }
            }
            ResolvedStrategy::Hybrid => self.hybrid_words(n, weights, wordlist, rng),
        };
        into_phrase(words)
    }

    /// Order-1 Markov walk over the pair table starting from `start`.
    pub fn generate_correlated_from<R: Rng + ?Sized>(
        &self,
        start: &str,
        word_count: WordCount,
        wordlist: &Wordlist,
        rng: &mut R,
    ) -> Phrase {
        into_phrase(self.chain_from(start.to_string(), word_count.get(), wordlist, rng))
    }

    fn chain_from<R: Rng + ?Sized>(
        &self,
        start: String,
        n: usize,
        wordlist: &Wordlist,
        rng: &mut R,
    ) -> Vec<String> {
        let mut words = Vec::with_capacity(n);
        words.push(start);
        while words.len() < n {
            let next = words
                .last()
                .and_then(|prev| self.word_pairs.get(prev))
                .and_then(|successors| weighted_pick(successors, rng))
                .map(str::to_string)
                .unwrap_or_else(|| wordlist.random_word(rng).to_string());
            words.push(next);
        }
        words
    }

    fn frequency_words<R: Rng + ?Sized>(
        &self,
        n: usize,
        wordlist: &Wordlist,
        rng: &mut R,
    ) -> Vec<String> {
        if self.word_frequency.is_empty() {
            return random_words(n, wordlist, rng);
        }
        let mut pool = WeightedPool::from_counts(&self.word_frequency);
        let shortfall = (n as u64).saturating_sub(pool.total());
        for _ in 0..shortfall {
            pool.push(wordlist.random_word(rng).to_string(), 1);
        }
        (0..n)
            .map(|_| {
                pool.pick(rng)
                    .map(str::to_string)
                    .unwrap_or_else(|| wordlist.random_word(rng).to_string())
            })
            .collect()
    }

    fn positional_words<R: Rng + ?Sized>(
        &self,
        n: usize,
        wordlist: &Wordlist,
        rng: &mut R,
    ) -> Vec<String> {
        (0..n)
            .map(|i| {
                self.position_preferences
                    .get(&i)
                    .and_then(|counts| weighted_pick(counts, rng))
                    .map(str::to_string)
                    .unwrap_or_else(|| wordlist.random_word(rng).to_string())
            })
            .collect()
    }

    fn hybrid_words<R: Rng + ?Sized>(
        &self,
        n: usize,
        weights: &HybridWeights,
        wordlist: &Wordlist,
        rng: &mut R,
    ) -> Vec<String> {
        let pool = WeightedPool::from_counts(&self.word_frequency);
        let mut words: Vec<String> = Vec::with_capacity(n);
        for i in 0..n {
            let roll: f64 = rng.random();
            let drawn = if roll < weights.positional {
                self.position_preferences
                    .get(&i)
                    .and_then(|counts| weighted_pick(counts, rng))
            } else if roll < weights.positional + weights.correlation {
                words
                    .last()
                    .and_then(|prev| self.word_pairs.get(prev))
                    .and_then(|successors| weighted_pick(successors, rng))
            } else {
                pool.pick(rng)
            };
            let word = match drawn {
                Some(w) => w.to_string(),
                None => wordlist.random_word(rng).to_string(),
            };
            words.push(word);
        }
        words
    }

    pub fn learned_pair_count(&self) -> usize {
        self.word_pairs.values().map(HashMap::len).sum()
    }

    pub fn unexplored_words(&self, wordlist: &Wordlist) -> usize {
        wordlist
            .words()
            .filter(|w| !self.word_frequency.contains_key(*w))
            .count()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.total_successes as f64 / self.total_attempts as f64
        }
    }

    pub fn stats(&self, config: &StrategyConfig, wordlist: &Wordlist) -> BasicStats {
        let success_rate = self.success_rate();
        BasicStats {
            success_rate,
            total_attempts: self.total_attempts,
            total_successes: self.total_successes,
            learned_words: self.word_frequency.len(),
            learned_positions: self.position_preferences.len(),
            learned_pairs: self.learned_pair_count(),
            unexplored_words: self.unexplored_words(wordlist),
            recommended_strategy: self.resolve(Strategy::Adaptive, config).as_strategy(),
            efficiency: success_rate * 1000.0,
        }
    }

    /// Multiply every count by `factor`, truncating; entries reaching zero are pruned.
    pub fn scale_counts(&mut self, factor: f64) {
        let factor = factor.max(0.0);
        scale_map(&mut self.word_frequency, factor);
        for inner in self.position_preferences.values_mut() {
            scale_map(inner, factor);
        }
        self.position_preferences.retain(|_, inner| !inner.is_empty());
        for inner in self.word_pairs.values_mut() {
            scale_map(inner, factor);
        }
        self.word_pairs.retain(|_, inner| !inner.is_empty());
    }

    pub fn to_json(&self) -> Value {
        json!({
            "wordFrequency": encode_counts(&self.word_frequency),
            "positionPreferences": encode_nested(&self.position_preferences),
            "wordPairs": encode_nested(&self.word_pairs),
            "totalSuccesses": self.total_successes,
            "totalAttempts": self.total_attempts,
            "lastUpdated": self.last_updated.as_ref().map(encode_time),
        })
    }

    pub fn from_json(value: &Value) -> DecodeResult<Self> {
        let obj = as_object(value, "basic learning state")?;
        Ok(Self {
            word_frequency: decode_counts(obj.get("wordFrequency"), "wordFrequency")?,
            position_preferences: decode_nested(
                obj.get("positionPreferences"),
                "positionPreferences",
            )?,
            word_pairs: decode_nested(obj.get("wordPairs"), "wordPairs")?,
            total_successes: get_u64(obj, "totalSuccesses")?,
            total_attempts: get_u64(obj, "totalAttempts")?,
            last_updated: get_time(obj, "lastUpdated")?,
        })
    }
}

fn scale_map(map: &mut CountMap, factor: f64) {
    for count in map.values_mut() {
        *count = (*count as f64 * factor).floor().max(0.0) as u64;
    }
    map.retain(|_, count| *count > 0);
}

pub(crate) fn random_words<R: Rng + ?Sized>(
    n: usize,
    wordlist: &Wordlist,
    rng: &mut R,
) -> Vec<String> {
    (0..n).map(|_| wordlist.random_word(rng).to_string()).collect()
}

pub(crate) fn into_phrase(words: Vec<String>) -> Phrase {
    Phrase::from_generated(words)
}
