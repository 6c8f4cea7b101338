use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::learning::basic::{into_phrase, random_words};
use crate::learning::codec::{
    as_object, bump, bump_nested, decode_counts, decode_keyed_counts, decode_nested,
    decode_scores, decode_time, decode_timestamps, encode_counts, encode_keyed_counts,
    encode_nested, encode_scores, encode_time, encode_timestamps, get_f64, get_time, get_u64,
    truncate_millis, CountMap, DecodeResult, NestedCountMap,
};
use crate::learning::config::AdvancedConfig;
use crate::learning::sampling::weighted_pick;
use crate::learning::types::{Currency, Phrase, Strategy, WordCount};
use crate::wordlist::Wordlist;

const PATTERN_PREFIX_LEN: usize = 3;
const CHECKSUM_PREFIX_LEN: usize = 11;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSuccess {
    pub phrase: String,
    pub currency: Currency,
    pub usd_value: f64,
    pub word_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// N-gram transition tables plus pattern age/score bookkeeping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdvancedLearningState {
    pub bigrams: NestedCountMap<String>,
    pub trigrams: NestedCountMap<String>,
    pub quadgrams: NestedCountMap<String>,
    pub first_word_frequency: CountMap,
    pub last_word_frequency: CountMap,
    pub checksum_patterns: NestedCountMap<String>,
    pub position_frequency: NestedCountMap<usize>,
    pub pattern_ages: HashMap<String, DateTime<Utc>>,
    pub pattern_scores: HashMap<String, f64>,
    /// Last time decay was applied to a pattern; decay only covers time after this stamp.
    pub pattern_decayed_at: HashMap<String, DateTime<Utc>>,
    pub word_length_distribution: HashMap<usize, u64>,
    pub average_word_length: f64,
    pub phrase_entropy: f64,
    pub success_by_word_count: HashMap<usize, u64>,
    pub recent_successes: VecDeque<RecentSuccess>,
    pub total_successes: u64,
    pub total_attempts: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub config: AdvancedConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedStats {
    pub bigrams: usize,
    pub trigrams: usize,
    pub quadgrams: usize,
    pub word_position_variety: usize,
    pub active_patterns: usize,
    pub average_pattern_score: f64,
    pub checksum_patterns: usize,
    pub average_word_length: f64,
    pub phrase_entropy: f64,
    pub success_by_word_count: HashMap<usize, u64>,
    pub recent_successes: usize,
}

impl AdvancedLearningState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AdvancedConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn has_ngrams(&self) -> bool {
        !self.bigrams.is_empty()
    }

    pub fn learn_advanced(&mut self, phrase: &Phrase, currency: Currency, usd_value: f64) {
        self.learn_advanced_at(phrase, currency, usd_value, Utc::now());
    }

    pub fn learn_advanced_at(
        &mut self,
        phrase: &Phrase,
        currency: Currency,
        usd_value: f64,
        now: DateTime<Utc>,
    ) {
        let now = truncate_millis(now);
        let words = phrase.words();

        for i in 0..words.len() {
            let next = &words[i];
            if i >= 1 {
                bump_nested(&mut self.bigrams, words[i - 1].clone(), next);
            }
            if i >= 2 {
                bump_nested(&mut self.trigrams, words[i - 2..i].join(" "), next);
            }
            if i >= 3 {
                bump_nested(&mut self.quadgrams, words[i - 3..i].join(" "), next);
            }
            bump_nested(&mut self.position_frequency, i, next);
            let length = self.word_length_distribution.entry(next.chars().count()).or_insert(0);
            *length = length.saturating_add(1);
        }

        if let Some(first) = words.first() {
            bump(&mut self.first_word_frequency, first);
        }
        if let Some(last) = words.last() {
            bump(&mut self.last_word_frequency, last);
        }
        if words.len() == CHECKSUM_PREFIX_LEN + 1 {
            let prefix = words[..CHECKSUM_PREFIX_LEN].join(" ");
            bump_nested(&mut self.checksum_patterns, prefix, &words[CHECKSUM_PREFIX_LEN]);
        }

        let pattern = words[..PATTERN_PREFIX_LEN.min(words.len())].join(" ");
        *self.pattern_scores.entry(pattern.clone()).or_insert(0.0) += 1.0;
        self.pattern_ages.insert(pattern.clone(), now);
        self.pattern_decayed_at.remove(&pattern);

        let by_count = self.success_by_word_count.entry(words.len()).or_insert(0);
        *by_count = by_count.saturating_add(1);
        self.recent_successes.push_back(RecentSuccess {
            phrase: phrase.to_string(),
            currency,
            usd_value,
            word_count: words.len(),
            timestamp: now,
        });
        while self.recent_successes.len() > self.config.max_history {
            self.recent_successes.pop_front();
        }

        self.total_successes = self.total_successes.saturating_add(1);
        self.last_updated = Some(now);
        self.recompute_average_word_length();
        self.recompute_entropy();
        debug!(%currency, usd_value, pattern = %pattern, "advanced model learned phrase");
    }

    pub fn record_attempts(&mut self, n: u64) {
        self.total_attempts = self.total_attempts.saturating_add(n);
    }

    /// N-gram walk. `Random` draws uniformly; `Positional` prefers the per-position table;
    /// `Adaptive`/`Hybrid` mix n-gram, positional and uniform draws by the configured weights;
    /// the rest walk the n-gram tables.
    pub fn generate_with_ngrams<R: Rng + ?Sized>(
        &self,
        word_count: WordCount,
        strategy: Strategy,
        wordlist: &Wordlist,
        rng: &mut R,
    ) -> Phrase {
        let n = word_count.get();
        if strategy == Strategy::Random {
            return into_phrase(random_words(n, wordlist, rng));
        }

        let mut words: Vec<String> = Vec::with_capacity(n);
        let first = weighted_pick(&self.first_word_frequency, rng)
            .map(str::to_string)
            .unwrap_or_else(|| wordlist.random_word(rng).to_string());
        words.push(first);

        while words.len() < n - 1 {
            let i = words.len();
            let drawn = match self.pick_mode(strategy, rng) {
                DrawMode::Ngram => self.next_from_ngrams(&words, rng),
                DrawMode::Positional => self
                    .position_frequency
                    .get(&i)
                    .and_then(|counts| weighted_pick(counts, rng))
                    .or_else(|| self.next_from_ngrams(&words, rng)),
                DrawMode::Uniform => None,
            };
            let word = match drawn {
                Some(w) => w.to_string(),
                None => wordlist.random_word(rng).to_string(),
            };
            words.push(word);
        }

        let last = self
            .final_word(&words, rng)
            .map(str::to_string)
            .unwrap_or_else(|| wordlist.random_word(rng).to_string());
        words.push(last);
        into_phrase(words)
    }

    fn pick_mode<R: Rng + ?Sized>(&self, strategy: Strategy, rng: &mut R) -> DrawMode {
        match strategy {
            Strategy::Positional => DrawMode::Positional,
            Strategy::Adaptive | Strategy::Hybrid => {
                let w = &self.config.strategy_weights;
                let total = w.ngram + w.positional + w.random;
                if total <= 0.0 {
                    return DrawMode::Ngram;
                }
                let roll = rng.random::<f64>() * total;
                if roll < w.ngram {
                    DrawMode::Ngram
                } else if roll < w.ngram + w.positional {
                    DrawMode::Positional
                } else {
                    DrawMode::Uniform
                }
            }
            _ => DrawMode::Ngram,
        }
    }

    /// Longest matching context wins: quadgram, then trigram, then bigram.
    fn next_from_ngrams<'a, R: Rng + ?Sized>(
        &'a self,
        words: &[String],
        rng: &mut R,
    ) -> Option<&'a str> {
        let len = words.len();
        if len >= 3 {
            let key = words[len - 3..].join(" ");
            if let Some(w) = self.quadgrams.get(&key).and_then(|m| weighted_pick(m, rng)) {
                return Some(w);
            }
        }
        if len >= 2 {
            let key = words[len - 2..].join(" ");
            if let Some(w) = self.trigrams.get(&key).and_then(|m| weighted_pick(m, rng)) {
                return Some(w);
            }
        }
        words
            .last()
            .and_then(|prev| self.bigrams.get(prev))
            .and_then(|m| weighted_pick(m, rng))
    }

    fn final_word<'a, R: Rng + ?Sized>(&'a self, words: &[String], rng: &mut R) -> Option<&'a str> {
        if words.len() == CHECKSUM_PREFIX_LEN {
            let prefix = words.join(" ");
            if let Some(w) = self
                .checksum_patterns
                .get(&prefix)
                .and_then(|m| weighted_pick(m, rng))
            {
                return Some(w);
            }
        }
        weighted_pick(&self.last_word_frequency, rng)
    }

    /// Age-based decay of pattern scores. Patterns older than `min_pattern_age_days` lose
    /// `decay_rate` per excess day; scores under the floor are dropped. Time already covered
    /// by a previous call is not decayed again, so repeated calls at the same instant are
    /// no-ops. Returns the number of patterns dropped.
    pub fn apply_decay(&mut self, now: DateTime<Utc>) -> usize {
        let now = truncate_millis(now);
        let grace = self.config.min_pattern_age_days;
        let mut dropped = Vec::new();

        for (pattern, seen_at) in &self.pattern_ages {
            let age_days = days_between(*seen_at, now);
            if age_days <= grace {
                continue;
            }
            let already = self
                .pattern_decayed_at
                .get(pattern)
                .map(|at| days_between(*seen_at, *at).max(grace))
                .unwrap_or(grace);
            let exponent = age_days - already;
            if exponent <= 0.0 {
                continue;
            }
            if let Some(score) = self.pattern_scores.get_mut(pattern) {
                *score = (*score * self.config.decay_rate.powf(exponent)).max(0.0);
                if *score < self.config.decay_floor {
                    dropped.push(pattern.clone());
                }
            }
            self.pattern_decayed_at.insert(pattern.clone(), now);
        }

        for pattern in &dropped {
            self.pattern_scores.remove(pattern);
            self.pattern_ages.remove(pattern);
            self.pattern_decayed_at.remove(pattern);
        }
        self.recompute_entropy();
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "pruned stale patterns");
        }
        dropped.len()
    }

    fn recompute_average_word_length(&mut self) {
        let (sum, count) = self
            .word_length_distribution
            .iter()
            .fold((0f64, 0f64), |(s, c), (len, n)| {
                (s + *len as f64 * *n as f64, c + *n as f64)
            });
        self.average_word_length = if count == 0.0 { 0.0 } else { sum / count };
    }

    /// Shannon entropy (bits) of the normalized pattern score distribution.
    fn recompute_entropy(&mut self) {
        self.phrase_entropy = shannon_entropy(self.pattern_scores.values().copied());
    }

    pub fn stats(&self) -> AdvancedStats {
        let active_patterns = self.pattern_scores.len();
        let average_pattern_score = if active_patterns == 0 {
            0.0
        } else {
            self.pattern_scores.values().sum::<f64>() / active_patterns as f64
        };
        AdvancedStats {
            bigrams: transitions(&self.bigrams),
            trigrams: transitions(&self.trigrams),
            quadgrams: transitions(&self.quadgrams),
            word_position_variety: self.position_frequency.values().map(HashMap::len).sum(),
            active_patterns,
            average_pattern_score,
            checksum_patterns: self.checksum_patterns.len(),
            average_word_length: self.average_word_length,
            phrase_entropy: self.phrase_entropy,
            success_by_word_count: self.success_by_word_count.clone(),
            recent_successes: self.recent_successes.len(),
        }
    }

    pub fn to_json(&self) -> Value {
        let recent: Vec<Value> = self
            .recent_successes
            .iter()
            .map(|r| {
                json!({
                    "phrase": r.phrase,
                    "currency": r.currency.ticker(),
                    "usdValue": r.usd_value,
                    "wordCount": r.word_count,
                    "timestamp": encode_time(&r.timestamp),
                })
            })
            .collect();
        json!({
            "bigrams": encode_nested(&self.bigrams),
            "trigrams": encode_nested(&self.trigrams),
            "quadgrams": encode_nested(&self.quadgrams),
            "firstWordFrequency": encode_counts(&self.first_word_frequency),
            "lastWordFrequency": encode_counts(&self.last_word_frequency),
            "checksumPatterns": encode_nested(&self.checksum_patterns),
            "positionFrequency": encode_nested(&self.position_frequency),
            "patternAges": encode_timestamps(&self.pattern_ages),
            "patternScores": encode_scores(&self.pattern_scores),
            "patternDecayedAt": encode_timestamps(&self.pattern_decayed_at),
            "wordLengthDistribution": encode_keyed_counts(&self.word_length_distribution),
            "successByWordCount": encode_keyed_counts(&self.success_by_word_count),
            "recentSuccesses": recent,
            "totalSuccesses": self.total_successes,
            "totalAttempts": self.total_attempts,
            "lastUpdated": self.last_updated.as_ref().map(encode_time),
            "config": self.config.to_json(),
        })
    }

    /// Derived fields (average word length, entropy) are recomputed rather than trusted.
    pub fn from_json(value: &Value) -> DecodeResult<Self> {
        let obj = as_object(value, "advanced learning state")?;
        let config = AdvancedConfig::from_json(obj.get("config"))?;

        let mut recent_successes = VecDeque::new();
        if let Some(items) = obj.get("recentSuccesses") {
            let items = items
                .as_array()
                .ok_or_else(|| "recentSuccesses: expected array".to_string())?;
            for item in items {
                recent_successes.push_back(decode_recent(item)?);
            }
        }
        while recent_successes.len() > config.max_history {
            recent_successes.pop_front();
        }

        let mut state = Self {
            bigrams: decode_nested(obj.get("bigrams"), "bigrams")?,
            trigrams: decode_nested(obj.get("trigrams"), "trigrams")?,
            quadgrams: decode_nested(obj.get("quadgrams"), "quadgrams")?,
            first_word_frequency: decode_counts(
                obj.get("firstWordFrequency"),
                "firstWordFrequency",
            )?,
            last_word_frequency: decode_counts(obj.get("lastWordFrequency"), "lastWordFrequency")?,
            checksum_patterns: decode_nested(obj.get("checksumPatterns"), "checksumPatterns")?,
            position_frequency: decode_nested(obj.get("positionFrequency"), "positionFrequency")?,
            pattern_ages: decode_timestamps(obj.get("patternAges"), "patternAges")?,
            pattern_scores: decode_scores(obj.get("patternScores"), "patternScores")?,
            pattern_decayed_at: decode_timestamps(obj.get("patternDecayedAt"), "patternDecayedAt")?,
            word_length_distribution: decode_keyed_counts(
                obj.get("wordLengthDistribution"),
                "wordLengthDistribution",
            )?,
            average_word_length: 0.0,
            phrase_entropy: 0.0,
            success_by_word_count: decode_keyed_counts(
                obj.get("successByWordCount"),
                "successByWordCount",
            )?,
            recent_successes,
            total_successes: get_u64(obj, "totalSuccesses")?,
            total_attempts: get_u64(obj, "totalAttempts")?,
            last_updated: get_time(obj, "lastUpdated")?,
            config,
        };
        if state.pattern_scores.values().any(|s| !s.is_finite() || *s < 0.0) {
            return Err("patternScores: scores must be finite and non-negative".to_string());
        }
        state.recompute_average_word_length();
        state.recompute_entropy();
        Ok(state)
    }
}

enum DrawMode {
    Ngram,
    Positional,
    Uniform,
}

fn decode_recent(item: &Value) -> DecodeResult<RecentSuccess> {
    let obj = as_object(item, "recentSuccesses[]")?;
    let phrase = obj
        .get("phrase")
        .and_then(Value::as_str)
        .ok_or_else(|| "recentSuccesses[].phrase: expected string".to_string())?
        .to_string();
    let currency = obj
        .get("currency")
        .and_then(Value::as_str)
        .ok_or_else(|| "recentSuccesses[].currency: expected string".to_string())?
        .parse::<Currency>()
        .map_err(|e| e.to_string())?;
    let raw_ts = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .ok_or_else(|| "recentSuccesses[].timestamp: expected string".to_string())?;
    Ok(RecentSuccess {
        phrase,
        currency,
        usd_value: get_f64(obj, "usdValue", 0.0)?,
        word_count: get_u64(obj, "wordCount")? as usize,
        timestamp: decode_time(raw_ts, "recentSuccesses[].timestamp")?,
    })
}

fn transitions(table: &NestedCountMap<String>) -> usize {
    table.values().map(HashMap::len).sum()
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
}

pub fn shannon_entropy(weights: impl Iterator<Item = f64> + Clone) -> f64 {
    let total: f64 = weights.clone().filter(|w| *w > 0.0).sum();
    if total <= 0.0 {
        return 0.0;
    }
    weights
        .filter(|w| *w > 0.0)
        .map(|w| {
            let p = w / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SAMPLE: &str =
        "abandon ability able about above absent absorb abstract absurd abuse access accident";

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_learn_populates_tables() {
        let list = Wordlist::bip39_english();
        let phrase = Phrase::parse(SAMPLE, &list).unwrap();
        let mut state = AdvancedLearningState::new();
        state.learn_advanced(&phrase, Currency::Eth, 100.0);

        assert_eq!(state.bigrams["abandon"].get("ability"), Some(&1));
        assert_eq!(state.trigrams["abandon ability"].get("able"), Some(&1));
        assert_eq!(state.quadgrams["abandon ability able"].get("about"), Some(&1));
        assert_eq!(state.first_word_frequency.get("abandon"), Some(&1));
        assert_eq!(state.last_word_frequency.get("accident"), Some(&1));
        assert_eq!(state.checksum_patterns.len(), 1);
        assert_eq!(state.pattern_scores.get("abandon ability able"), Some(&1.0));
        assert_eq!(state.success_by_word_count.get(&12), Some(&1));

        let stats = state.stats();
        assert_eq!(stats.bigrams, 11);
        assert_eq!(stats.trigrams, 10);
        assert_eq!(stats.quadgrams, 9);
        assert_eq!(stats.word_position_variety, 12);
        assert_eq!(stats.recent_successes, 1);
        // A single pattern carries no uncertainty.
        assert_eq!(stats.phrase_entropy, 0.0);
    }

    #[test]
    fn test_ngram_walk_reproduces_single_phrase() {
        let list = Wordlist::bip39_english();
        let phrase = Phrase::parse(SAMPLE, &list).unwrap();
        let mut state = AdvancedLearningState::new();
        state.learn_advanced(&phrase, Currency::Btc, 1.0);
        let mut rng = StdRng::seed_from_u64(4);
        let generated =
            state.generate_with_ngrams(WordCount::Twelve, Strategy::Frequency, &list, &mut rng);
        assert_eq!(generated, phrase);
    }

    #[test]
    fn test_empty_state_generates_valid_phrase() {
        let list = Wordlist::bip39_english();
        let state = AdvancedLearningState::new();
        let mut rng = StdRng::seed_from_u64(8);
        for count in [WordCount::Twelve, WordCount::TwentyFour] {
            let phrase = state.generate_with_ngrams(count, Strategy::Adaptive, &list, &mut rng);
            assert_eq!(phrase.len(), count.get());
            assert!(phrase.words().iter().all(|w| list.contains(w)));
        }
    }

    #[test]
    fn test_recent_successes_bounded() {
        let list = Wordlist::bip39_english();
        let phrase = Phrase::parse(SAMPLE, &list).unwrap();
        let mut config = AdvancedConfig::default();
        config.max_history = 3;
        let mut state = AdvancedLearningState::with_config(config);
        for _ in 0..10 {
            state.learn_advanced(&phrase, Currency::Btc, 1.0);
        }
        assert_eq!(state.recent_successes.len(), 3);
        assert_eq!(state.total_successes, 10);
    }

    #[test]
    fn test_decay_is_idempotent_and_prunes() {
        let list = Wordlist::bip39_english();
        let phrase = Phrase::parse(SAMPLE, &list).unwrap();
        let mut state = AdvancedLearningState::new();
        let t0 = at(1_700_000_000_000);
        for _ in 0..4 {
            state.learn_advanced_at(&phrase, Currency::Btc, 1.0, t0);
        }

        let later = t0 + Duration::days(10);
        state.apply_decay(later);
        let once = state.clone();
        state.apply_decay(later);
        assert_eq!(state, once);

        let expected = 4.0 * 0.95f64.powf(3.0);
        let score = state.pattern_scores["abandon ability able"];
        assert!((score - expected).abs() < 1e-9);

        // Continuing later decays only the new interval.
        state.apply_decay(later + Duration::days(2));
        let score = state.pattern_scores["abandon ability able"];
        assert!((score - 4.0 * 0.95f64.powf(5.0)).abs() < 1e-9);

        let dropped = state.apply_decay(t0 + Duration::days(400));
        assert_eq!(dropped, 1);
        assert!(state.pattern_scores.is_empty());
        assert!(state.pattern_ages.is_empty());
    }

    #[test]
    fn test_decay_leaves_young_patterns() {
        let list = Wordlist::bip39_english();
        let phrase = Phrase::parse(SAMPLE, &list).unwrap();
        let mut state = AdvancedLearningState::new();
        let t0 = at(1_700_000_000_000);
        state.learn_advanced_at(&phrase, Currency::Btc, 1.0, t0);
        assert_eq!(state.apply_decay(t0 + Duration::days(3)), 0);
        assert_eq!(state.pattern_scores["abandon ability able"], 1.0);
    }

    #[test]
    fn test_entropy_of_uniform_scores() {
        let e = shannon_entropy([1.0, 1.0, 1.0, 1.0].into_iter());
        assert!((e - 2.0).abs() < 1e-12);
        assert_eq!(shannon_entropy(std::iter::empty()), 0.0);
    }

    #[test]
    fn test_json_round_trip() {
        let list = Wordlist::bip39_english();
        let mut state = AdvancedLearningState::new();
        let mut rng = StdRng::seed_from_u64(17);
        for i in 0..5 {
            let phrase = if i % 2 == 0 {
                state.generate_with_ngrams(WordCount::Twelve, Strategy::Random, &list, &mut rng)
            } else {
                state.generate_with_ngrams(WordCount::TwentyFour, Strategy::Random, &list, &mut rng)
            };
            state.learn_advanced(&phrase, Currency::Ltc, i as f64);
        }
        state.record_attempts(500);

        let restored = AdvancedLearningState::from_json(&state.to_json()).unwrap();
        assert_eq!(restored.bigrams, state.bigrams);
        assert_eq!(restored.checksum_patterns, state.checksum_patterns);
        assert_eq!(restored.pattern_ages, state.pattern_ages);
        assert_eq!(restored.recent_successes, state.recent_successes);
        assert_eq!(restored.total_attempts, 500);
        assert!((restored.phrase_entropy - state.phrase_entropy).abs() < 1e-9);
        assert!((restored.average_word_length - state.average_word_length).abs() < 1e-9);
    }
}
