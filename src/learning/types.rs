use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::learning::config::AutoSwitchThresholds;
use crate::wordlist::Wordlist;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Btc,
    Eth,
    Ltc,
}

impl Currency {
    pub fn all() -> &'static [Currency] {
        &[Currency::Btc, Currency::Eth, Currency::Ltc]
    }

    pub fn ticker(&self) -> &'static str {
        match self {
            Currency::Btc => "BTC",
            Currency::Eth => "ETH",
            Currency::Ltc => "LTC",
        }
    }

    pub fn decimals(&self) -> u32 {
        match self {
            Currency::Btc | Currency::Ltc => 8,
            Currency::Eth => 18,
        }
    }

    /// Used when the price service is unreachable.
    pub fn fallback_usd_price(&self) -> f64 {
        match self {
            Currency::Btc => 45_000.0,
            Currency::Eth => 2_500.0,
            Currency::Ltc => 70.0,
        }
    }

    pub fn price_id(&self) -> &'static str {
        match self {
            Currency::Btc => "bitcoin",
            Currency::Eth => "ethereum",
            Currency::Ltc => "litecoin",
        }
    }

    pub fn chain_path(&self) -> &'static str {
        match self {
            Currency::Btc => "btc",
            Currency::Eth => "eth",
            Currency::Ltc => "ltc",
        }
    }

    pub fn default_rps(&self) -> f64 {
        match self {
            Currency::Btc | Currency::Ltc => 3.0,
            Currency::Eth => 5.0,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ticker())
    }
}

impl FromStr for Currency {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BTC" => Ok(Currency::Btc),
            "ETH" => Ok(Currency::Eth),
            "LTC" => Ok(Currency::Ltc),
            other => Err(EngineError::validation(format!("unsupported currency {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WordCount {
    Twelve,
    TwentyFour,
}

impl WordCount {
    pub fn get(self) -> usize {
        match self {
            WordCount::Twelve => 12,
            WordCount::TwentyFour => 24,
        }
    }
}

impl TryFrom<usize> for WordCount {
    type Error = EngineError;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            12 => Ok(WordCount::Twelve),
            24 => Ok(WordCount::TwentyFour),
            n => Err(EngineError::validation(format!(
                "word count must be 12 or 24, got {n}"
            ))),
        }
    }
}

/// Ordered mnemonic candidate. Always 12 or 24 tokens.
///
/// Serialized as a plain token array. Deserializing goes through [`Phrase::new`], so a blob
/// cannot produce a phrase of any other length; wordlist membership is checked by
/// [`Phrase::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Phrase {
    words: Vec<String>,
}

impl Phrase {
    pub fn new(words: Vec<String>) -> Result<Self> {
        WordCount::try_from(words.len())?;
        Ok(Self { words })
    }

    /// Generator output; callers guarantee a 12 or 24 token vector drawn from the wordlist.
    pub(crate) fn from_generated(words: Vec<String>) -> Self {
        debug_assert!(words.len() == 12 || words.len() == 24);
        Self { words }
    }

    pub fn parse(text: &str, wordlist: &Wordlist) -> Result<Self> {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.to_ascii_lowercase())
            .collect();
        if let Some(unknown) = words.iter().find(|w| !wordlist.contains(w)) {
            return Err(EngineError::validation(format!(
                "word {unknown:?} is not in the wordlist"
            )));
        }
        Self::new(words)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn word_count(&self) -> WordCount {
        if self.words.len() == 24 {
            WordCount::TwentyFour
        } else {
            WordCount::Twelve
        }
    }
}

impl TryFrom<Vec<String>> for Phrase {
    type Error = EngineError;

    fn try_from(words: Vec<String>) -> Result<Self> {
        Self::new(words)
    }
}

impl From<Phrase> for Vec<String> {
    fn from(phrase: Phrase) -> Self {
        phrase.words
    }
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.words.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Random,
    Frequency,
    Positional,
    Correlated,
    Hybrid,
    Adaptive,
}

impl Strategy {
    pub fn all() -> &'static [Strategy] {
        &[
            Strategy::Random,
            Strategy::Frequency,
            Strategy::Positional,
            Strategy::Correlated,
            Strategy::Hybrid,
            Strategy::Adaptive,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Random => "random",
            Strategy::Frequency => "frequency",
            Strategy::Positional => "positional",
            Strategy::Correlated => "correlated",
            Strategy::Hybrid => "hybrid",
            Strategy::Adaptive => "adaptive",
        }
    }

    /// Adaptive escalates with the number of learned successes.
    pub fn resolve(
        self,
        total_successes: u64,
        thresholds: &AutoSwitchThresholds,
    ) -> ResolvedStrategy {
        match self {
            Strategy::Random => ResolvedStrategy::Random,
            Strategy::Frequency => ResolvedStrategy::Frequency,
            Strategy::Positional => ResolvedStrategy::Positional,
            Strategy::Correlated => ResolvedStrategy::Correlated,
            Strategy::Hybrid => ResolvedStrategy::Hybrid,
            Strategy::Adaptive => {
                if total_successes >= thresholds.hybrid {
                    ResolvedStrategy::Hybrid
                } else if total_successes >= thresholds.positional {
                    ResolvedStrategy::Positional
                } else if total_successes >= thresholds.frequency {
                    ResolvedStrategy::Frequency
                } else {
                    ResolvedStrategy::Random
                }
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Strategy::Random),
            "frequency" => Ok(Strategy::Frequency),
            "positional" => Ok(Strategy::Positional),
            "correlated" | "correlation" => Ok(Strategy::Correlated),
            "hybrid" => Ok(Strategy::Hybrid),
            "adaptive" => Ok(Strategy::Adaptive),
            other => Err(EngineError::validation(format!("unknown strategy {other:?}"))),
        }
    }
}

/// A strategy with `Adaptive` already resolved. Token drawing only ever sees these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedStrategy {
    Random,
    Frequency,
    Positional,
    Correlated,
    Hybrid,
}

impl ResolvedStrategy {
    pub fn as_strategy(self) -> Strategy {
        match self {
            ResolvedStrategy::Random => Strategy::Random,
            ResolvedStrategy::Frequency => Strategy::Frequency,
            ResolvedStrategy::Positional => Strategy::Positional,
            ResolvedStrategy::Correlated => Strategy::Correlated,
            ResolvedStrategy::Hybrid => Strategy::Hybrid,
        }
    }
}

impl fmt::Display for ResolvedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_strategy().as_str())
    }
}
