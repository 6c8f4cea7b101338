use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::learning::{Currency, Strategy, WordCount};
use crate::services::balance::BalanceCheckerConfig;
use crate::services::scan::BatchRequest;

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceMode {
    Simulated,
    Live,
}

impl FromStr for BalanceMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(BalanceMode::Simulated),
            "live" | "real" => Ok(BalanceMode::Live),
            other => Err(EngineError::validation(format!("unknown balance mode {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: PathBuf,
    pub balance_mode: BalanceMode,
    pub api_key: Option<String>,
    pub balance_endpoint: Option<String>,
    pub price_endpoint: Option<String>,
    pub batch_size: usize,
    pub word_count: WordCount,
    pub currencies: Vec<Currency>,
    pub strategy: Strategy,
    pub use_advanced: bool,
    pub requests_per_second: HashMap<Currency, f64>,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub simulated_hit_rate: f64,
}

impl Config {
    /// Numeric settings fall back to defaults when unparsable; labels (mode, strategy,
    /// currencies, word count) must be valid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let word_count = match get("SEEDSCAN_WORD_COUNT") {
            Some(raw) => {
                let n = raw.parse::<usize>().map_err(|_| {
                    EngineError::validation(format!("word count {raw:?} is not a number"))
                })?;
                WordCount::try_from(n)?
            }
            None => WordCount::Twelve,
        };

        let currencies = match get("SEEDSCAN_CURRENCIES") {
            Some(raw) => parse_currencies(&raw)?,
            None => vec![Currency::Btc, Currency::Eth],
        };

        let requests_per_second = Currency::all()
            .iter()
            .map(|c| {
                let key = format!("SEEDSCAN_RPS_{}", c.ticker());
                let rps = get(&key)
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite() && *v > 0.0)
                    .unwrap_or_else(|| c.default_rps());
                (*c, rps)
            })
            .collect();

        Ok(Self {
            log_level: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            db_path: get("SEEDSCAN_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            balance_mode: get("SEEDSCAN_BALANCE_MODE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(BalanceMode::Simulated),
            api_key: get("SEEDSCAN_API_KEY"),
            balance_endpoint: get("SEEDSCAN_BALANCE_ENDPOINT"),
            price_endpoint: get("SEEDSCAN_PRICE_ENDPOINT"),
            batch_size: get("SEEDSCAN_BATCH_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            word_count,
            currencies,
            strategy: get("SEEDSCAN_STRATEGY")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(Strategy::Adaptive),
            use_advanced: get("SEEDSCAN_USE_ADVANCED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            requests_per_second,
            max_retries: get("SEEDSCAN_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            backoff_base_ms: get("SEEDSCAN_BACKOFF_BASE_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BACKOFF_BASE_MS),
            simulated_hit_rate: get("SEEDSCAN_SIMULATED_HIT_RATE")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(0.0),
        })
    }

    pub fn balance_checker_config(&self) -> BalanceCheckerConfig {
        BalanceCheckerConfig {
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            api_key: self.api_key.clone(),
            requests_per_second: self.requests_per_second.clone(),
        }
    }

    pub fn batch_request(&self) -> BatchRequest {
        BatchRequest {
            count: self.batch_size,
            word_count: self.word_count,
            currencies: self.currencies.clone(),
            strategy: self.strategy,
            use_advanced: self.use_advanced,
        }
    }
}

fn parse_currencies(raw: &str) -> Result<Vec<Currency>> {
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let currency = part.parse::<Currency>()?;
        if !out.contains(&currency) {
            out.push(currency);
        }
    }
    if out.is_empty() {
        return Err(EngineError::validation("no currencies configured"));
    }
    Ok(out)
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("seedscan")
        .join("state.db")
}
