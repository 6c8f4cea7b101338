use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::learning::types::Currency;
use crate::services::rate_limiter::RateLimiter;

const DEFAULT_BALANCE_ENDPOINT: &str = "https://api.blockcypher.com";
const DEFAULT_PRICE_ENDPOINT: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const PRICE_CACHE_TTL: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1_000;

/// Raw upstream answer: balance in the currency's smallest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BalanceQuery {
    pub final_balance_minor: u128,
    pub tx_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResult {
    pub balance: f64,
    pub balance_usd: f64,
    pub tx_count: u64,
    pub has_balance: bool,
}

impl BalanceResult {
    pub fn zero() -> Self {
        Self::default()
    }
}

pub trait BalanceSource: Send + Sync {
    fn query(
        &self,
        address: &str,
        currency: Currency,
        api_key: Option<&str>,
    ) -> impl Future<Output = Result<BalanceQuery, TransportError>> + Send;
}

pub trait PriceSource: Send + Sync {
    fn current_price(
        &self,
        currency: Currency,
    ) -> impl Future<Output = Result<f64, TransportError>> + Send;
}

#[derive(Debug, Deserialize)]
struct AddressBalanceResponse {
    final_balance: u128,
    #[serde(default)]
    n_tx: u64,
}

/// BlockCypher-style address balance endpoint.
#[derive(Clone)]
pub struct HttpBalanceSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBalanceSource {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: build_client(),
            endpoint: endpoint
                .unwrap_or_else(|| DEFAULT_BALANCE_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

impl BalanceSource for HttpBalanceSource {
    async fn query(
        &self,
        address: &str,
        currency: Currency,
        api_key: Option<&str>,
    ) -> Result<BalanceQuery, TransportError> {
        let url = format!(
            "{}/v1/{}/main/addrs/{}/balance",
            self.endpoint,
            currency.chain_path(),
            address
        );
        let mut request = self.client.get(&url);
        if let Some(token) = api_key.filter(|k| !k.trim().is_empty()) {
            request = request.query(&[("token", token)]);
        }
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::HttpStatus { status, body });
        }
        let bytes = resp.bytes().await?;
        let parsed: AddressBalanceResponse =
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(BalanceQuery {
            final_balance_minor: parsed.final_balance,
            tx_count: parsed.n_tx,
        })
    }
}

/// CoinGecko-style simple price endpoint.
#[derive(Clone)]
pub struct HttpPriceSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPriceSource {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: build_client(),
            endpoint: endpoint
                .unwrap_or_else(|| DEFAULT_PRICE_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

impl PriceSource for HttpPriceSource {
    async fn current_price(&self, currency: Currency) -> Result<f64, TransportError> {
        let url = format!("{}/simple/price", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .query(&[("ids", currency.price_id()), ("vs_currencies", "usd")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::HttpStatus { status, body });
        }
        let bytes = resp.bytes().await?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))?;
        value
            .get(currency.price_id())
            .and_then(|v| v.get("usd"))
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| TransportError::Decode(format!("no usd price for {currency}")))
    }
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Offline balance source. The address digest decides, with probability `hit_rate`, whether an
/// address holds funds, so the same address always gets the same answer.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedBalanceSource {
    hit_rate: f64,
}

impl SimulatedBalanceSource {
    pub fn new(hit_rate: f64) -> Self {
        let hit_rate = if hit_rate.is_finite() { hit_rate.clamp(0.0, 1.0) } else { 0.0 };
        Self { hit_rate }
    }

    pub fn lookup(&self, address: &str, currency: Currency) -> BalanceQuery {
        let digest: [u8; 32] = Sha256::digest(address.as_bytes()).into();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let roll = u64::from_be_bytes(head) as f64 / u64::MAX as f64;
        if roll >= self.hit_rate {
            return BalanceQuery::default();
        }
        let mut amount = [0u8; 4];
        amount.copy_from_slice(&digest[8..12]);
        // Between 0.0001 and ~0.1 whole units.
        let scale = 10u128.pow(currency.decimals().saturating_sub(4));
        let units = u32::from_be_bytes(amount) as u128 % 1_000 + 1;
        BalanceQuery {
            final_balance_minor: units * scale,
            tx_count: u64::from(digest[12] % 50) + 1,
        }
    }
}

impl BalanceSource for SimulatedBalanceSource {
    async fn query(
        &self,
        address: &str,
        currency: Currency,
        _api_key: Option<&str>,
    ) -> Result<BalanceQuery, TransportError> {
        Ok(self.lookup(address, currency))
    }
}

#[derive(Debug, Clone)]
pub struct StaticPriceSource {
    prices: HashMap<Currency, f64>,
}

impl Default for StaticPriceSource {
    fn default() -> Self {
        Self {
            prices: Currency::all()
                .iter()
                .map(|c| (*c, c.fallback_usd_price()))
                .collect(),
        }
    }
}

impl StaticPriceSource {
    pub fn with_price(mut self, currency: Currency, usd: f64) -> Self {
        self.prices.insert(currency, usd);
        self
    }
}

impl PriceSource for StaticPriceSource {
    async fn current_price(&self, currency: Currency) -> Result<f64, TransportError> {
        Ok(self
            .prices
            .get(&currency)
            .copied()
            .unwrap_or_else(|| currency.fallback_usd_price()))
    }
}

#[derive(Debug, Clone)]
pub struct BalanceCheckerConfig {
    /// Total attempts per check, including the first.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub api_key: Option<String>,
    pub requests_per_second: HashMap<Currency, f64>,
}

impl Default for BalanceCheckerConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            backoff_base: Duration::from_millis(BASE_BACKOFF_MS),
            api_key: None,
            requests_per_second: Currency::all()
                .iter()
                .map(|c| (*c, c.default_rps()))
                .collect(),
        }
    }
}

/// Rate-limited, retrying balance lookup. Never fails: exhausted retries yield a zero balance.
pub struct BalanceChecker<B, P> {
    source: B,
    prices: P,
    limiters: HashMap<Currency, RateLimiter>,
    config: BalanceCheckerConfig,
    price_cache: Mutex<HashMap<Currency, (f64, Instant)>>,
}

impl<B: BalanceSource, P: PriceSource> BalanceChecker<B, P> {
    pub fn new(source: B, prices: P, config: BalanceCheckerConfig) -> Self {
        let limiters = Currency::all()
            .iter()
            .map(|c| {
                let rps = config
                    .requests_per_second
                    .get(c)
                    .copied()
                    .unwrap_or_else(|| c.default_rps());
                (*c, RateLimiter::new(rps))
            })
            .collect();
        Self {
            source,
            prices,
            limiters,
            config,
            price_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BalanceCheckerConfig {
        &self.config
    }

    pub async fn check_balance(&self, address: &str, currency: Currency) -> BalanceResult {
        let key = self.config.api_key.clone();
        self.check_balance_with_key(address, currency, key.as_deref()).await
    }

    pub async fn check_balance_with_key(
        &self,
        address: &str,
        currency: Currency,
        api_key: Option<&str>,
    ) -> BalanceResult {
        let attempts = self.config.max_retries.max(1);
        for attempt in 0..attempts {
            let outcome = match self.limiters.get(&currency) {
                Some(limiter) => {
                    limiter
                        .schedule(|| self.source.query(address, currency, api_key))
                        .await
                }
                None => self.source.query(address, currency, api_key).await,
            };
            match outcome {
                Ok(query) => return self.to_result(query, currency).await,
                Err(e) => {
                    if attempt + 1 < attempts {
                        let backoff = self.config.backoff_base * (1u32 << attempt.min(16));
                        warn!(attempt, %currency, error = %e, "balance query failed, retrying");
                        sleep(backoff).await;
                    } else {
                        warn!(
                            attempts,
                            %currency,
                            address,
                            error = %e,
                            "balance query gave up, using zero balance"
                        );
                    }
                }
            }
        }
        BalanceResult::zero()
    }

    async fn to_result(&self, query: BalanceQuery, currency: Currency) -> BalanceResult {
        if query.final_balance_minor == 0 {
            return BalanceResult {
                tx_count: query.tx_count,
                ..BalanceResult::zero()
            };
        }
        let balance = query.final_balance_minor as f64 / 10f64.powi(currency.decimals() as i32);
        let price = self.usd_price(currency).await;
        BalanceResult {
            balance,
            balance_usd: balance * price,
            tx_count: query.tx_count,
            has_balance: true,
        }
    }

    /// Cached for a minute; the fallback price is used, not cached, when the source fails.
    pub async fn usd_price(&self, currency: Currency) -> f64 {
        let cached = self.price_cache.lock().get(&currency).copied();
        if let Some((price, at)) = cached {
            if at.elapsed() < PRICE_CACHE_TTL {
                return price;
            }
        }
        match self.prices.current_price(currency).await {
            Ok(price) if price.is_finite() && price > 0.0 => {
                self.price_cache.lock().insert(currency, (price, Instant::now()));
                debug!(%currency, price, "refreshed USD price");
                price
            }
            Ok(price) => {
                warn!(%currency, price, "price source returned unusable price, using fallback");
                currency.fallback_usd_price()
            }
            Err(e) => {
                warn!(%currency, error = %e, "price lookup failed, using fallback");
                currency.fallback_usd_price()
            }
        }
    }
}
