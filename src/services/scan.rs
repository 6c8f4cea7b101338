use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::learning::{
    AdvancedLearningState, AdvancedStats, BasicLearningState, BasicStats, Currency, Phrase,
    ResolvedStrategy, Strategy, StrategyConfig, WordCount,
};
use crate::services::address::AddressDeriver;
use crate::services::balance::{BalanceChecker, BalanceResult, BalanceSource, PriceSource};
use crate::services::strategy::{HealthStatus, StrategyController};
use crate::store::{StateStore, KEY_ADVANCED, KEY_BASIC};
use crate::wordlist::Wordlist;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyResult {
    pub currency: Currency,
    pub address: String,
    #[serde(flatten)]
    pub balance: BalanceResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub phrase: Phrase,
    pub results: Vec<CurrencyResult>,
    pub found: bool,
}

impl ScanOutcome {
    pub fn total_usd(&self) -> f64 {
        self.results.iter().map(|r| r.balance.balance_usd).sum()
    }

    /// The funded currency with the largest USD value.
    pub fn best_hit(&self) -> Option<&CurrencyResult> {
        self.results
            .iter()
            .filter(|r| r.balance.has_balance)
            .max_by(|a, b| a.balance.balance_usd.total_cmp(&b.balance.balance_usd))
    }
}

/// Where a batch draws its phrases from. Fixed for the whole batch, since learning only
/// happens once the batch ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "strategy", rename_all = "snake_case")]
pub enum GenerationSource {
    Advanced(Strategy),
    Basic(Strategy),
    Random,
}

impl GenerationSource {
    pub fn select(
        requested: Strategy,
        use_advanced: bool,
        basic: &BasicLearningState,
        advanced: &AdvancedLearningState,
        config: &StrategyConfig,
    ) -> Self {
        if use_advanced && advanced.has_ngrams() {
            return GenerationSource::Advanced(requested);
        }
        if basic.has_data() {
            return match basic.resolve(requested, config) {
                ResolvedStrategy::Random => GenerationSource::Random,
                resolved => GenerationSource::Basic(resolved.as_strategy()),
            };
        }
        GenerationSource::Random
    }

    /// Label under which attempts are tracked.
    pub fn strategy(&self) -> Strategy {
        match self {
            GenerationSource::Advanced(s) | GenerationSource::Basic(s) => *s,
            GenerationSource::Random => Strategy::Random,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub count: usize,
    pub word_count: WordCount,
    pub currencies: Vec<Currency>,
    pub strategy: Strategy,
    pub use_advanced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub found: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub scanned: usize,
    pub found: usize,
    pub found_list: Vec<ScanOutcome>,
    pub strategy_used: GenerationSource,
    pub cancelled: bool,
    pub persisted: bool,
    pub duration_ms: u64,
}

/// A manually submitted outcome, learned exactly like a batch discovery.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub phrase: String,
    pub currency: Currency,
    pub has_balance: bool,
    pub usd_value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningReport {
    pub basic: BasicStats,
    pub advanced: AdvancedStats,
    pub health: HealthStatus,
}

pub type ProgressFn<'a> = &'a (dyn Fn(BatchProgress) + Send + Sync);

pub struct ScanOrchestrator<S, B, P> {
    controller: Arc<StrategyController<S>>,
    checker: Arc<BalanceChecker<B, P>>,
    deriver: AddressDeriver,
    wordlist: Arc<Wordlist>,
    // Batches and training submissions mutate the same persisted state.
    gate: Mutex<()>,
}

impl<S, B, P> ScanOrchestrator<S, B, P>
where
    S: StateStore,
    B: BalanceSource,
    P: PriceSource,
{
    pub fn new(
        controller: Arc<StrategyController<S>>,
        checker: Arc<BalanceChecker<B, P>>,
        wordlist: Arc<Wordlist>,
    ) -> Self {
        Self {
            controller,
            checker,
            deriver: AddressDeriver::new(),
            wordlist,
            gate: Mutex::new(()),
        }
    }

    pub fn controller(&self) -> &Arc<StrategyController<S>> {
        &self.controller
    }

    pub fn wordlist(&self) -> &Wordlist {
        &self.wordlist
    }

    /// Checks every currency for one phrase concurrently. Per-currency failures are already
    /// zero balances by the time they get here.
    pub async fn scan_one(&self, phrase: &Phrase, currencies: &[Currency]) -> ScanOutcome {
        let checks = currencies.iter().map(|currency| {
            let address = self.deriver.derive(phrase, *currency);
            async move {
                let balance = self.checker.check_balance(&address, *currency).await;
                CurrencyResult {
                    currency: *currency,
                    address,
                    balance,
                }
            }
        });
        let results = join_all(checks).await;
        let found = results.iter().any(|r| r.balance.has_balance);
        ScanOutcome {
            phrase: phrase.clone(),
            results,
            found,
        }
    }

    pub async fn batch_scan(
        &self,
        request: &BatchRequest,
        cancel: &AtomicBool,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<BatchSummary> {
        if request.currencies.is_empty() {
            return Err(EngineError::validation("at least one currency is required"));
        }
        let batch_id = Uuid::new_v4();
        let span = info_span!("batch_scan", %batch_id);
        self.run_batch(batch_id, request, cancel, on_progress)
            .instrument(span)
            .await
    }

    async fn run_batch(
        &self,
        batch_id: Uuid,
        request: &BatchRequest,
        cancel: &AtomicBool,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<BatchSummary> {
        let _gate = self.gate.lock().await;
        let started = Instant::now();

        let config = self.controller.config().await;
        let mut basic = self.controller.load_basic().await;
        let mut advanced = self.controller.load_advanced().await;
        let now = Utc::now();
        self.controller.apply_pattern_decay(&mut basic, now).await;
        advanced.apply_decay(now);

        let source = GenerationSource::select(
            request.strategy,
            request.use_advanced,
            &basic,
            &advanced,
            &config,
        );
        info!(
            count = request.count,
            words = request.word_count.get(),
            currencies = ?request.currencies,
            source = ?source,
            "batch started"
        );

        let mut rng = StdRng::from_os_rng();
        let mut found_list = Vec::new();
        let mut scanned = 0usize;
        let mut cancelled = false;

        for i in 0..request.count {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                info!(scanned, "batch cancelled");
                break;
            }

            let phrase = match source {
                GenerationSource::Advanced(strategy) => advanced.generate_with_ngrams(
                    request.word_count,
                    strategy,
                    &self.wordlist,
                    &mut rng,
                ),
                GenerationSource::Basic(strategy) => basic.generate(
                    strategy,
                    request.word_count,
                    &config,
                    &self.wordlist,
                    &mut rng,
                ),
                GenerationSource::Random => basic.generate_resolved(
                    ResolvedStrategy::Random,
                    request.word_count,
                    &config.hybrid_weights,
                    &self.wordlist,
                    &mut rng,
                ),
            };

            let t0 = Instant::now();
            let outcome = self.scan_one(&phrase, &request.currencies).await;
            let latency_ms = t0.elapsed().as_secs_f64() * 1000.0;
            self.controller
                .track_attempt(source.strategy(), outcome.found, latency_ms)
                .await;

            scanned += 1;
            if outcome.found {
                info!(usd = outcome.total_usd(), "funded phrase found");
                found_list.push(outcome);
            }
            if let Some(report) = on_progress {
                report(BatchProgress {
                    current: i + 1,
                    total: request.count,
                    found: found_list.len(),
                });
            }
        }

        // Successes are learned before the attempt counters move.
        let learned_at = Utc::now();
        for outcome in &found_list {
            basic.learn_with(&outcome.phrase, config.learning, learned_at);
            if let Some(hit) = outcome.best_hit() {
                advanced.learn_advanced_at(
                    &outcome.phrase,
                    hit.currency,
                    hit.balance.balance_usd,
                    learned_at,
                );
            }
        }
        basic.record_attempts(scanned as u64);
        advanced.record_attempts(scanned as u64);

        let persisted = self.persist(&basic, &advanced).await;
        let summary = BatchSummary {
            batch_id,
            scanned,
            found: found_list.len(),
            found_list,
            strategy_used: source,
            cancelled,
            persisted,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            scanned = summary.scanned,
            found = summary.found,
            persisted,
            duration_ms = summary.duration_ms,
            "batch finished"
        );
        Ok(summary)
    }

    async fn persist(&self, basic: &BasicLearningState, advanced: &AdvancedLearningState) -> bool {
        let metrics = self.controller.metrics_entry().await;
        let entries = [
            (KEY_BASIC, basic.to_json().to_string()),
            (KEY_ADVANCED, advanced.to_json().to_string()),
            metrics,
        ];
        match self.controller.store().save_many(&entries).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to persist learning state");
                false
            }
        }
    }

    /// Training feed. A funded sample is learned as a success; every sample counts as one attempt.
    pub async fn train(&self, sample: &TrainingSample) -> Result<()> {
        let phrase = Phrase::parse(&sample.phrase, &self.wordlist)?;
        if !sample.usd_value.is_finite() || sample.usd_value < 0.0 {
            return Err(EngineError::validation(format!(
                "usd value must be a non-negative number, got {}",
                sample.usd_value
            )));
        }

        let _gate = self.gate.lock().await;
        let config = self.controller.config().await;
        let mut basic = self.controller.load_basic().await;
        let mut advanced = self.controller.load_advanced().await;

        if sample.has_balance {
            let now = Utc::now();
            basic.learn_with(&phrase, config.learning, now);
            advanced.learn_advanced_at(&phrase, sample.currency, sample.usd_value, now);
        }
        basic.record_attempts(1);
        advanced.record_attempts(1);

        self.controller
            .store()
            .save_many(&[
                (KEY_BASIC, basic.to_json().to_string()),
                (KEY_ADVANCED, advanced.to_json().to_string()),
            ])
            .await?;
        debug!(
            currency = %sample.currency,
            has_balance = sample.has_balance,
            "training sample recorded"
        );
        Ok(())
    }

    pub async fn report(&self) -> LearningReport {
        let config = self.controller.config().await;
        let basic = self.controller.load_basic().await;
        let advanced = self.controller.load_advanced().await;
        let health = self.controller.get_health_status(&basic).await;
        LearningReport {
            basic: basic.stats(&config, &self.wordlist),
            advanced: advanced.stats(),
            health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::balance::{
        BalanceCheckerConfig, SimulatedBalanceSource, StaticPriceSource,
    };
    use crate::store::MemoryStore;

    const SAMPLE: &str =
        "abandon ability able about above absent absorb abstract absurd abuse access accident";

    fn orchestrator(
        hit_rate: f64,
    ) -> ScanOrchestrator<MemoryStore, SimulatedBalanceSource, StaticPriceSource> {
        let store = Arc::new(MemoryStore::new());
        let controller = Arc::new(StrategyController::new(store));
        let mut config = BalanceCheckerConfig::default();
        for rps in config.requests_per_second.values_mut() {
            *rps = 1_000_000.0;
        }
        let checker = Arc::new(BalanceChecker::new(
            SimulatedBalanceSource::new(hit_rate),
            StaticPriceSource::default(),
            config,
        ));
        ScanOrchestrator::new(controller, checker, Arc::new(Wordlist::bip39_english()))
    }

    fn request(count: usize) -> BatchRequest {
        BatchRequest {
            count,
            word_count: WordCount::Twelve,
            currencies: vec![Currency::Btc, Currency::Eth],
            strategy: Strategy::Adaptive,
            use_advanced: false,
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let o = orchestrator(0.0);
        let summary = o
            .batch_scan(&request(0), &AtomicBool::new(false), None)
            .await
            .unwrap();
        assert_eq!(summary.scanned, 0);
        assert_eq!(summary.found, 0);
        assert!(summary.found_list.is_empty());
        assert!(summary.persisted);
    }

    #[tokio::test]
    async fn test_no_currencies_rejected() {
        let o = orchestrator(0.0);
        let mut req = request(1);
        req.currencies.clear();
        let err = o
            .batch_scan(&req, &AtomicBool::new(false), None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_scan_one_covers_each_currency() {
        let o = orchestrator(1.0);
        let mut rng = StdRng::seed_from_u64(3);
        let phrase = BasicLearningState::new().generate_resolved(
            ResolvedStrategy::Random,
            WordCount::Twelve,
            &Default::default(),
            o.wordlist(),
            &mut rng,
        );
        let outcome = o
            .scan_one(&phrase, &[Currency::Btc, Currency::Eth, Currency::Ltc])
            .await;
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.found);
        assert!(outcome.results[1].address.starts_with("0x"));
        assert!(outcome.best_hit().is_some());
    }

    #[tokio::test]
    async fn test_found_phrases_feed_back() {
        let o = orchestrator(1.0);
        let progress = std::sync::Mutex::new(Vec::new());
        let on_progress = |p: BatchProgress| progress.lock().unwrap().push(p);
        let summary = o
            .batch_scan(&request(5), &AtomicBool::new(false), Some(&on_progress))
            .await
            .unwrap();
        assert_eq!(summary.scanned, 5);
        assert_eq!(summary.found, 5);
        assert_eq!(summary.strategy_used, GenerationSource::Random);

        let progress = progress.into_inner().unwrap();
        assert_eq!(progress.len(), 5);
        assert_eq!(
            progress[4],
            BatchProgress {
                current: 5,
                total: 5,
                found: 5
            }
        );

        let basic = o.controller().load_basic().await;
        assert_eq!(basic.total_successes, 5);
        assert_eq!(basic.total_attempts, 5);
        let advanced = o.controller().load_advanced().await;
        assert!(advanced.has_ngrams());
        assert_eq!(o.controller().metrics().await.total_attempts(), 5);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_first_iteration() {
        let o = orchestrator(0.0);
        let summary = o
            .batch_scan(&request(1_000), &AtomicBool::new(true), None)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.scanned, 0);
    }

    #[tokio::test]
    async fn test_training_feed() {
        let o = orchestrator(0.0);
        let sample = TrainingSample {
            phrase: SAMPLE.into(),
            currency: Currency::Eth,
            has_balance: true,
            usd_value: 100.0,
        };
        o.train(&sample).await.unwrap();
        let unfunded = TrainingSample {
            has_balance: false,
            ..sample.clone()
        };
        o.train(&unfunded).await.unwrap();

        let basic = o.controller().load_basic().await;
        assert_eq!(basic.total_successes, 1);
        assert_eq!(basic.total_attempts, 2);
        assert_eq!(basic.word_pairs["abandon"]["ability"], 1);

        let bad = TrainingSample {
            phrase: "abandon ability".into(),
            ..sample
        };
        assert!(o.train(&bad).await.unwrap_err().is_validation());
    }

    #[test]
    fn test_source_selection() {
        let config = StrategyConfig::default();
        let basic = BasicLearningState::new();
        let advanced = AdvancedLearningState::new();
        assert_eq!(
            GenerationSource::select(Strategy::Hybrid, true, &basic, &advanced, &config),
            GenerationSource::Random
        );
        let list = Wordlist::bip39_english();
        let phrase = Phrase::parse(SAMPLE, &list).unwrap();
        let mut basic = BasicLearningState::new();
        basic.learn(&phrase, Currency::Btc, 1.0);
        let mut advanced = AdvancedLearningState::new();
        advanced.learn_advanced(&phrase, Currency::Btc, 1.0);
        assert_eq!(
            GenerationSource::select(Strategy::Hybrid, false, &basic, &advanced, &config),
            GenerationSource::Basic(Strategy::Hybrid)
        );
        assert_eq!(
            GenerationSource::select(Strategy::Adaptive, false, &basic, &advanced, &config),
            GenerationSource::Random
        );
        assert_eq!(
            GenerationSource::select(Strategy::Hybrid, true, &basic, &advanced, &config),
            GenerationSource::Advanced(Strategy::Hybrid)
        );
    }
}
