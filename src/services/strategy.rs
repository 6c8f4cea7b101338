use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::learning::codec::{as_object, truncate_millis, DecodeResult};
use crate::learning::{
    AdvancedLearningState, BasicLearningState, HybridWeights, HybridWeightsUpdate,
    LearningTogglesUpdate, PerformanceMetrics, ResolvedStrategy, Strategy, StrategyConfig,
};
use crate::store::{StateStore, ALL_KEYS, KEY_ADVANCED, KEY_BASIC, KEY_CONFIG, KEY_METRICS};

const LOW_DATA_SUCCESSES: u64 = 10;
const LOW_VOCABULARY_WORDS: usize = 50;
const STAGNANT_IMPROVEMENT: f64 = 0.1;
const STAGNANT_AFTER_ATTEMPTS: u64 = 1_000;
const FULL_DATA_SUCCESSES: f64 = 100.0;
const FULL_DATA_VOCABULARY: f64 = 500.0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub data_quality: f64,
    pub performance_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRecommendation {
    /// What `Adaptive` resolves to under the current thresholds.
    pub adaptive: Strategy,
    /// Best tracked strategy, present only once metrics reach `min_confidence`.
    pub best_tracked: Option<Strategy>,
    pub confidence: f64,
}

/// Owns [`StrategyConfig`] and [`PerformanceMetrics`]. Everything else reads and writes them
/// through here.
pub struct StrategyController<S> {
    store: Arc<S>,
    config: RwLock<Option<StrategyConfig>>,
    metrics: Mutex<Option<PerformanceMetrics>>,
}

impl<S: StateStore> StrategyController<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config: RwLock::new(None),
            metrics: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn config(&self) -> StrategyConfig {
        {
            let cache = self.config.read().await;
            if let Some(ref cached) = *cache {
                return cached.clone();
            }
        }

        let config = load_or_default(self.store.as_ref(), KEY_CONFIG, decode_config).await;
        *self.config.write().await = Some(config.clone());
        config
    }

    async fn save_config(&self, config: &StrategyConfig) -> Result<()> {
        self.store
            .save_json(KEY_CONFIG, &config.to_json().to_string())
            .await?;
        self.invalidate_config().await;
        Ok(())
    }

    async fn invalidate_config(&self) {
        *self.config.write().await = None;
    }

    pub async fn set_learning_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(EngineError::validation(format!(
                "learning rate must be within [0, 1], got {rate}"
            )));
        }
        let mut config = self.config().await;
        config.learning_rate = rate;
        self.save_config(&config).await?;
        info!(rate, "learning rate updated");
        Ok(())
    }

    pub async fn configure_learning(&self, update: LearningTogglesUpdate) -> Result<()> {
        let mut config = self.config().await;
        if let Some(v) = update.frequency {
            config.learning.frequency = v;
        }
        if let Some(v) = update.positional {
            config.learning.positional = v;
        }
        if let Some(v) = update.correlation {
            config.learning.correlation = v;
        }
        self.save_config(&config).await?;
        info!(toggles = ?config.learning, "learning types updated");
        Ok(())
    }

    pub async fn set_hybrid_weights(&self, update: HybridWeightsUpdate) -> Result<HybridWeights> {
        let mut config = self.config().await;
        let merged = config.hybrid_weights.merged(update);
        merged.validate()?;
        config.hybrid_weights = merged;
        self.save_config(&config).await?;
        info!(weights = ?merged, "hybrid weights updated");
        Ok(merged)
    }

    /// Decays basic counts once they have gone `max_pattern_age_days` without a mutation.
    /// Returns whether anything was scaled; a decay counts as a mutation.
    pub async fn apply_pattern_decay(
        &self,
        basic: &mut BasicLearningState,
        now: DateTime<Utc>,
    ) -> bool {
        let config = self.config().await;
        decay_basic(&config, basic, now)
    }

    pub async fn track_attempt(&self, strategy: Strategy, success: bool, latency_ms: f64) {
        let config = self.config().await;
        if !config.performance_tracking {
            return;
        }
        let mut guard = self.metrics.lock().await;
        if guard.is_none() {
            *guard = Some(self.load_metrics().await);
        }
        if let Some(metrics) = guard.as_mut() {
            metrics.track(strategy, success, latency_ms, config.performance_window);
        }
    }

    pub async fn metrics(&self) -> PerformanceMetrics {
        let mut guard = self.metrics.lock().await;
        if let Some(ref metrics) = *guard {
            return metrics.clone();
        }
        let metrics = self.load_metrics().await;
        *guard = Some(metrics.clone());
        metrics
    }

    async fn load_metrics(&self) -> PerformanceMetrics {
        load_or_default(self.store.as_ref(), KEY_METRICS, PerformanceMetrics::from_json).await
    }

    /// Serialized metrics, ready to go into a batch-end `save_many`.
    pub async fn metrics_entry(&self) -> (&'static str, String) {
        (KEY_METRICS, self.metrics().await.to_json().to_string())
    }

    pub async fn recommend_strategy(&self, basic: &BasicLearningState) -> StrategyRecommendation {
        let config = self.config().await;
        let metrics = self.metrics().await;
        let adaptive = basic.resolve(Strategy::Adaptive, &config).as_strategy();
        let best_tracked = metrics
            .best_strategy
            .filter(|_| metrics.confidence >= config.min_confidence);
        StrategyRecommendation {
            adaptive,
            best_tracked,
            confidence: metrics.confidence,
        }
    }

    pub async fn resolve(
        &self,
        basic: &BasicLearningState,
        strategy: Strategy,
    ) -> ResolvedStrategy {
        let config = self.config().await;
        basic.resolve(strategy, &config)
    }

    pub async fn get_health_status(&self, basic: &BasicLearningState) -> HealthStatus {
        let metrics = self.metrics().await;
        health_status(basic, &metrics)
    }

    pub async fn load_basic(&self) -> BasicLearningState {
        load_or_default(self.store.as_ref(), KEY_BASIC, BasicLearningState::from_json).await
    }

    pub async fn save_basic(&self, basic: &BasicLearningState) -> Result<()> {
        self.store
            .save_json(KEY_BASIC, &basic.to_json().to_string())
            .await?;
        Ok(())
    }

    pub async fn load_advanced(&self) -> AdvancedLearningState {
        load_or_default(self.store.as_ref(), KEY_ADVANCED, AdvancedLearningState::from_json).await
    }

    pub async fn export_state(&self, basic: &BasicLearningState) -> Value {
        let config = self.config().await;
        let metrics = self.metrics().await;
        json!({
            "basic": basic.to_json(),
            "config": config.to_json(),
            "metrics": metrics.to_json(),
            "exportedAt": Utc::now().to_rfc3339(),
        })
    }

    /// Replaces learning state, config and metrics with the snapshot. The snapshot is fully
    /// decoded before anything is written; a bad snapshot changes nothing.
    pub async fn import_state(&self, snapshot: &Value) -> Result<BasicLearningState> {
        let (basic, config, metrics) = decode_snapshot(snapshot)
            .map_err(|e| EngineError::validation(format!("invalid snapshot: {e}")))?;
        config.validate()?;

        self.store
            .save_many(&[
                (KEY_BASIC, basic.to_json().to_string()),
                (KEY_CONFIG, config.to_json().to_string()),
                (KEY_METRICS, metrics.to_json().to_string()),
            ])
            .await?;
        self.invalidate_config().await;
        *self.metrics.lock().await = Some(metrics);
        info!(
            successes = basic.total_successes,
            attempts = basic.total_attempts,
            "learning state imported"
        );
        Ok(basic)
    }

    pub async fn reset_config(&self) -> Result<()> {
        self.store.delete(KEY_CONFIG).await?;
        *self.config.write().await = Some(StrategyConfig::default());
        info!("strategy config reset to defaults");
        Ok(())
    }

    pub async fn reset_metrics(&self) -> Result<()> {
        self.store.delete(KEY_METRICS).await?;
        *self.metrics.lock().await = Some(PerformanceMetrics::default());
        info!("performance metrics reset");
        Ok(())
    }

    pub async fn reset_learning(&self) -> Result<()> {
        self.store.delete(KEY_BASIC).await?;
        self.store.delete(KEY_ADVANCED).await?;
        info!("learning state reset");
        Ok(())
    }

    pub async fn reset_all(&self) -> Result<()> {
        for key in ALL_KEYS {
            self.store.delete(key).await?;
        }
        *self.config.write().await = Some(StrategyConfig::default());
        *self.metrics.lock().await = Some(PerformanceMetrics::default());
        info!("all learning state reset");
        Ok(())
    }
}

pub(crate) fn decay_basic(
    config: &StrategyConfig,
    basic: &mut BasicLearningState,
    now: DateTime<Utc>,
) -> bool {
    if config.decay_factor >= 1.0 {
        return false;
    }
    let Some(last) = basic.last_updated else {
        return false;
    };
    let days = (now - last).num_milliseconds() as f64 / 86_400_000.0;
    if days < config.max_pattern_age_days {
        return false;
    }
    let factor = config.decay_factor.max(0.0).powf(days - config.max_pattern_age_days);
    basic.scale_counts(factor);
    basic.last_updated = Some(truncate_millis(now));
    info!(days, factor, "applied pattern decay to basic model");
    true
}

pub fn health_status(basic: &BasicLearningState, metrics: &PerformanceMetrics) -> HealthStatus {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    let learned_words = basic.word_frequency.len();
    let attempts = metrics.total_attempts();

    if basic.total_successes < LOW_DATA_SUCCESSES {
        issues.push(format!(
            "low data: {} successes recorded (need {LOW_DATA_SUCCESSES})",
            basic.total_successes
        ));
        recommendations
            .push("run more batches or submit known phrases through training".to_string());
    }
    if learned_words < LOW_VOCABULARY_WORDS {
        issues.push(format!(
            "low vocabulary: {learned_words} learned words (need {LOW_VOCABULARY_WORDS})"
        ));
        recommendations.push("keep random exploration in the mix to widen vocabulary".to_string());
    }
    if attempts > STAGNANT_AFTER_ATTEMPTS && metrics.improvement_rate < STAGNANT_IMPROVEMENT {
        issues.push(format!(
            "stagnant improvement: {:.3} over random after {attempts} attempts",
            metrics.improvement_rate
        ));
        recommendations.push("try another strategy or adjust hybrid weights".to_string());
    }

    let data_quality = 0.5 * (basic.total_successes as f64 / FULL_DATA_SUCCESSES).min(1.0)
        + 0.5 * (learned_words as f64 / FULL_DATA_VOCABULARY).min(1.0);
    let performance_score = if attempts == 0 {
        0.0
    } else {
        0.5 * metrics.confidence + 0.5 * metrics.improvement_rate.clamp(0.0, 1.0)
    };

    HealthStatus {
        healthy: issues.is_empty(),
        issues,
        recommendations,
        data_quality: data_quality.clamp(0.0, 1.0),
        performance_score: performance_score.clamp(0.0, 1.0),
    }
}

/// Out-of-range settings in a stored config are treated like any other unreadable blob.
fn decode_config(value: &Value) -> DecodeResult<StrategyConfig> {
    let config = StrategyConfig::from_json(value)?;
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn decode_snapshot(
    snapshot: &Value,
) -> DecodeResult<(BasicLearningState, StrategyConfig, PerformanceMetrics)> {
    let obj = as_object(snapshot, "snapshot")?;
    let basic = match obj.get("basic") {
        Some(v) => BasicLearningState::from_json(v)?,
        None => BasicLearningState::default(),
    };
    let config = match obj.get("config") {
        Some(v) => StrategyConfig::from_json(v)?,
        None => StrategyConfig::default(),
    };
    let metrics = match obj.get("metrics") {
        Some(v) => PerformanceMetrics::from_json(v)?,
        None => PerformanceMetrics::default(),
    };
    Ok((basic, config, metrics))
}

/// Unreadable blobs are left in place and replaced by fresh state for this session.
pub(crate) async fn load_or_default<S, T, F>(store: &S, key: &str, decode: F) -> T
where
    S: StateStore,
    T: Default,
    F: FnOnce(&Value) -> DecodeResult<T>,
{
    let raw = match store.load_json(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(e) => {
            warn!(key, error = %e, "state load failed, starting fresh");
            return T::default();
        }
    };
    let decoded = serde_json::from_str::<Value>(&raw)
        .map_err(|e| e.to_string())
        .and_then(|v| decode(&v));
    match decoded {
        Ok(v) => v,
        Err(reason) => {
            let err = EngineError::corruption(key, reason);
            warn!(error = %err, "discarding unreadable state, starting fresh");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::Phrase;
    use crate::store::MemoryStore;
    use crate::wordlist::Wordlist;
    use chrono::Duration;

    const SAMPLE: &str =
        "abandon ability able about above absent absorb abstract absurd abuse access accident";

    fn controller() -> StrategyController<MemoryStore> {
        StrategyController::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_learning_rate_bounds() {
        let c = controller();
        c.set_learning_rate(0.0).await.unwrap();
        c.set_learning_rate(1.0).await.unwrap();
        assert!(c.set_learning_rate(1.5).await.unwrap_err().is_validation());
        assert!(c.set_learning_rate(-0.1).await.unwrap_err().is_validation());
        assert!(c.set_learning_rate(f64::NAN).await.is_err());
        assert_eq!(c.config().await.learning_rate, 1.0);
    }

    #[tokio::test]
    async fn test_hybrid_weights_rejected_leave_prior() {
        let c = controller();
        let err = c
            .set_hybrid_weights(HybridWeightsUpdate {
                positional: Some(0.9),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(c.config().await.hybrid_weights, HybridWeights::default());

        let merged = c
            .set_hybrid_weights(HybridWeightsUpdate {
                positional: Some(0.5),
                correlation: Some(0.2),
                frequency: None,
            })
            .await
            .unwrap();
        assert_eq!(merged.positional, 0.5);
        assert_eq!(c.config().await.hybrid_weights, merged);
    }

    #[tokio::test]
    async fn test_config_persists_across_instances() {
        let store = Arc::new(MemoryStore::new());
        let first = StrategyController::new(store.clone());
        first
            .configure_learning(LearningTogglesUpdate {
                positional: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        let second = StrategyController::new(store);
        let config = second.config().await;
        assert!(!config.learning.positional);
        assert!(config.learning.frequency);
    }

    #[tokio::test]
    async fn test_corrupt_config_falls_back_and_keeps_blob() {
        let store = Arc::new(MemoryStore::new());
        store.save_json(KEY_CONFIG, "{not json").await.unwrap();
        let c = StrategyController::new(store.clone());
        assert_eq!(c.config().await, StrategyConfig::default());
        assert_eq!(
            store.load_json(KEY_CONFIG).await.unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn test_pattern_decay_rules() {
        let list = Wordlist::bip39_english();
        let phrase = Phrase::parse(SAMPLE, &list).unwrap();
        let c = controller();
        let t0 = Utc::now();
        let mut basic = BasicLearningState::new();
        for _ in 0..4 {
            basic.learn_with(&phrase, Default::default(), t0);
        }

        assert!(!c.apply_pattern_decay(&mut basic, t0 + Duration::days(10)).await);
        assert_eq!(basic.word_frequency["abandon"], 4);

        // 31 days at factor 0.95: 4 * 0.95 = 3.8, floored to 3
        assert!(c.apply_pattern_decay(&mut basic, t0 + Duration::days(31)).await);
        assert_eq!(basic.word_frequency["abandon"], 3);
        // Decay stamps the state, so an immediate rerun is a no-op.
        assert!(!c.apply_pattern_decay(&mut basic, t0 + Duration::days(31)).await);
    }

    #[tokio::test]
    async fn test_health_flags_fresh_state() {
        let c = controller();
        let health = c.get_health_status(&BasicLearningState::new()).await;
        assert!(!health.healthy);
        assert_eq!(health.issues.len(), 2);
        assert_eq!(health.data_quality, 0.0);
        assert_eq!(health.performance_score, 0.0);
    }

    #[tokio::test]
    async fn test_import_replaces_state() {
        let list = Wordlist::bip39_english();
        let phrase = Phrase::parse(SAMPLE, &list).unwrap();
        let source = controller();
        source.set_learning_rate(0.7).await.unwrap();
        for _ in 0..12 {
            source.track_attempt(Strategy::Random, false, 5.0).await;
        }
        let mut basic = BasicLearningState::new();
        basic.learn(&phrase, crate::learning::Currency::Btc, 1.0);
        let snapshot = source.export_state(&basic).await;

        let target = controller();
        for _ in 0..30 {
            target.track_attempt(Strategy::Hybrid, true, 1.0).await;
        }
        let imported = target.import_state(&snapshot).await.unwrap();
        assert_eq!(imported, basic);
        assert_eq!(target.config().await.learning_rate, 0.7);
        let metrics = target.metrics().await;
        assert!(metrics.get(Strategy::Hybrid).is_none());
        assert_eq!(metrics.total_attempts(), 12);
        assert_eq!(target.load_basic().await, basic);

        assert!(target.import_state(&json!({ "basic": 5 })).await.is_err());
        assert_eq!(target.config().await.learning_rate, 0.7);
    }

    #[tokio::test]
    async fn test_import_rejects_out_of_range_config() {
        let store = Arc::new(MemoryStore::new());
        let c = StrategyController::new(store.clone());
        c.set_learning_rate(0.4).await.unwrap();
        let before = store.load_json(KEY_CONFIG).await.unwrap();

        let snapshot = json!({
            "config": { "learningRate": 5.0, "decayFactor": -3.0, "minConfidence": 9.0 }
        });
        let err = c.import_state(&snapshot).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(c.config().await.learning_rate, 0.4);
        assert_eq!(store.load_json(KEY_CONFIG).await.unwrap(), before);
        assert!(store.load_json(KEY_BASIC).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stored_out_of_range_config_falls_back() {
        let store = Arc::new(MemoryStore::new());
        store
            .save_json(KEY_CONFIG, r#"{"learningRate": 2.5}"#)
            .await
            .unwrap();
        let c = StrategyController::new(store);
        assert_eq!(c.config().await, StrategyConfig::default());
    }

    #[tokio::test]
    async fn test_reset_all_restores_defaults() {
        let store = Arc::new(MemoryStore::new());
        let c = StrategyController::new(store.clone());
        c.set_learning_rate(0.9).await.unwrap();
        c.track_attempt(Strategy::Random, true, 1.0).await;
        c.save_basic(&BasicLearningState::new()).await.unwrap();
        c.reset_all().await.unwrap();
        assert_eq!(c.config().await, StrategyConfig::default());
        assert_eq!(c.metrics().await.total_attempts(), 0);
        assert!(store.is_empty());
    }
}
