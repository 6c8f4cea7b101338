use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::learning::codec::{
    as_object, decode_time, encode_time, get_bool, get_f64, get_time, get_u64, truncate_millis,
    DecodeResult,
};
use crate::learning::types::Strategy;

/// Strategies below this many attempts are not ranked.
pub const MIN_RANKED_ATTEMPTS: u64 = 10;
const CONFIDENCE_FULL_AT: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStats {
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

impl StrategyStats {
    fn record(&mut self, success: bool, latency_ms: f64) {
        self.attempts = self.attempts.saturating_add(1);
        if success {
            self.successes = self.successes.saturating_add(1);
        }
        self.success_rate = self.successes as f64 / self.attempts as f64;
        self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / self.attempts as f64;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub strategy: Strategy,
    pub success: bool,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub strategies: HashMap<Strategy, StrategyStats>,
    pub recent: VecDeque<AttemptRecord>,
    pub best_strategy: Option<Strategy>,
    pub worst_strategy: Option<Strategy>,
    pub improvement_rate: f64,
    pub confidence: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_attempts(&self) -> u64 {
        self.strategies
            .values()
            .fold(0, |acc: u64, s| acc.saturating_add(s.attempts))
    }

    pub fn total_successes(&self) -> u64 {
        self.strategies
            .values()
            .fold(0, |acc: u64, s| acc.saturating_add(s.successes))
    }

    pub fn get(&self, strategy: Strategy) -> Option<&StrategyStats> {
        self.strategies.get(&strategy)
    }

    pub fn track(&mut self, strategy: Strategy, success: bool, latency_ms: f64, window: usize) {
        self.track_at(strategy, success, latency_ms, window, Utc::now());
    }

    pub fn track_at(
        &mut self,
        strategy: Strategy,
        success: bool,
        latency_ms: f64,
        window: usize,
        now: DateTime<Utc>,
    ) {
        let now = truncate_millis(now);
        let latency_ms = if latency_ms.is_finite() { latency_ms.max(0.0) } else { 0.0 };
        self.strategies
            .entry(strategy)
            .or_default()
            .record(success, latency_ms);

        self.recent.push_back(AttemptRecord {
            strategy,
            success,
            latency_ms,
            timestamp: now,
        });
        while self.recent.len() > window.max(1) {
            self.recent.pop_front();
        }

        self.last_updated = Some(now);
        self.recompute();
    }

    fn ranked(&self) -> impl Iterator<Item = (Strategy, &StrategyStats)> + '_ {
        Strategy::all().iter().filter_map(|s| {
            self.strategies
                .get(s)
                .filter(|stats| stats.attempts >= MIN_RANKED_ATTEMPTS)
                .map(|stats| (*s, stats))
        })
    }

    fn recompute(&mut self) {
        let mut best: Option<(Strategy, f64)> = None;
        let mut worst: Option<(Strategy, f64)> = None;
        for (s, stats) in self.ranked() {
            if best.map_or(true, |(_, rate)| stats.success_rate > rate) {
                best = Some((s, stats.success_rate));
            }
            if worst.map_or(true, |(_, rate)| stats.success_rate < rate) {
                worst = Some((s, stats.success_rate));
            }
        }
        self.best_strategy = best.map(|(s, _)| s);
        self.worst_strategy = worst.map(|(s, _)| s);

        let baseline = self
            .ranked()
            .find(|(s, _)| *s == Strategy::Random)
            .map(|(_, stats)| stats.success_rate);
        let best_learned = self
            .ranked()
            .filter(|(s, _)| *s != Strategy::Random)
            .map(|(_, stats)| stats.success_rate)
            .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))));
        self.improvement_rate = match (baseline, best_learned) {
            (Some(base), Some(learned)) if base > 0.0 => (learned - base) / base,
            _ => 0.0,
        };

        self.confidence = (self.total_attempts() as f64 / CONFIDENCE_FULL_AT).min(1.0);
    }

    pub fn to_json(&self) -> Value {
        let strategies: serde_json::Map<String, Value> = self
            .strategies
            .iter()
            .map(|(s, stats)| {
                (
                    s.as_str().to_string(),
                    json!({
                        "attempts": stats.attempts,
                        "successes": stats.successes,
                        "avgLatencyMs": stats.avg_latency_ms,
                    }),
                )
            })
            .collect();
        let recent: Vec<Value> = self
            .recent
            .iter()
            .map(|r| {
                json!({
                    "strategy": r.strategy.as_str(),
                    "success": r.success,
                    "latencyMs": r.latency_ms,
                    "timestamp": encode_time(&r.timestamp),
                })
            })
            .collect();
        json!({
            "strategies": strategies,
            "recent": recent,
            "lastUpdated": self.last_updated.as_ref().map(encode_time),
        })
    }

    /// Rates, rankings and confidence are derived, so only raw counters are read back.
    pub fn from_json(value: &Value) -> DecodeResult<Self> {
        let obj = as_object(value, "performance metrics")?;
        let mut metrics = Self::default();

        if let Some(strategies) = obj.get("strategies") {
            for (label, entry) in as_object(strategies, "strategies")? {
                let strategy = label
                    .parse::<Strategy>()
                    .map_err(|e| format!("strategies: {e}"))?;
                let entry = as_object(entry, "strategies[]")?;
                let attempts = get_u64(entry, "attempts")?;
                let successes = get_u64(entry, "successes")?;
                if successes > attempts {
                    return Err(format!("strategies.{label}: successes exceed attempts"));
                }
                let success_rate = if attempts == 0 {
                    0.0
                } else {
                    successes as f64 / attempts as f64
                };
                metrics.strategies.insert(
                    strategy,
                    StrategyStats {
                        attempts,
                        successes,
                        success_rate,
                        avg_latency_ms: get_f64(entry, "avgLatencyMs", 0.0)?,
                    },
                );
            }
        }

        if let Some(recent) = obj.get("recent") {
            let items = recent
                .as_array()
                .ok_or_else(|| "recent: expected array".to_string())?;
            for item in items {
                let entry = as_object(item, "recent[]")?;
                let strategy = entry
                    .get("strategy")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "recent[].strategy: expected string".to_string())?
                    .parse::<Strategy>()
                    .map_err(|e| format!("recent[].strategy: {e}"))?;
                let raw_ts = entry
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "recent[].timestamp: expected string".to_string())?;
                metrics.recent.push_back(AttemptRecord {
                    strategy,
                    success: get_bool(entry, "success", false)?,
                    latency_ms: get_f64(entry, "latencyMs", 0.0)?,
                    timestamp: decode_time(raw_ts, "recent[].timestamp")?,
                });
            }
        }

        metrics.last_updated = get_time(obj, "lastUpdated")?;
        metrics.recompute();
        Ok(metrics)
    }
}
