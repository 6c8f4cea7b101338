use serde_json::{json, Value};

use crate::error::{EngineError, Result};
use crate::learning::codec::{as_object, get_bool, get_f64, get_u64, DecodeResult};

pub const HYBRID_WEIGHT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningToggles {
    pub frequency: bool,
    pub positional: bool,
    pub correlation: bool,
}

impl Default for LearningToggles {
    fn default() -> Self {
        Self {
            frequency: true,
            positional: true,
            correlation: true,
        }
    }
}

/// Partial update for [`LearningToggles`]; `None` leaves the flag unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LearningTogglesUpdate {
    pub frequency: Option<bool>,
    pub positional: Option<bool>,
    pub correlation: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub positional: f64,
    pub correlation: f64,
    pub frequency: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            positional: 0.4,
            correlation: 0.3,
            frequency: 0.3,
        }
    }
}

impl HybridWeights {
    pub fn sum(&self) -> f64 {
        self.positional + self.correlation + self.frequency
    }

    pub fn merged(&self, update: HybridWeightsUpdate) -> Self {
        Self {
            positional: update.positional.unwrap_or(self.positional),
            correlation: update.correlation.unwrap_or(self.correlation),
            frequency: update.frequency.unwrap_or(self.frequency),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let parts = [self.positional, self.correlation, self.frequency];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EngineError::validation(
                "hybrid weights must be finite and non-negative",
            ));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > HYBRID_WEIGHT_TOLERANCE {
            return Err(EngineError::validation(format!(
                "hybrid weights must sum to 1.0, got {sum:.4}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HybridWeightsUpdate {
    pub positional: Option<f64>,
    pub correlation: Option<f64>,
    pub frequency: Option<f64>,
}

/// Success counts at which the adaptive strategy escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSwitchThresholds {
    pub frequency: u64,
    pub positional: u64,
    pub hybrid: u64,
}

impl Default for AutoSwitchThresholds {
    fn default() -> Self {
        Self {
            frequency: 10,
            positional: 50,
            hybrid: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    /// Stored and validated; counts always move by one, so no learning path reads it.
    pub learning_rate: f64,
    pub decay_factor: f64,
    pub min_confidence: f64,
    pub max_pattern_age_days: f64,
    pub learning: LearningToggles,
    pub hybrid_weights: HybridWeights,
    pub auto_switch: AutoSwitchThresholds,
    pub performance_tracking: bool,
    pub performance_window: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            decay_factor: 0.95,
            min_confidence: 0.3,
            max_pattern_age_days: 30.0,
            learning: LearningToggles::default(),
            hybrid_weights: HybridWeights::default(),
            auto_switch: AutoSwitchThresholds::default(),
            performance_tracking: true,
            performance_window: 100,
        }
    }
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(EngineError::validation(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<()> {
        unit_interval("learning rate", self.learning_rate)?;
        unit_interval("decay factor", self.decay_factor)?;
        unit_interval("min confidence", self.min_confidence)?;
        if !self.max_pattern_age_days.is_finite() || self.max_pattern_age_days < 0.0 {
            return Err(EngineError::validation(format!(
                "max pattern age must be a non-negative number of days, got {}",
                self.max_pattern_age_days
            )));
        }
        self.hybrid_weights.validate()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "learningRate": self.learning_rate,
            "decayFactor": self.decay_factor,
            "minConfidence": self.min_confidence,
            "maxPatternAgeDays": self.max_pattern_age_days,
            "learning": {
                "frequency": self.learning.frequency,
                "positional": self.learning.positional,
                "correlation": self.learning.correlation,
            },
            "hybridWeights": {
                "positional": self.hybrid_weights.positional,
                "correlation": self.hybrid_weights.correlation,
                "frequency": self.hybrid_weights.frequency,
            },
            "autoSwitch": {
                "frequency": self.auto_switch.frequency,
                "positional": self.auto_switch.positional,
                "hybrid": self.auto_switch.hybrid,
            },
            "performanceTracking": self.performance_tracking,
            "performanceWindow": self.performance_window,
        })
    }

    /// Absent fields keep their defaults so older blobs stay readable.
    pub fn from_json(value: &Value) -> DecodeResult<Self> {
        let d = Self::default();
        let obj = as_object(value, "strategy config")?;
        let empty = serde_json::Map::new();
        let learning = match obj.get("learning") {
            Some(v) => as_object(v, "learning")?,
            None => &empty,
        };
        let weights = match obj.get("hybridWeights") {
            Some(v) => as_object(v, "hybridWeights")?,
            None => &empty,
        };
        let switch = match obj.get("autoSwitch") {
            Some(v) => as_object(v, "autoSwitch")?,
            None => &empty,
        };
        let window = match obj.get("performanceWindow") {
            Some(_) => get_u64(obj, "performanceWindow")? as usize,
            None => d.performance_window,
        };

        let config = Self {
            learning_rate: get_f64(obj, "learningRate", d.learning_rate)?,
            decay_factor: get_f64(obj, "decayFactor", d.decay_factor)?,
            min_confidence: get_f64(obj, "minConfidence", d.min_confidence)?,
            max_pattern_age_days: get_f64(obj, "maxPatternAgeDays", d.max_pattern_age_days)?,
            learning: LearningToggles {
                frequency: get_bool(learning, "frequency", d.learning.frequency)?,
                positional: get_bool(learning, "positional", d.learning.positional)?,
                correlation: get_bool(learning, "correlation", d.learning.correlation)?,
            },
            hybrid_weights: HybridWeights {
                positional: get_f64(weights, "positional", d.hybrid_weights.positional)?,
                correlation: get_f64(weights, "correlation", d.hybrid_weights.correlation)?,
                frequency: get_f64(weights, "frequency", d.hybrid_weights.frequency)?,
            },
            auto_switch: AutoSwitchThresholds {
                frequency: threshold_or(switch, "frequency", d.auto_switch.frequency)?,
                positional: threshold_or(switch, "positional", d.auto_switch.positional)?,
                hybrid: threshold_or(switch, "hybrid", d.auto_switch.hybrid)?,
            },
            performance_tracking: get_bool(obj, "performanceTracking", d.performance_tracking)?,
            performance_window: window.max(1),
        };
        Ok(config)
    }
}

fn threshold_or(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    default: u64,
) -> DecodeResult<u64> {
    if obj.contains_key(key) {
        get_u64(obj, key)
    } else {
        Ok(default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvancedStrategyWeights {
    pub ngram: f64,
    pub positional: f64,
    pub random: f64,
}

impl Default for AdvancedStrategyWeights {
    fn default() -> Self {
        Self {
            ngram: 0.6,
            positional: 0.25,
            random: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvancedConfig {
    pub decay_rate: f64,
    pub min_pattern_age_days: f64,
    pub max_history: usize,
    pub decay_floor: f64,
    pub strategy_weights: AdvancedStrategyWeights,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.95,
            min_pattern_age_days: 7.0,
            max_history: 100,
            decay_floor: 0.5,
            strategy_weights: AdvancedStrategyWeights::default(),
        }
    }
}

impl AdvancedConfig {
    pub fn to_json(&self) -> Value {
        json!({
            "decayRate": self.decay_rate,
            "minPatternAgeDays": self.min_pattern_age_days,
            "maxHistory": self.max_history,
            "decayFloor": self.decay_floor,
            "strategyWeights": {
                "ngram": self.strategy_weights.ngram,
                "positional": self.strategy_weights.positional,
                "random": self.strategy_weights.random,
            },
        })
    }

    pub fn from_json(value: Option<&Value>) -> DecodeResult<Self> {
        let d = Self::default();
        let Some(value) = value else {
            return Ok(d);
        };
        let obj = as_object(value, "advanced config")?;
        let empty = serde_json::Map::new();
        let weights = match obj.get("strategyWeights") {
            Some(v) => as_object(v, "strategyWeights")?,
            None => &empty,
        };
        let max_history = match obj.get("maxHistory") {
            Some(_) => get_u64(obj, "maxHistory")? as usize,
            None => d.max_history,
        };
        Ok(Self {
            decay_rate: get_f64(obj, "decayRate", d.decay_rate)?,
            min_pattern_age_days: get_f64(obj, "minPatternAgeDays", d.min_pattern_age_days)?,
            max_history,
            decay_floor: get_f64(obj, "decayFloor", d.decay_floor)?,
            strategy_weights: AdvancedStrategyWeights {
                ngram: get_f64(weights, "ngram", d.strategy_weights.ngram)?,
                positional: get_f64(weights, "positional", d.strategy_weights.positional)?,
                random: get_f64(weights, "random", d.strategy_weights.random)?,
            },
        })
    }
}
