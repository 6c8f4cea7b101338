pub mod advanced;
pub mod basic;
pub mod codec;
pub mod config;
pub mod metrics;
pub mod sampling;
pub mod types;

pub use advanced::{AdvancedLearningState, AdvancedStats, RecentSuccess};
pub use basic::{BasicLearningState, BasicStats};
pub use config::{
    AdvancedConfig, AutoSwitchThresholds, HybridWeights, HybridWeightsUpdate, LearningToggles,
    LearningTogglesUpdate, StrategyConfig,
};
pub use metrics::{AttemptRecord, PerformanceMetrics, StrategyStats};
pub use types::{Currency, Phrase, ResolvedStrategy, Strategy, WordCount};
