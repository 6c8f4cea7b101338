pub mod address;
pub mod balance;
pub mod rate_limiter;
pub mod scan;
pub mod strategy;

pub use address::AddressDeriver;
pub use balance::{
    BalanceChecker, BalanceCheckerConfig, BalanceQuery, BalanceResult, BalanceSource,
    HttpBalanceSource, HttpPriceSource, PriceSource, SimulatedBalanceSource, StaticPriceSource,
};
pub use rate_limiter::RateLimiter;
pub use scan::{
    BatchProgress, BatchRequest, BatchSummary, GenerationSource, LearningReport, ScanOrchestrator,
    ScanOutcome, TrainingSample,
};
pub use strategy::{HealthStatus, StrategyController, StrategyRecommendation};
