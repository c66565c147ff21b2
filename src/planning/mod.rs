//! Planning pipeline: findings → tasks → correlations → candidate plans →
//! selected plan.

pub mod detector;
pub mod factory;
pub mod optimizer;
pub mod strategy;

pub use detector::CorrelationDetector;
pub use factory::TaskFactory;
pub use optimizer::PlanOptimizer;
pub use strategy::StrategyGenerator;
