//! Volatility-arbitrage strategy core.
//!
//! - Scanning: IV/HV classification over the live option chain
//! - Building: vertical spread planning and two-leg execution
//! - Engine: the polling loop tying scan, build, and review together

pub mod builder;
pub mod engine;
pub mod scanner;

pub use builder::{ExecutedSpread, SpreadBuilder, SpreadKind, SpreadPlan};
pub use engine::{CycleReport, StrategyEngine};
pub use scanner::{rank_opportunities, Opportunity, OpportunityScanner};
