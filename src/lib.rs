//! # Vol-Arb Trader
//!
//! A Rust application that trades the gap between implied and historical
//! volatility on crypto options, using defined-risk vertical spreads.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `error`: Typed error taxonomy shared across components
//! - `exchange`: Options exchange gateway (Deribit REST + mock)
//! - `volatility`: Weighted historical volatility estimation
//! - `strategy`: Opportunity scanning, spread construction, and the main loop
//! - `persistence`: SQLite-based trade history
//! - `utils`: Shared decimal arithmetic helpers

pub mod config;
pub mod error;
pub mod exchange;
pub mod persistence;
pub mod strategy;
pub mod utils;
pub mod volatility;

pub use config::Config;
