//! Configuration management for the vol-arb trader.
//!
//! Loads settings from environment variables and config files. All values
//! are immutable for the lifetime of a run; a restart picks up changes.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deribit API credentials
    #[serde(default)]
    pub deribit: DeribitConfig,
    /// Capital allocation settings
    #[serde(default)]
    pub capital: CapitalConfig,
    /// Historical volatility estimation parameters
    #[serde(default)]
    pub volatility: VolatilityConfig,
    /// Opportunity classification and spread construction parameters
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Polling cadence
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeribitConfig {
    /// OAuth client id for authentication
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,
    /// Use testnet instead of production
    #[serde(default)]
    pub testnet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalConfig {
    /// Total account capital in USD
    #[serde(default = "default_total_capital")]
    pub total_capital: Decimal,
    /// Fraction of total capital available for trading (rest is reserve)
    #[serde(default = "default_active_fraction")]
    pub active_fraction: Decimal,
    /// Fraction of active capital allowed per position
    #[serde(default = "default_per_position_fraction")]
    pub per_position_fraction: Decimal,
    /// Maximum number of simultaneous option positions
    #[serde(default = "default_max_positions")]
    pub max_positions: u8,
}

impl CapitalConfig {
    /// Budget for a single spread's absolute net cost.
    pub fn per_position_budget(&self) -> Decimal {
        self.total_capital * self.active_fraction * self.per_position_fraction
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// Short lookback window in periods
    #[serde(default = "default_window_short")]
    pub window_short: usize,
    /// Medium lookback window in periods
    #[serde(default = "default_window_medium")]
    pub window_medium: usize,
    /// Long lookback window in periods
    #[serde(default = "default_window_long")]
    pub window_long: usize,
    /// Weight of the short-window estimate
    #[serde(default = "default_weight_short")]
    pub weight_short: f64,
    /// Weight of the medium-window estimate
    #[serde(default = "default_weight_medium")]
    pub weight_medium: f64,
    /// Weight of the long-window estimate
    #[serde(default = "default_weight_long")]
    pub weight_long: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// IV/HV ratio above which implied volatility counts as overpriced
    #[serde(default = "default_iv_hv_high_threshold")]
    pub iv_hv_high_threshold: f64,
    /// IV/HV ratio below which implied volatility counts as underpriced
    #[serde(default = "default_iv_hv_low_threshold")]
    pub iv_hv_low_threshold: f64,
    /// Minimum days to expiry for an eligible instrument (inclusive)
    #[serde(default = "default_min_days_to_expiry")]
    pub min_days_to_expiry: i64,
    /// Maximum days to expiry for an eligible instrument (inclusive)
    #[serde(default = "default_max_days_to_expiry")]
    pub max_days_to_expiry: i64,
    /// Companion-strike offset as a fraction of the opportunity strike
    #[serde(default = "default_strike_offset_pct")]
    pub strike_offset_pct: Decimal,
    /// Profit target as a fraction of maximum profit (position review only)
    #[serde(default = "default_profit_target_pct")]
    pub profit_target_pct: Decimal,
    /// Stop loss as a fraction of maximum loss (position review only)
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Underlyings tracked by the strategy loop
    #[serde(default = "default_underlyings")]
    pub underlyings: Vec<String>,
    /// Minimum contract amount for BTC options
    #[serde(default = "default_btc_contract_size")]
    pub btc_contract_size: Decimal,
    /// Minimum contract amount for ETH options
    #[serde(default = "default_eth_contract_size")]
    pub eth_contract_size: Decimal,
    /// Strike price tick for BTC options
    #[serde(default = "default_btc_strike_tick")]
    pub btc_strike_tick: Decimal,
    /// Strike price tick for ETH options
    #[serde(default = "default_eth_strike_tick")]
    pub eth_strike_tick: Decimal,
}

impl StrategyConfig {
    /// Contract amount for one spread leg on the given underlying.
    pub fn contract_size(&self, underlying: &str) -> Decimal {
        match underlying.to_uppercase().as_str() {
            "BTC" => self.btc_contract_size,
            _ => self.eth_contract_size,
        }
    }

    /// Strike tick used when rounding companion strikes.
    pub fn strike_tick(&self, underlying: &str) -> Decimal {
        match underlying.to_uppercase().as_str() {
            "BTC" => self.btc_strike_tick,
            _ => self.eth_strike_tick,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between strategy cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Seconds to wait after a failed cycle before resuming
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,
}

// Default value functions

fn default_total_capital() -> Decimal {
    Decimal::new(300, 0) // $300
}

fn default_active_fraction() -> Decimal {
    Decimal::new(5, 1) // 0.5 - half the capital trades, half is reserve
}

fn default_per_position_fraction() -> Decimal {
    Decimal::new(1, 1) // 0.1 - 10% of active capital per position
}

fn default_max_positions() -> u8 {
    5
}

fn default_window_short() -> usize {
    7
}

fn default_window_medium() -> usize {
    14
}

fn default_window_long() -> usize {
    30
}

fn default_weight_short() -> f64 {
    0.5
}

fn default_weight_medium() -> f64 {
    0.3
}

fn default_weight_long() -> f64 {
    0.2
}

fn default_iv_hv_high_threshold() -> f64 {
    1.3
}

fn default_iv_hv_low_threshold() -> f64 {
    0.7
}

fn default_min_days_to_expiry() -> i64 {
    7
}

fn default_max_days_to_expiry() -> i64 {
    21
}

fn default_strike_offset_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05 - companion strike sits 5% away
}

fn default_profit_target_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5 - half of maximum profit
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5 - half of maximum loss
}

fn default_underlyings() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string()]
}

fn default_btc_contract_size() -> Decimal {
    Decimal::new(1, 2) // 0.01 BTC
}

fn default_eth_contract_size() -> Decimal {
    Decimal::new(1, 1) // 0.1 ETH
}

fn default_btc_strike_tick() -> Decimal {
    Decimal::new(250, 0)
}

fn default_eth_strike_tick() -> Decimal {
    Decimal::new(25, 0)
}

fn default_poll_interval_secs() -> u64 {
    3600
}

fn default_recovery_interval_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("VOLARB"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.capital.total_capital > Decimal::ZERO,
            "total_capital must be positive"
        );

        anyhow::ensure!(
            self.capital.active_fraction > Decimal::ZERO
                && self.capital.active_fraction <= Decimal::ONE,
            "active_fraction must be between 0 and 1"
        );

        anyhow::ensure!(
            self.capital.per_position_fraction > Decimal::ZERO
                && self.capital.per_position_fraction <= Decimal::ONE,
            "per_position_fraction must be between 0 and 1"
        );

        anyhow::ensure!(self.capital.max_positions >= 1, "max_positions must be >= 1");

        anyhow::ensure!(
            self.volatility.window_short >= 2,
            "window_short must be at least 2 periods for a sample deviation"
        );

        anyhow::ensure!(
            self.volatility.window_short < self.volatility.window_medium
                && self.volatility.window_medium < self.volatility.window_long,
            "volatility windows must be strictly increasing"
        );

        let weight_sum = self.volatility.weight_short
            + self.volatility.weight_medium
            + self.volatility.weight_long;
        anyhow::ensure!(
            (weight_sum - 1.0).abs() < 1e-9,
            "volatility weights must sum to 1.0, got {weight_sum}"
        );

        anyhow::ensure!(
            self.strategy.iv_hv_low_threshold > 0.0
                && self.strategy.iv_hv_high_threshold > self.strategy.iv_hv_low_threshold,
            "iv_hv_high_threshold must exceed iv_hv_low_threshold, both positive"
        );

        anyhow::ensure!(
            self.strategy.min_days_to_expiry >= 0
                && self.strategy.min_days_to_expiry <= self.strategy.max_days_to_expiry,
            "expiry window must satisfy 0 <= min <= max"
        );

        anyhow::ensure!(
            self.strategy.strike_offset_pct > Decimal::ZERO
                && self.strategy.strike_offset_pct < Decimal::ONE,
            "strike_offset_pct must be between 0 and 1"
        );

        anyhow::ensure!(
            !self.strategy.underlyings.is_empty(),
            "at least one underlying must be tracked"
        );

        anyhow::ensure!(
            self.schedule.recovery_interval_secs < self.schedule.poll_interval_secs,
            "recovery_interval_secs must be shorter than poll_interval_secs"
        );

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deribit: DeribitConfig::default(),
            capital: CapitalConfig::default(),
            volatility: VolatilityConfig::default(),
            strategy: StrategyConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for DeribitConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            testnet: true,
        }
    }
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            total_capital: default_total_capital(),
            active_fraction: default_active_fraction(),
            per_position_fraction: default_per_position_fraction(),
            max_positions: default_max_positions(),
        }
    }
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            window_short: default_window_short(),
            window_medium: default_window_medium(),
            window_long: default_window_long(),
            weight_short: default_weight_short(),
            weight_medium: default_weight_medium(),
            weight_long: default_weight_long(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            iv_hv_high_threshold: default_iv_hv_high_threshold(),
            iv_hv_low_threshold: default_iv_hv_low_threshold(),
            min_days_to_expiry: default_min_days_to_expiry(),
            max_days_to_expiry: default_max_days_to_expiry(),
            strike_offset_pct: default_strike_offset_pct(),
            profit_target_pct: default_profit_target_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            underlyings: default_underlyings(),
            btc_contract_size: default_btc_contract_size(),
            eth_contract_size: default_eth_contract_size(),
            btc_strike_tick: default_btc_strike_tick(),
            eth_strike_tick: default_eth_strike_tick(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            recovery_interval_secs: default_recovery_interval_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_per_position_budget() {
        // $300 total, 50% active, 10% per position => $15
        let capital = CapitalConfig::default();
        assert_eq!(capital.per_position_budget(), dec!(15.00));
    }

    #[test]
    fn test_contract_size_and_tick_per_underlying() {
        let strategy = StrategyConfig::default();
        assert_eq!(strategy.contract_size("BTC"), dec!(0.01));
        assert_eq!(strategy.contract_size("ETH"), dec!(0.1));
        assert_eq!(strategy.strike_tick("btc"), dec!(250));
        assert_eq!(strategy.strike_tick("ETH"), dec!(25));
    }

    #[test]
    fn test_rejects_bad_weights() {
        let mut config = Config::default();
        config.volatility.weight_short = 0.6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_single_period_short_window() {
        let mut config = Config::default();
        config.volatility.window_short = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.strategy.iv_hv_high_threshold = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_recovery_longer_than_poll() {
        let mut config = Config::default();
        config.schedule.recovery_interval_secs = config.schedule.poll_interval_secs;
        assert!(config.validate().is_err());
    }
}
