//! Historical volatility estimation.
//!
//! Statistical math runs in `f64`; prices stay `Decimal` everywhere money
//! is at stake. Crypto trades every day, so annualization uses 365 periods.

use rust_decimal::prelude::ToPrimitive;

use crate::config::VolatilityConfig;
use crate::error::VolatilityError;
use crate::exchange::PriceSeries;

/// Annualization factor base for daily observations.
const ANNUALIZATION_PERIODS: f64 = 365.0;

/// Computes a weighted historical volatility from a close-price series.
pub struct VolatilityEstimator {
    config: VolatilityConfig,
}

impl VolatilityEstimator {
    pub fn new(config: VolatilityConfig) -> Self {
        Self { config }
    }

    /// Weighted annualized historical volatility over the configured
    /// short/medium/long windows.
    ///
    /// Fails with `InsufficientData` when the series cannot fill the
    /// largest window; never falls back to a truncated window.
    pub fn weighted_estimate(&self, series: &PriceSeries) -> Result<f64, VolatilityError> {
        let smallest = self
            .config
            .window_short
            .min(self.config.window_medium)
            .min(self.config.window_long);
        if smallest < 2 {
            return Err(VolatilityError::InvalidInput(format!(
                "window of {smallest} periods cannot produce a sample deviation"
            )));
        }

        let largest = self
            .config
            .window_short
            .max(self.config.window_medium)
            .max(self.config.window_long);
        let needed = largest + 1;
        if series.len() < needed {
            return Err(VolatilityError::InsufficientData {
                needed,
                got: series.len(),
            });
        }

        if !series.timestamps_strictly_increasing() {
            return Err(VolatilityError::InvalidInput(format!(
                "timestamps for {} are not strictly increasing",
                series.underlying
            )));
        }

        let closes = series
            .closes()
            .map(|close| {
                let value = close.to_f64().ok_or_else(|| {
                    VolatilityError::InvalidInput(format!("unrepresentable price {close}"))
                })?;
                if value <= 0.0 {
                    return Err(VolatilityError::InvalidInput(format!(
                        "non-positive price {close} in series for {}",
                        series.underlying
                    )));
                }
                Ok(value)
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let returns = log_returns(&closes);

        let hv_short = annualized_trailing_vol(&returns, self.config.window_short);
        let hv_medium = annualized_trailing_vol(&returns, self.config.window_medium);
        let hv_long = annualized_trailing_vol(&returns, self.config.window_long);

        Ok(hv_short * self.config.weight_short
            + hv_medium * self.config.weight_medium
            + hv_long * self.config.weight_long)
    }
}

/// Log returns `ln(p_t / p_{t-1})` over consecutive closes.
fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|pair| (pair[1] / pair[0]).ln())
        .collect()
}

/// Sample standard deviation of the trailing `window` returns, annualized.
/// Callers guarantee `2 <= window <= returns.len()`.
fn annualized_trailing_vol(returns: &[f64], window: usize) -> f64 {
    let tail = &returns[returns.len() - window..];
    let mean = tail.iter().sum::<f64>() / window as f64;
    let variance = tail
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / (window - 1) as f64;
    variance.sqrt() * ANNUALIZATION_PERIODS.sqrt()
}
