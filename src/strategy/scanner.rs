//! Volatility-arbitrage opportunity scanning.
//!
//! One scan covers one underlying: estimate historical volatility from the
//! perpetual's daily closes, walk the live option chain, and classify each
//! contract in the expiry window by its IV/HV ratio.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use tracing::{debug, info, instrument, warn};

use crate::config::{StrategyConfig, VolatilityConfig};
use crate::error::ScanError;
use crate::exchange::{InstrumentQuote, OptionType, OptionsGateway, TradeDirection};
use crate::volatility::VolatilityEstimator;

const DAY_MS: i64 = 86_400_000;
const HISTORY_RESOLUTION: &str = "1D";

/// One mispriced contract found by a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub instrument_name: String,
    pub underlying: String,
    pub expiry_code: String,
    pub strike: Decimal,
    pub option_type: OptionType,
    pub expiration_timestamp: i64,
    pub days_to_expiry: i64,
    pub iv: f64,
    pub hv: f64,
    pub ratio: f64,
    /// Sell when IV is rich against HV, buy when it is cheap.
    pub direction: TradeDirection,
}

/// Scans one underlying's option chain for IV/HV mispricings.
pub struct OpportunityScanner {
    estimator: VolatilityEstimator,
    history_limit: u32,
    strategy: StrategyConfig,
}

impl OpportunityScanner {
    pub fn new(volatility: VolatilityConfig, strategy: StrategyConfig) -> Self {
        let history_limit = (volatility.window_long + 1) as u32;
        Self {
            estimator: VolatilityEstimator::new(volatility),
            history_limit,
            strategy,
        }
    }

    /// Scan the chain of `underlying` as of `now_ms` (unix millis).
    ///
    /// Returns the unordered set of opportunities. A failed IV fetch
    /// excludes only that instrument; chain-level failures abort the scan.
    #[instrument(skip(self, gateway))]
    pub async fn scan(
        &self,
        gateway: &dyn OptionsGateway,
        underlying: &str,
        now_ms: i64,
    ) -> Result<Vec<Opportunity>, ScanError> {
        let series = gateway
            .get_historical_prices(underlying, HISTORY_RESOLUTION, self.history_limit)
            .await?;
        let hv = self.estimator.weighted_estimate(&series)?;

        if hv <= f64::EPSILON {
            warn!(underlying, hv, "historical volatility is zero, skipping scan");
            return Ok(Vec::new());
        }

        let instruments = gateway.list_instruments(underlying).await?;
        let chain_size = instruments.len();

        let mut opportunities = Vec::new();
        let mut outside_window = 0usize;
        let mut iv_failures = 0usize;

        for quote in instruments {
            let days = days_to_expiry(quote.expiration_timestamp, now_ms);
            if days < self.strategy.min_days_to_expiry || days > self.strategy.max_days_to_expiry {
                outside_window += 1;
                continue;
            }

            let iv = match gateway.get_implied_volatility(&quote.instrument_name).await {
                Ok(iv) => iv,
                Err(err) => {
                    warn!(
                        instrument = %quote.instrument_name,
                        error = %err,
                        "IV fetch failed, excluding instrument"
                    );
                    iv_failures += 1;
                    continue;
                }
            };

            let ratio = iv / hv;
            let Some(direction) = classify(
                ratio,
                self.strategy.iv_hv_high_threshold,
                self.strategy.iv_hv_low_threshold,
            ) else {
                debug!(instrument = %quote.instrument_name, ratio, "within fair-value band");
                continue;
            };

            opportunities.push(opportunity_from_quote(quote, days, iv, hv, ratio, direction));
        }

        info!(
            underlying,
            hv,
            chain_size,
            outside_window,
            iv_failures,
            found = opportunities.len(),
            "scan complete"
        );
        Ok(opportunities)
    }
}

fn opportunity_from_quote(
    quote: InstrumentQuote,
    days_to_expiry: i64,
    iv: f64,
    hv: f64,
    ratio: f64,
    direction: TradeDirection,
) -> Opportunity {
    Opportunity {
        instrument_name: quote.instrument_name,
        underlying: quote.underlying,
        expiry_code: quote.expiry_code,
        strike: quote.strike,
        option_type: quote.option_type,
        expiration_timestamp: quote.expiration_timestamp,
        days_to_expiry,
        iv,
        hv,
        ratio,
        direction,
    }
}

/// Whole days between now and expiration, rounded down.
fn days_to_expiry(expiration_timestamp: i64, now_ms: i64) -> i64 {
    (expiration_timestamp - now_ms).div_euclid(DAY_MS)
}

/// Strict-inequality classification: a ratio sitting exactly on a
/// threshold is fair-valued.
fn classify(ratio: f64, high: f64, low: f64) -> Option<TradeDirection> {
    if ratio > high {
        Some(TradeDirection::Sell)
    } else if ratio < low {
        Some(TradeDirection::Buy)
    } else {
        None
    }
}

/// Order opportunities for execution: every sell candidate outranks every
/// buy candidate, sells by ratio descending, buys by ratio ascending.
pub fn rank_opportunities(mut opportunities: Vec<Opportunity>) -> Vec<Opportunity> {
    opportunities.sort_by(|a, b| match (a.direction, b.direction) {
        (TradeDirection::Sell, TradeDirection::Buy) => Ordering::Less,
        (TradeDirection::Buy, TradeDirection::Sell) => Ordering::Greater,
        (TradeDirection::Sell, TradeDirection::Sell) => {
            b.ratio.partial_cmp(&a.ratio).unwrap_or(Ordering::Equal)
        }
        (TradeDirection::Buy, TradeDirection::Buy) => {
            a.ratio.partial_cmp(&b.ratio).unwrap_or(Ordering::Equal)
        }
    });
    opportunities
}
