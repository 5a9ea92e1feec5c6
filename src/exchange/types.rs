//! Type definitions for the options exchange boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Single-letter code used in instrument names (e.g. `BTC-26SEP25-65000-C`).
    pub fn code(&self) -> &'static str {
        match self {
            OptionType::Call => "C",
            OptionType::Put => "P",
        }
    }
}

/// Trade direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

/// Order execution type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    Market,
}

/// One close-price observation of an underlying.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub close: Decimal,
}

/// An ordered close-price series for one underlying.
///
/// Timestamps must be strictly increasing; the volatility estimator
/// rejects series that violate this.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub underlying: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(underlying: impl Into<String>, points: Vec<PricePoint>) -> Self {
        Self {
            underlying: underlying.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Closing prices in series order.
    pub fn closes(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.points.iter().map(|p| p.close)
    }

    pub fn timestamps_strictly_increasing(&self) -> bool {
        self.points.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
    }
}

/// Immutable snapshot of one listed option contract.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentQuote {
    /// Venue instrument name, e.g. `BTC-26SEP25-65000-C`
    pub instrument_name: String,
    /// Underlying currency, e.g. `BTC`
    pub underlying: String,
    /// Expiry segment of the instrument name, e.g. `26SEP25`
    pub expiry_code: String,
    pub strike: Decimal,
    pub option_type: OptionType,
    /// Milliseconds since epoch
    pub expiration_timestamp: i64,
}

/// Best executable prices of one instrument's order book.
#[derive(Debug, Clone, PartialEq)]
pub struct BookTop {
    pub instrument_name: String,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

/// Acknowledgement for a submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub instrument_name: String,
    /// Signed amount: positive bought, negative sold
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub label: Option<String>,
}

/// An open position as reported by the venue. Flat entries (direction
/// "zero") are dropped at the gateway, so `direction` is always a side.
#[derive(Debug, Clone)]
pub struct Position {
    pub instrument_name: String,
    pub size: Decimal,
    pub direction: TradeDirection,
    pub average_price: Decimal,
    pub mark_price: Decimal,
    pub floating_profit_loss: Decimal,
}

impl Position {
    /// True for option positions (calls and puts), false for futures.
    pub fn is_option(&self) -> bool {
        self.instrument_name.ends_with("-C") || self.instrument_name.ends_with("-P")
    }
}

/// Per-currency account state.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSummary {
    pub currency: String,
    pub equity: Decimal,
    #[serde(default)]
    pub equity_usd: Option<Decimal>,
    #[serde(default)]
    pub available_funds: Decimal,
}

/// Build a venue instrument name from its parts.
///
/// Strikes are normalized so `68250.00` renders as `68250`.
pub fn instrument_name(
    underlying: &str,
    expiry_code: &str,
    strike: Decimal,
    option_type: OptionType,
) -> String {
    format!(
        "{}-{}-{}-{}",
        underlying,
        expiry_code,
        strike.normalize(),
        option_type.code()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_instrument_name_formatting() {
        assert_eq!(
            instrument_name("BTC", "26SEP25", dec!(68250), OptionType::Call),
            "BTC-26SEP25-68250-C"
        );
        assert_eq!(
            instrument_name("ETH", "26SEP25", dec!(3500.00), OptionType::Put),
            "ETH-26SEP25-3500-P"
        );
    }

    #[test]
    fn test_position_option_detection() {
        let mk = |name: &str| Position {
            instrument_name: name.to_string(),
            size: dec!(1),
            direction: TradeDirection::Buy,
            average_price: Decimal::ZERO,
            mark_price: Decimal::ZERO,
            floating_profit_loss: Decimal::ZERO,
        };
        assert!(mk("BTC-26SEP25-65000-C").is_option());
        assert!(mk("ETH-26SEP25-3500-P").is_option());
        assert!(!mk("BTC-PERPETUAL").is_option());
    }

    #[test]
    fn test_price_series_monotonicity() {
        let series = PriceSeries::new(
            "BTC",
            vec![
                PricePoint { timestamp: 1, close: dec!(100) },
                PricePoint { timestamp: 2, close: dec!(101) },
                PricePoint { timestamp: 2, close: dec!(102) },
            ],
        );
        assert!(!series.timestamps_strictly_increasing());

        let ok = PriceSeries::new(
            "BTC",
            vec![
                PricePoint { timestamp: 1, close: dec!(100) },
                PricePoint { timestamp: 2, close: dec!(101) },
            ],
        );
        assert!(ok.timestamps_strictly_increasing());
    }
}
