//! Venue-agnostic gateway trait for options exchanges.
//!
//! The strategy core consumes this interface only; `DeribitClient` is the
//! live implementation and `MockGateway` the scriptable one for tests.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::GatewayError;
use crate::exchange::types::{
    AccountSummary, BookTop, InstrumentQuote, OrderAck, OrderKind, Position, PriceSeries,
};

/// Read and trade access to one options venue.
///
/// All calls are awaited sequentially by the strategy loop; implementations
/// must impose their own transport timeout so a hung call surfaces as a
/// recoverable error rather than stalling the cycle.
#[async_trait]
pub trait OptionsGateway: Send + Sync {
    /// Obtain (or refresh) an access token. Failure here at startup is fatal.
    async fn authenticate(&self) -> Result<(), GatewayError>;

    /// Close prices of the underlying's perpetual at the given resolution.
    async fn get_historical_prices(
        &self,
        underlying: &str,
        resolution: &str,
        limit: u32,
    ) -> Result<PriceSeries, GatewayError>;

    /// All non-expired option contracts on the underlying.
    async fn list_instruments(&self, underlying: &str)
        -> Result<Vec<InstrumentQuote>, GatewayError>;

    /// Current implied volatility of one contract, as a fraction
    /// (0.60 = 60% annualized).
    async fn get_implied_volatility(&self, instrument: &str) -> Result<f64, GatewayError>;

    /// Best bid and ask of one contract.
    async fn get_order_book(&self, instrument: &str, depth: u32)
        -> Result<BookTop, GatewayError>;

    /// Submit an order. The sign of `amount` selects the side: positive
    /// buys, negative sells.
    async fn submit_order(
        &self,
        instrument: &str,
        amount: Decimal,
        kind: OrderKind,
        limit_price: Option<Decimal>,
        label: Option<&str>,
    ) -> Result<OrderAck, GatewayError>;

    /// Cancel a resting order by id.
    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError>;

    /// Open positions for one currency.
    async fn list_open_positions(&self, underlying: &str)
        -> Result<Vec<Position>, GatewayError>;

    /// Account equity and available funds for one currency.
    async fn get_account_summary(&self, underlying: &str)
        -> Result<AccountSummary, GatewayError>;
}
