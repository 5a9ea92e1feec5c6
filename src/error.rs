//! Error taxonomy shared across components.
//!
//! The strategy loop treats everything except a startup authentication
//! failure as recoverable: errors are caught at the cycle boundary, logged
//! with stage context, and followed by a recovery sleep.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised at the exchange gateway boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Authentication with the venue failed. Fatal at startup.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure (connect, timeout, TLS).
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The venue returned an error payload.
    #[error("exchange error on {endpoint}: {message}")]
    Api { endpoint: String, message: String },

    /// The response body could not be interpreted.
    #[error("malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// Errors from historical volatility estimation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VolatilityError {
    /// The price series is too short for the largest configured window.
    #[error("insufficient data: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// The input series violates a precondition (non-positive price,
    /// out-of-order timestamps, bad weights).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors from a scan over one underlying.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Volatility(#[from] VolatilityError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors from vertical spread construction and submission.
#[derive(Debug, Error)]
pub enum SpreadError {
    /// The spread's absolute net cost exceeds the per-position budget.
    /// Raised strictly before any order is submitted.
    #[error("net cost {net_cost} exceeds per-position budget {budget}")]
    BudgetExceeded { net_cost: Decimal, budget: Decimal },

    /// A leg's order book has no executable price on the required side.
    #[error("order book for {instrument} has no {side} liquidity")]
    EmptyBook {
        instrument: String,
        side: &'static str,
    },

    /// The first leg was submitted but the second failed. A best-effort
    /// cancel of the first leg has already been attempted; `canceled`
    /// records whether it succeeded.
    #[error(
        "partial spread: {filled_instrument} order {filled_order_id} submitted, \
         {failed_instrument} failed (first leg canceled: {canceled}): {source}"
    )]
    PartialFill {
        filled_instrument: String,
        filled_order_id: String,
        failed_instrument: String,
        canceled: bool,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl SpreadError {
    /// True for the partial-fill anomaly, which callers must surface
    /// distinctly: the position on the venue is no longer defined-risk.
    pub fn is_partial_fill(&self) -> bool {
        matches!(self, SpreadError::PartialFill { .. })
    }
}
