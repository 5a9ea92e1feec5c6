//! Scriptable in-memory gateway for tests and paper runs.
//!
//! Market data is set up front; orders are recorded instead of routed.
//! Failure injection covers the cases the strategy loop must survive:
//! per-instrument IV fetch failures, order submission failures after the
//! Nth order, and denied authentication.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::error::GatewayError;
use crate::exchange::gateway::OptionsGateway;
use crate::exchange::types::*;

/// A recorded order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOrder {
    pub instrument_name: String,
    /// Signed: positive bought, negative sold
    pub amount: Decimal,
    pub kind: OrderKind,
    pub limit_price: Option<Decimal>,
    pub label: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    price_series: HashMap<String, PriceSeries>,
    instruments: HashMap<String, Vec<InstrumentQuote>>,
    implied_vols: HashMap<String, f64>,
    failing_ivs: HashSet<String>,
    order_books: HashMap<String, BookTop>,
    positions: HashMap<String, Vec<Position>>,
    accounts: HashMap<String, AccountSummary>,
    submitted: Vec<RecordedOrder>,
    canceled: Vec<String>,
    /// Submissions at or beyond this index fail
    fail_submissions_after: Option<usize>,
    deny_auth: bool,
    order_seq: u64,
}

/// Mock options gateway.
#[derive(Debug, Default)]
pub struct MockGateway {
    state: RwLock<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price_series(&self, series: PriceSeries) {
        let mut state = self.state.write().await;
        state.price_series.insert(series.underlying.clone(), series);
    }

    pub async fn set_instruments(&self, underlying: &str, quotes: Vec<InstrumentQuote>) {
        let mut state = self.state.write().await;
        state.instruments.insert(underlying.to_string(), quotes);
    }

    pub async fn set_iv(&self, instrument: &str, iv: f64) {
        let mut state = self.state.write().await;
        state.implied_vols.insert(instrument.to_string(), iv);
    }

    /// Make IV fetches for one instrument fail.
    pub async fn fail_iv(&self, instrument: &str) {
        let mut state = self.state.write().await;
        state.failing_ivs.insert(instrument.to_string());
    }

    pub async fn set_book(&self, instrument: &str, best_bid: Option<Decimal>, best_ask: Option<Decimal>) {
        let mut state = self.state.write().await;
        state.order_books.insert(
            instrument.to_string(),
            BookTop {
                instrument_name: instrument.to_string(),
                best_bid,
                best_ask,
            },
        );
    }

    pub async fn set_positions(&self, underlying: &str, positions: Vec<Position>) {
        let mut state = self.state.write().await;
        state.positions.insert(underlying.to_string(), positions);
    }

    pub async fn set_account(&self, summary: AccountSummary) {
        let mut state = self.state.write().await;
        state.accounts.insert(summary.currency.clone(), summary);
    }

    /// Fail every submission whose zero-based index is >= `n`.
    /// `n = 1` lets the first leg through and fails the second.
    pub async fn fail_submissions_after(&self, n: usize) {
        let mut state = self.state.write().await;
        state.fail_submissions_after = Some(n);
    }

    pub async fn deny_auth(&self) {
        let mut state = self.state.write().await;
        state.deny_auth = true;
    }

    /// Orders recorded so far, in submission order.
    pub async fn submitted_orders(&self) -> Vec<RecordedOrder> {
        self.state.read().await.submitted.clone()
    }

    /// Order ids canceled so far.
    pub async fn canceled_orders(&self) -> Vec<String> {
        self.state.read().await.canceled.clone()
    }
}

#[async_trait]
impl OptionsGateway for MockGateway {
    async fn authenticate(&self) -> Result<(), GatewayError> {
        if self.state.read().await.deny_auth {
            return Err(GatewayError::Auth("mock credentials rejected".to_string()));
        }
        Ok(())
    }

    async fn get_historical_prices(
        &self,
        underlying: &str,
        _resolution: &str,
        _limit: u32,
    ) -> Result<PriceSeries, GatewayError> {
        self.state
            .read()
            .await
            .price_series
            .get(underlying)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                endpoint: "public/get_tradingview_chart_data".to_string(),
                message: format!("no series scripted for {underlying}"),
            })
    }

    async fn list_instruments(
        &self,
        underlying: &str,
    ) -> Result<Vec<InstrumentQuote>, GatewayError> {
        Ok(self
            .state
            .read()
            .await
            .instruments
            .get(underlying)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_implied_volatility(&self, instrument: &str) -> Result<f64, GatewayError> {
        let state = self.state.read().await;
        if state.failing_ivs.contains(instrument) {
            return Err(GatewayError::Api {
                endpoint: "public/get_order_book".to_string(),
                message: format!("scripted IV failure for {instrument}"),
            });
        }
        state
            .implied_vols
            .get(instrument)
            .copied()
            .ok_or_else(|| GatewayError::Decode {
                endpoint: "public/get_order_book".to_string(),
                reason: format!("no mark_iv for {instrument}"),
            })
    }

    async fn get_order_book(
        &self,
        instrument: &str,
        _depth: u32,
    ) -> Result<BookTop, GatewayError> {
        self.state
            .read()
            .await
            .order_books
            .get(instrument)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                endpoint: "public/get_order_book".to_string(),
                message: format!("no book scripted for {instrument}"),
            })
    }

    async fn submit_order(
        &self,
        instrument: &str,
        amount: Decimal,
        kind: OrderKind,
        limit_price: Option<Decimal>,
        label: Option<&str>,
    ) -> Result<OrderAck, GatewayError> {
        let mut state = self.state.write().await;

        if let Some(limit) = state.fail_submissions_after {
            if state.submitted.len() >= limit {
                return Err(GatewayError::Api {
                    endpoint: if amount > Decimal::ZERO {
                        "private/buy".to_string()
                    } else {
                        "private/sell".to_string()
                    },
                    message: "scripted submission failure".to_string(),
                });
            }
        }

        state.submitted.push(RecordedOrder {
            instrument_name: instrument.to_string(),
            amount,
            kind,
            limit_price,
            label: label.map(String::from),
        });
        state.order_seq += 1;

        Ok(OrderAck {
            order_id: state.order_seq.to_string(),
            instrument_name: instrument.to_string(),
            amount,
            price: limit_price,
            label: label.map(String::from),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        state.canceled.push(order_id.to_string());
        Ok(())
    }

    async fn list_open_positions(
        &self,
        underlying: &str,
    ) -> Result<Vec<Position>, GatewayError> {
        Ok(self
            .state
            .read()
            .await
            .positions
            .get(underlying)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_account_summary(
        &self,
        underlying: &str,
    ) -> Result<AccountSummary, GatewayError> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .get(underlying)
            .cloned()
            .unwrap_or(AccountSummary {
                currency: underlying.to_string(),
                equity: Decimal::ZERO,
                equity_usd: None,
                available_funds: Decimal::ZERO,
            }))
    }
}
