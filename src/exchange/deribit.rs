//! Deribit REST API client.
//!
//! Thin JSON-over-REST client: OAuth2 client-credentials authentication
//! with token refresh, public market data, and private order endpoints.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::config::DeribitConfig;
use crate::error::GatewayError;
use crate::exchange::gateway::OptionsGateway;
use crate::exchange::types::*;

const BASE_URL: &str = "https://www.deribit.com/api/v2/";
const TESTNET_URL: &str = "https://test.deribit.com/api/v2/";

/// Seconds before token expiry at which a refresh is forced.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Deribit API client.
pub struct DeribitClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
    token: RwLock<Option<AccessToken>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    access_token: String,
    refresh_token: String,
    /// Unix seconds after which the token must be refreshed
    expires_at: i64,
}

/// JSON-RPC style response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AuthResult {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    ticks: Vec<i64>,
    close: Vec<Decimal>,
}

#[derive(Debug, Deserialize)]
struct InstrumentInfo {
    instrument_name: String,
    strike: Decimal,
    option_type: OptionType,
    expiration_timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct BookData {
    #[serde(default)]
    bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    asks: Vec<(Decimal, Decimal)>,
    /// Implied volatility in percent (65.4 = 65.4%)
    #[serde(default)]
    mark_iv: Option<f64>,
}

/// Position row as Deribit reports it. `direction` can be "zero" for a
/// flat entry, which has no counterpart in `TradeDirection`.
#[derive(Debug, Deserialize)]
struct PositionInfo {
    instrument_name: String,
    size: Decimal,
    direction: String,
    #[serde(default)]
    average_price: Decimal,
    #[serde(default)]
    mark_price: Decimal,
    #[serde(default)]
    floating_profit_loss: Decimal,
}

impl PositionInfo {
    /// Convert to a domain position; flat and unknown directions are None.
    fn into_position(self) -> Option<Position> {
        let direction = match self.direction.as_str() {
            "buy" => TradeDirection::Buy,
            "sell" => TradeDirection::Sell,
            _ => return None,
        };
        Some(Position {
            instrument_name: self.instrument_name,
            size: self.size,
            direction,
            average_price: self.average_price,
            mark_price: self.mark_price,
            floating_profit_loss: self.floating_profit_loss,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OrderResult {
    order: OrderInfo,
}

#[derive(Debug, Deserialize)]
struct OrderInfo {
    order_id: String,
    instrument_name: String,
    amount: Decimal,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    label: Option<String>,
}

impl DeribitClient {
    /// Create a new Deribit client from configuration.
    pub fn new(config: &DeribitConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Http {
                endpoint: "client".to_string(),
                source: e,
            })?;

        let base_url = if config.testnet {
            TESTNET_URL.to_string()
        } else {
            BASE_URL.to_string()
        };

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            base_url,
            token: RwLock::new(None),
        })
    }

    fn unwrap_envelope<T>(
        endpoint: &str,
        envelope: RpcResponse<T>,
    ) -> Result<T, GatewayError> {
        if let Some(err) = envelope.error {
            return Err(GatewayError::Api {
                endpoint: endpoint.to_string(),
                message: format!("{} (code {})", err.message, err.code),
            });
        }
        envelope.result.ok_or_else(|| GatewayError::Decode {
            endpoint: endpoint.to_string(),
            reason: "missing result field".to_string(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut req = self.http.post(&url).json(&params);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| GatewayError::Http {
            endpoint: endpoint.to_string(),
            source: e,
        })?;

        let envelope: RpcResponse<T> =
            response.json().await.map_err(|e| GatewayError::Decode {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        Self::unwrap_envelope(endpoint, envelope)
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: serde_json::Value,
    ) -> Result<T, GatewayError> {
        self.request(endpoint, params, None).await
    }

    async fn get_private<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: serde_json::Value,
    ) -> Result<T, GatewayError> {
        let token = self.ensure_auth().await?;
        self.request(endpoint, params, Some(&token)).await
    }

    /// Return a valid access token, refreshing or re-authenticating first
    /// when the current one is within the refresh margin.
    async fn ensure_auth(&self) -> Result<String, GatewayError> {
        let now = Utc::now().timestamp();
        if let Some(token) = self.token.read().await.as_ref() {
            if now < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let refresh_token = self
            .token
            .read()
            .await
            .as_ref()
            .map(|t| t.refresh_token.clone());

        match refresh_token {
            Some(refresh) => match self.refresh_auth(&refresh).await {
                Ok(token) => Ok(token),
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, re-authenticating");
                    self.authenticate().await?;
                    self.current_token().await
                }
            },
            None => {
                self.authenticate().await?;
                self.current_token().await
            }
        }
    }

    async fn current_token(&self) -> Result<String, GatewayError> {
        self.token
            .read()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| GatewayError::Auth("no access token after authentication".to_string()))
    }

    async fn store_auth_result(&self, result: AuthResult) {
        let expires_at = Utc::now().timestamp() + result.expires_in - TOKEN_REFRESH_MARGIN_SECS;
        *self.token.write().await = Some(AccessToken {
            access_token: result.access_token,
            refresh_token: result.refresh_token,
            expires_at,
        });
    }

    async fn refresh_auth(&self, refresh_token: &str) -> Result<String, GatewayError> {
        let params = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        let result: AuthResult = self.get_public("public/auth", params).await?;
        self.store_auth_result(result).await;
        debug!("Access token refreshed");
        self.current_token().await
    }
}

#[async_trait]
impl OptionsGateway for DeribitClient {
    #[instrument(skip(self))]
    async fn authenticate(&self) -> Result<(), GatewayError> {
        let params = json!({
            "grant_type": "client_credentials",
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        });

        let result: AuthResult = self
            .get_public("public/auth", params)
            .await
            .map_err(|e| GatewayError::Auth(e.to_string()))?;

        self.store_auth_result(result).await;
        debug!("Authenticated with Deribit");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_historical_prices(
        &self,
        underlying: &str,
        resolution: &str,
        limit: u32,
    ) -> Result<PriceSeries, GatewayError> {
        let endpoint = "public/get_tradingview_chart_data";
        let params = json!({
            "instrument_name": format!("{underlying}-PERPETUAL"),
            "resolution": resolution,
            "limit": limit,
        });

        let chart: ChartData = self.get_public(endpoint, params).await?;
        if chart.ticks.len() != chart.close.len() {
            return Err(GatewayError::Decode {
                endpoint: endpoint.to_string(),
                reason: format!(
                    "tick/close length mismatch: {} vs {}",
                    chart.ticks.len(),
                    chart.close.len()
                ),
            });
        }

        let points = chart
            .ticks
            .into_iter()
            .zip(chart.close)
            .map(|(timestamp, close)| PricePoint { timestamp, close })
            .collect();

        Ok(PriceSeries::new(underlying, points))
    }

    #[instrument(skip(self))]
    async fn list_instruments(
        &self,
        underlying: &str,
    ) -> Result<Vec<InstrumentQuote>, GatewayError> {
        let params = json!({
            "currency": underlying,
            "kind": "option",
            "expired": false,
        });

        let raw: Vec<InstrumentInfo> =
            self.get_public("public/get_instruments", params).await?;

        let quotes = raw
            .into_iter()
            .filter_map(|info| {
                let expiry_code = match info.instrument_name.split('-').nth(1) {
                    Some(code) => code.to_string(),
                    None => {
                        warn!(
                            instrument = %info.instrument_name,
                            "Skipping instrument with unparseable name"
                        );
                        return None;
                    }
                };
                Some(InstrumentQuote {
                    instrument_name: info.instrument_name,
                    underlying: underlying.to_string(),
                    expiry_code,
                    strike: info.strike,
                    option_type: info.option_type,
                    expiration_timestamp: info.expiration_timestamp,
                })
            })
            .collect();

        Ok(quotes)
    }

    #[instrument(skip(self))]
    async fn get_implied_volatility(&self, instrument: &str) -> Result<f64, GatewayError> {
        let endpoint = "public/get_order_book";
        let params = json!({
            "instrument_name": instrument,
            "depth": 1,
        });

        let book: BookData = self.get_public(endpoint, params).await?;
        // mark_iv is quoted in percent; the core works with fractions.
        book.mark_iv
            .map(|iv| iv / 100.0)
            .ok_or_else(|| GatewayError::Decode {
                endpoint: endpoint.to_string(),
                reason: format!("no mark_iv for {instrument}"),
            })
    }

    #[instrument(skip(self))]
    async fn get_order_book(
        &self,
        instrument: &str,
        depth: u32,
    ) -> Result<BookTop, GatewayError> {
        let params = json!({
            "instrument_name": instrument,
            "depth": depth,
        });

        let book: BookData = self.get_public("public/get_order_book", params).await?;
        Ok(BookTop {
            instrument_name: instrument.to_string(),
            best_bid: book.bids.first().map(|(price, _)| *price),
            best_ask: book.asks.first().map(|(price, _)| *price),
        })
    }

    #[instrument(skip(self))]
    async fn submit_order(
        &self,
        instrument: &str,
        amount: Decimal,
        kind: OrderKind,
        limit_price: Option<Decimal>,
        label: Option<&str>,
    ) -> Result<OrderAck, GatewayError> {
        let endpoint = if amount > Decimal::ZERO {
            "private/buy"
        } else {
            "private/sell"
        };

        let mut params = json!({
            "instrument_name": instrument,
            "amount": amount.abs().to_f64(),
            "type": match kind {
                OrderKind::Limit => "limit",
                OrderKind::Market => "market",
            },
        });
        if let Some(price) = limit_price {
            params["price"] = json!(price.to_f64());
        }
        if let Some(label) = label {
            params["label"] = json!(label);
        }

        debug!(instrument, %amount, ?kind, "Submitting order");
        let result: OrderResult = self.get_private(endpoint, params).await?;

        Ok(OrderAck {
            order_id: result.order.order_id,
            instrument_name: result.order.instrument_name,
            amount: if amount > Decimal::ZERO {
                result.order.amount
            } else {
                -result.order.amount
            },
            price: result.order.price,
            label: result.order.label,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        let params = json!({ "order_id": order_id });
        let _: serde_json::Value = self.get_private("private/cancel", params).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_open_positions(
        &self,
        underlying: &str,
    ) -> Result<Vec<Position>, GatewayError> {
        let params = json!({ "currency": underlying });
        let raw: Vec<PositionInfo> = self.get_private("private/get_positions", params).await?;
        Ok(raw
            .into_iter()
            .filter_map(PositionInfo::into_position)
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_account_summary(
        &self,
        underlying: &str,
    ) -> Result<AccountSummary, GatewayError> {
        let params = json!({ "currency": underlying });
        self.get_private("private/get_account_summary", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_unwrap_surfaces_api_error() {
        let envelope: RpcResponse<i32> = RpcResponse {
            result: None,
            error: Some(RpcError {
                code: 13004,
                message: "invalid_credentials".to_string(),
            }),
        };
        let err = DeribitClient::unwrap_envelope("public/auth", envelope).unwrap_err();
        match err {
            GatewayError::Api { endpoint, message } => {
                assert_eq!(endpoint, "public/auth");
                assert!(message.contains("invalid_credentials"));
                assert!(message.contains("13004"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_unwrap_missing_result_is_decode_error() {
        let envelope: RpcResponse<i32> = RpcResponse {
            result: None,
            error: None,
        };
        let err = DeribitClient::unwrap_envelope("public/ticker", envelope).unwrap_err();
        assert!(matches!(err, GatewayError::Decode { .. }));
    }

    #[test]
    fn test_book_data_parsing() {
        let raw = serde_json::json!({
            "bids": [[3200.0, 10.0], [3190.0, 5.0]],
            "asks": [[3250.0, 2.0]],
            "mark_iv": 65.4
        });
        let book: BookData = serde_json::from_value(raw).unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.mark_iv, Some(65.4));
    }

    #[test]
    fn test_flat_positions_are_dropped_not_a_decode_error() {
        // Accounts that ever closed a position report it with
        // direction "zero"; the whole listing must still decode.
        let raw = serde_json::json!([
            {
                "instrument_name": "BTC-26SEP25-65000-C",
                "size": 0.01,
                "direction": "sell",
                "average_price": 0.05,
                "mark_price": 0.04,
                "floating_profit_loss": 0.0001
            },
            {
                "instrument_name": "BTC-27JUN25-60000-P",
                "size": 0.0,
                "direction": "zero"
            },
            {
                "instrument_name": "BTC-PERPETUAL",
                "size": 100.0,
                "direction": "buy"
            }
        ]);
        let infos: Vec<PositionInfo> = serde_json::from_value(raw).unwrap();
        let positions: Vec<Position> = infos
            .into_iter()
            .filter_map(PositionInfo::into_position)
            .collect();

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].direction, TradeDirection::Sell);
        assert_eq!(positions[1].instrument_name, "BTC-PERPETUAL");
    }

    #[test]
    fn test_instrument_info_parsing() {
        let raw = serde_json::json!({
            "instrument_name": "BTC-26SEP25-65000-C",
            "strike": 65000.0,
            "option_type": "call",
            "expiration_timestamp": 1790000000000i64
        });
        let info: InstrumentInfo = serde_json::from_value(raw).unwrap();
        assert_eq!(info.option_type, OptionType::Call);
        assert_eq!(info.instrument_name.split('-').nth(1), Some("26SEP25"));
    }
}
