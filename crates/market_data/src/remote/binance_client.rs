use std::time::Duration;

use chrono::Utc;
use common::error::ProviderError;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// How a market order is sized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderSize {
    /// Amount of the quote asset to spend or receive.
    Quote(f64),
    /// Amount of the base asset.
    Base(f64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    #[serde(rename = "orderId")]
    pub order_id: u64,
    pub symbol: String,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: String,
    pub status: String,
    #[serde(rename = "executedQty")]
    pub executed_qty: String,
    #[serde(rename = "cummulativeQuoteQty")]
    pub cummulative_quote_qty: String,
}

impl OrderResponse {
    pub fn executed_qty(&self) -> f64 {
        self.executed_qty.parse().unwrap_or(0.0)
    }

    pub fn quote_qty(&self) -> f64 {
        self.cummulative_quote_qty.parse().unwrap_or(0.0)
    }

    /// Volume-weighted fill price, if anything was filled.
    pub fn average_price(&self) -> Option<f64> {
        let qty = self.executed_qty();
        (qty > 0.0).then(|| self.quote_qty() / qty)
    }
}

#[derive(Debug, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountInformation {
    pub balances: Vec<Balance>,
    #[serde(rename = "canTrade")]
    pub can_trade: bool,
}

impl AccountInformation {
    pub fn free_balance(&self, asset: &str) -> f64 {
        self.balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
            .and_then(|b| b.free.parse().ok())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

/// Plain HTTP access to a Binance-compatible REST API. Signed endpoints need
/// credentials; public ones work without.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    dependency: String,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl BinanceClient {
    pub fn new(
        dependency: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let dependency = dependency.into();
        let client = Client::builder()
            .user_agent("signal_trader/0.1.0")
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Connect {
                dependency: dependency.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            dependency,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, api_key: String, secret_key: String) -> Self {
        self.credentials = Some((api_key, secret_key));
        self
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }

    pub async fn get_account(&self) -> Result<AccountInformation, ProviderError> {
        self.signed(Method::GET, "/api/v3/account", String::new())
            .await
    }

    /// Places a market order. Binance only rejects a duplicate
    /// `client_order_id` while the first order is still open, so a filled
    /// market order does not protect against a resend.
    pub async fn post_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: OrderSize,
        client_order_id: &str,
    ) -> Result<OrderResponse, ProviderError> {
        let size_param = match size {
            OrderSize::Quote(amount) => format!("quoteOrderQty={:.8}", amount),
            OrderSize::Base(amount) => format!("quantity={:.8}", amount),
        };
        let params = format!(
            "symbol={}&side={}&type=MARKET&{}&newClientOrderId={}&newOrderRespType=RESULT",
            symbol.to_uppercase(),
            side.as_str(),
            size_param,
            client_order_id
        );

        info!(
            "Placing order {}: {} {:?} {}",
            client_order_id,
            side.as_str(),
            size,
            symbol
        );
        self.signed(Method::POST, "/api/v3/order", params).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: String,
    ) -> Result<T, ProviderError> {
        let Some((api_key, secret_key)) = &self.credentials else {
            return Err(ProviderError::Rejected {
                dependency: self.dependency.clone(),
                reason: "API credentials are not configured".to_string(),
            });
        };

        let timestamp = Utc::now().timestamp_millis();
        let params = if params.is_empty() {
            format!("timestamp={}", timestamp)
        } else {
            format!("{}&timestamp={}", params, timestamp)
        };
        let signature = sign(secret_key, &params);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, params, signature
        );

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, ProviderError> {
        let status = response.status();

        if let Some(used_weight) = response
            .headers()
            .get("x-mbx-used-weight-1m")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
        {
            if used_weight > 1000 {
                warn!("High API weight usage on {}: {}", self.dependency, used_weight);
            } else {
                debug!("Used weights on {}: {}/1200", self.dependency, used_weight);
            }
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("{} request failed with {}: {}", self.dependency, status, body);
            return Err(self.status_error(status, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode {
                dependency: self.dependency.clone(),
                reason: e.to_string(),
            })
    }

    fn status_error(&self, status: StatusCode, body: String) -> ProviderError {
        let dependency = self.dependency.clone();
        match status.as_u16() {
            429 | 418 => ProviderError::RateLimited { dependency },
            400..=499 => match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(api) => ProviderError::Rejected {
                    dependency,
                    reason: format!("{} ({})", api.msg, api.code),
                },
                Err(_) => ProviderError::Http {
                    dependency,
                    status: status.as_u16(),
                    body,
                },
            },
            code => ProviderError::Http {
                dependency,
                status: code,
                body,
            },
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        let dependency = self.dependency.clone();
        if err.is_timeout() {
            ProviderError::Timeout {
                dependency,
                after: Duration::ZERO,
            }
        } else if err.is_connect() {
            ProviderError::Connect {
                dependency,
                reason: err.to_string(),
            }
        } else if err.is_decode() || err.is_body() {
            ProviderError::Decode {
                dependency,
                reason: err.to_string(),
            }
        } else {
            // The request may have left the machine; treat the outcome as
            // unknown.
            ProviderError::Timeout {
                dependency,
                after: Duration::ZERO,
            }
        }
    }
}

fn sign(secret_key: &str, query: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
