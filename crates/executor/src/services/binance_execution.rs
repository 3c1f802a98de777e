use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::config::ResilienceConfig;
use common::error::ProviderError;
use common::models::{Direction, TradeOutcome, TradeRequest};
use market_data::remote::{BinanceClient, OrderResponse, OrderSide, OrderSize};
use market_data::{CallError, ExecutionProvider, RetryOn, RetryPolicy, retry_with_backoff};
use tokio::time::{sleep, timeout};
use tracing::{error, info};

/// Real-mode venue. A trade is a spot round trip: a market order for the
/// stake in the quote asset when it opens, and the opposite market order for
/// the filled quantity when it expires.
///
/// Once the opening order has filled, every failure is reported as
/// [`ProviderError::Unsettled`] so the trade is never placed a second time.
pub struct BinanceExecution {
    client: BinanceClient,
    quote_asset: String,
    close_policy: RetryPolicy,
    settlement_budget: Duration,
}

impl BinanceExecution {
    pub fn new(
        client: BinanceClient,
        quote_asset: impl Into<String>,
        resilience: &ResilienceConfig,
    ) -> Self {
        Self {
            client,
            quote_asset: quote_asset.into(),
            close_policy: RetryPolicy::new(&resilience.retry, RetryOn::Transient),
            settlement_budget: resilience.settlement_budget(),
        }
    }

    fn open_side(direction: Direction) -> OrderSide {
        match direction {
            Direction::Buy => OrderSide::Buy,
            Direction::Sell => OrderSide::Sell,
        }
    }

    fn close_side(direction: Direction) -> OrderSide {
        Self::open_side(direction.opposite())
    }

    /// Sells back (or buys back) the filled quantity, retrying transient
    /// failures within the settlement budget.
    async fn close(
        &self,
        request: &TradeRequest,
        quantity: f64,
        client_order_id: &str,
    ) -> Result<OrderResponse, ProviderError> {
        let client = &self.client;
        let instrument = request.instrument.as_str();
        let side = Self::close_side(request.direction);
        let attempts = retry_with_backoff(
            &self.close_policy,
            move || async move {
                client
                    .post_order(instrument, side, OrderSize::Base(quantity), client_order_id)
                    .await
                    .map_err(CallError::from)
            },
            |_, _, _| {},
        );

        let reason = match timeout(self.settlement_budget, attempts).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("no close within {:?}", self.settlement_budget),
        };
        error!(
            "Could not close {} on {}: {}. Position left open.",
            client_order_id, request.instrument, reason
        );
        Err(self.unsettled(format!(
            "{} {:.8} {} still open: {}",
            request.instrument,
            quantity,
            request.direction,
            reason
        )))
    }

    fn unsettled(&self, reason: String) -> ProviderError {
        ProviderError::Unsettled {
            dependency: self.client.dependency().to_string(),
            reason,
        }
    }
}

/// Profit in the quote asset of a round trip that opened and closed with the
/// given quote amounts.
fn round_trip_profit(direction: Direction, open_quote: f64, close_quote: f64) -> f64 {
    match direction {
        Direction::Buy => close_quote - open_quote,
        Direction::Sell => open_quote - close_quote,
    }
}

#[async_trait]
impl ExecutionProvider for BinanceExecution {
    fn name(&self) -> &str {
        self.client.dependency()
    }

    async fn submit_trade(&self, request: &TradeRequest) -> Result<TradeOutcome, ProviderError> {
        let open_id = request.id.simple().to_string();
        let opened = self
            .client
            .post_order(
                &request.instrument,
                Self::open_side(request.direction),
                OrderSize::Quote(request.stake),
                &open_id,
            )
            .await?;

        let quantity = opened.executed_qty();
        if quantity <= 0.0 {
            return Err(ProviderError::Rejected {
                dependency: self.client.dependency().to_string(),
                reason: format!("order {} was not filled ({})", open_id, opened.status),
            });
        }
        let entry_price = opened.average_price().unwrap_or(request.price);
        info!(
            "Opened {} {} qty {:.8} at {:.5}",
            request.direction, request.instrument, quantity, entry_price
        );

        sleep(request.expiration).await;

        let close_id = format!("{}c", open_id);
        let closed = self.close(request, quantity, &close_id).await?;
        let exit_price = closed.average_price().unwrap_or(entry_price);
        let profit_loss =
            round_trip_profit(request.direction, opened.quote_qty(), closed.quote_qty());

        Ok(TradeOutcome {
            request: request.clone(),
            entry_price,
            exit_price,
            profit_loss,
            is_win: profit_loss > 0.0,
            timestamp: Utc::now(),
        })
    }

    async fn balance(&self) -> Result<f64, ProviderError> {
        let account = self.client.get_account().await?;
        Ok(account.free_balance(&self.quote_asset))
    }
}
