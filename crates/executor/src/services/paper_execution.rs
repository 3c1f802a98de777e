use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::config::ResilienceConfig;
use common::error::ProviderError;
use common::models::{TradeOutcome, TradeRequest};
use market_data::{
    ExecutionProvider, Guard, MarketDataProvider, RetryOn, RetryPolicy, retry_with_backoff,
};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Demo-mode venue. Holds each trade for its expiration, reads the exit
/// price from the market feed and settles it as a fixed-payout binary trade.
///
/// The exit price is fetched through the primary feed's guard. A trade that
/// cannot be priced is [`ProviderError::Unsettled`], never a fresh attempt.
pub struct PaperExecution {
    market: Arc<dyn MarketDataProvider>,
    guard: Arc<Guard>,
    timeframe: String,
    payout: f64,
    balance: Mutex<f64>,
    fetch_policy: RetryPolicy,
    settlement_budget: Duration,
}

impl PaperExecution {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        guard: Arc<Guard>,
        timeframe: impl Into<String>,
        payout: f64,
        starting_balance: f64,
        resilience: &ResilienceConfig,
    ) -> Self {
        Self {
            market,
            guard,
            timeframe: timeframe.into(),
            payout,
            balance: Mutex::new(starting_balance),
            fetch_policy: RetryPolicy::new(&resilience.retry, RetryOn::Transient),
            settlement_budget: resilience.settlement_budget(),
        }
    }

    async fn exit_price(&self, instrument: &str) -> Result<f64, ProviderError> {
        let market = &self.market;
        let guard = &self.guard;
        let timeframe = self.timeframe.as_str();
        let fetched = retry_with_backoff(
            &self.fetch_policy,
            move || async move {
                guard
                    .call(market.fetch_candles(instrument, timeframe, 1))
                    .await
            },
            |_, _, _| {},
        );

        let reason = match timeout(self.settlement_budget, fetched).await {
            Ok(Ok(series)) => match series.last() {
                Some(point) => return Ok(point.close),
                None => format!("no candles returned for {}", instrument),
            },
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("no exit price within {:?}", self.settlement_budget),
        };
        warn!("[paper] cannot settle {}: {}", instrument, reason);
        Err(ProviderError::Unsettled {
            dependency: self.name().to_string(),
            reason,
        })
    }
}

#[async_trait]
impl ExecutionProvider for PaperExecution {
    fn name(&self) -> &str {
        "paper"
    }

    async fn submit_trade(&self, request: &TradeRequest) -> Result<TradeOutcome, ProviderError> {
        let entry_price = request.price;
        info!(
            "[paper] {} {} stake {:.2} at {:.5}, expires in {:?}",
            request.direction, request.instrument, request.stake, entry_price, request.expiration
        );
        sleep(request.expiration).await;

        let exit_price = self.exit_price(&request.instrument).await?;
        let is_win = request.direction.sign() * (exit_price - entry_price) > 0.0;
        let profit_loss = if is_win {
            request.stake * self.payout
        } else {
            -request.stake
        };

        let mut balance = self.balance.lock().await;
        *balance += profit_loss;
        info!(
            "[paper] {} {} settled at {:.5}: P/L {:+.2}, balance {:.2}",
            request.direction, request.instrument, exit_price, profit_loss, *balance
        );

        Ok(TradeOutcome {
            request: request.clone(),
            entry_price,
            exit_price,
            profit_loss,
            is_win,
            timestamp: Utc::now(),
        })
    }

    async fn balance(&self) -> Result<f64, ProviderError> {
        Ok(*self.balance.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::config::{BreakerConfig, RateLimit};
    use common::models::{Direction, PricePoint, PriceSeries, TradeMode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct StaticMarket {
        close: f64,
        reachable: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for StaticMarket {
        fn name(&self) -> &str {
            "primary"
        }

        async fn fetch_candles(
            &self,
            _instrument: &str,
            _timeframe: &str,
            _count: usize,
        ) -> Result<PriceSeries, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.reachable {
                return Err(ProviderError::Connect {
                    dependency: "primary".into(),
                    reason: "refused".into(),
                });
            }
            PriceSeries::new(vec![PricePoint {
                timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
                open: self.close,
                high: self.close,
                low: self.close,
                close: self.close,
                volume: 1.0,
            }])
            .map_err(|e| ProviderError::Decode {
                dependency: "primary".into(),
                reason: e.to_string(),
            })
        }
    }

    fn request(direction: Direction) -> TradeRequest {
        TradeRequest {
            id: Uuid::new_v4(),
            instrument: "BTCUSDT".into(),
            direction,
            stake: 10.0,
            expiration: Duration::from_secs(60),
            mode: TradeMode::Demo,
            stake_clamped: false,
            confidence: 0.7,
            price: 100.0,
        }
    }

    fn guard() -> Arc<Guard> {
        Arc::new(Guard::new(
            "primary",
            BreakerConfig::default(),
            RateLimit::per_minute(60),
            Duration::from_secs(10),
        ))
    }

    fn venue_with(
        exit: f64,
        reachable: bool,
        guard: Arc<Guard>,
    ) -> (PaperExecution, Arc<StaticMarket>) {
        let market = Arc::new(StaticMarket {
            close: exit,
            reachable,
            calls: AtomicUsize::new(0),
        });
        let venue = PaperExecution::new(
            market.clone(),
            guard,
            "1m",
            0.8,
            1000.0,
            &ResilienceConfig::default(),
        );
        (venue, market)
    }

    fn venue(exit: f64) -> PaperExecution {
        venue_with(exit, true, guard()).0
    }

    #[tokio::test(start_paused = true)]
    async fn buy_wins_when_price_rises() {
        let venue = venue(101.0);
        let outcome = venue.submit_trade(&request(Direction::Buy)).await.unwrap();
        assert!(outcome.is_win);
        assert!((outcome.profit_loss - 8.0).abs() < 1e-9);
        assert_eq!(outcome.exit_price, 101.0);
        assert!((venue.balance().await.unwrap() - 1008.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn sell_loses_the_stake_when_price_rises() {
        let venue = venue(101.0);
        let outcome = venue.submit_trade(&request(Direction::Sell)).await.unwrap();
        assert!(!outcome.is_win);
        assert_eq!(outcome.profit_loss, -10.0);
        assert_eq!(venue.balance().await.unwrap(), 990.0);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_price_is_a_loss() {
        let venue = venue(100.0);
        let outcome = venue.submit_trade(&request(Direction::Buy)).await.unwrap();
        assert!(!outcome.is_win);
    }

    #[tokio::test(start_paused = true)]
    async fn trade_is_held_until_expiration() {
        let venue = venue(101.0);
        let started = tokio::time::Instant::now();
        venue.submit_trade(&request(Direction::Buy)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_feed_leaves_the_trade_unsettled() {
        let (venue, market) = venue_with(101.0, false, guard());
        let err = venue.submit_trade(&request(Direction::Buy)).await.unwrap_err();

        assert!(matches!(err, ProviderError::Unsettled { .. }), "{:?}", err);
        assert!(!err.is_safe_to_resubmit());
        // Default policy: three attempts.
        assert_eq!(market.calls.load(Ordering::SeqCst), 3);
        assert_eq!(venue.balance().await.unwrap(), 1000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_primary_breaker_is_respected() {
        let guard = guard();
        for _ in 0..5 {
            let _: Result<(), _> = guard
                .call(async {
                    Err(ProviderError::Connect {
                        dependency: "primary".into(),
                        reason: "refused".into(),
                    })
                })
                .await;
        }

        let (venue, market) = venue_with(101.0, true, guard);
        let mut request = request(Direction::Buy);
        request.expiration = Duration::from_secs(1);
        let err = venue.submit_trade(&request).await.unwrap_err();

        assert!(matches!(err, ProviderError::Unsettled { .. }), "{:?}", err);
        assert_eq!(market.calls.load(Ordering::SeqCst), 0);
    }
}
