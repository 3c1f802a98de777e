use async_trait::async_trait;
use common::error::ProviderError;
use common::models::{PriceSeries, TradeOutcome, TradeRequest};

/// Source of OHLCV candles, oldest first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_candles(
        &self,
        instrument: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<PriceSeries, ProviderError>;
}

/// Venue that places admitted trades and reports their settlement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Places the trade and waits for it to settle. Only an error whose
    /// `is_safe_to_resubmit` holds may be returned before the trade reached
    /// the venue; anything that fails afterwards must be
    /// [`ProviderError::Unsettled`].
    async fn submit_trade(&self, request: &TradeRequest) -> Result<TradeOutcome, ProviderError>;

    async fn balance(&self) -> Result<f64, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CallError, Guard, RetryOn, RetryPolicy, retry_with_backoff};
    use common::config::{BreakerConfig, RateLimit, RetryConfig};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn guarded_fetch_recovers_from_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();

        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_fetch_candles()
            .withf(|instrument, timeframe, count| {
                instrument.to_string() == "BTCUSDT" && timeframe.to_string() == "1m" && *count == 30
            })
            .times(3)
            .returning(move |_, _, _| {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::Http {
                        dependency: "primary".into(),
                        status: 503,
                        body: String::new(),
                    })
                } else {
                    Ok(PriceSeries::default())
                }
            });

        let guard = Guard::new(
            "primary",
            BreakerConfig::default(),
            RateLimit::per_minute(60),
            Duration::from_secs(10),
        );
        let policy = RetryPolicy::new(&RetryConfig::default(), RetryOn::Transient);
        let provider = &provider;
        let guard = &guard;

        let series = retry_with_backoff(
            &policy,
            move || async move {
                guard
                    .call(provider.fetch_candles("BTCUSDT", "1m", 30))
                    .await
            },
            |_, _, _| {},
        )
        .await
        .unwrap();

        assert!(series.is_empty());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(guard.breaker_snapshot().await.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_errors_are_not_retried() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_fetch_candles().times(1).returning(|_, _, _| {
            Err(ProviderError::Decode {
                dependency: "secondary".into(),
                reason: "garbage".into(),
            })
        });

        let guard = Guard::new(
            "secondary",
            BreakerConfig::default(),
            RateLimit::per_minute(5),
            Duration::from_secs(10),
        );
        let policy = RetryPolicy::new(&RetryConfig::default(), RetryOn::Transient);
        let provider = &provider;
        let guard = &guard;

        let result = retry_with_backoff(
            &policy,
            move || async move { guard.call(provider.fetch_candles("ETHUSDT", "1m", 30)).await },
            |_, _, _| {},
        )
        .await;

        assert!(matches!(
            result,
            Err(CallError::Provider(ProviderError::Decode { .. }))
        ));
    }
}
