pub mod remote;
pub mod resilience;
pub mod traits;

pub use remote::{BinanceClient, BinanceMarketData};
pub use resilience::{
    BreakerSnapshot, BreakerState, CallError, CircuitBreaker, ExponentialBackoff, Guard,
    RateLimiter, RetryOn, RetryPolicy, retry_with_backoff,
};
pub use traits::{ExecutionProvider, MarketDataProvider};
