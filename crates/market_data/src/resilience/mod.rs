pub mod circuit_breaker;
pub mod guard;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use guard::{CallError, Guard};
pub use rate_limiter::RateLimiter;
pub use retry::{ExponentialBackoff, RetryOn, RetryPolicy, retry_with_backoff};
