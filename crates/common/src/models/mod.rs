pub mod candle;
pub mod metrics;
pub mod signal;
pub mod trade;

pub use candle::{PricePoint, PriceSeries};
pub use metrics::{DailyMetrics, PerformanceMetrics};
pub use signal::{Direction, IndicatorSnapshot, Signal, ValidatedSignal};
pub use trade::{TradeCandidate, TradeMode, TradeOutcome, TradeRequest};
