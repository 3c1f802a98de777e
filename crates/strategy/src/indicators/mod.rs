//! Pure indicator functions over closing prices. No state, no I/O.

pub mod rsi;
pub mod sma;

pub use rsi::compute_rsi;
pub use sma::compute_sma;

use common::error::IndicatorError;
use common::models::IndicatorSnapshot;

pub const DEFAULT_RSI_PERIOD: usize = 14;
pub const DEFAULT_SMA_PERIOD: usize = 20;

/// Both indicators over the same closes.
pub fn snapshot(
    closes: &[f64],
    rsi_period: usize,
    sma_period: usize,
) -> Result<IndicatorSnapshot, IndicatorError> {
    Ok(IndicatorSnapshot {
        rsi: compute_rsi(closes, rsi_period)?,
        sma: compute_sma(closes, sma_period)?,
        rsi_period,
        sma_period,
    })
}
