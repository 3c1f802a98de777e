use common::error::IndicatorError;
use ta::Next;
use ta::indicators::SimpleMovingAverage;
use tracing::trace;

/// Mean of the trailing `period` closes. Anything older than the window is
/// never read.
pub fn compute_sma(closes: &[f64], period: usize) -> Result<f64, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod);
    }
    if closes.len() < period {
        return Err(IndicatorError::InsufficientData {
            required: period,
            actual: closes.len(),
        });
    }

    let mut sma = SimpleMovingAverage::new(period).map_err(|_| IndicatorError::InvalidPeriod)?;
    let window = &closes[closes.len() - period..];
    let value = window.iter().fold(0.0, |_, &close| sma.next(close));

    trace!(sma = value, period, "SMA computed");
    Ok(value)
}
