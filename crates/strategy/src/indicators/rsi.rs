use common::error::IndicatorError;
use tracing::trace;

/// Relative Strength Index with Wilder's smoothing.
///
/// The first average gain/loss is the plain mean of the first `period`
/// changes; every later change is folded in as `(avg * (period - 1) + x) / period`.
/// Needs `period + 1` closes, most recent last.
pub fn compute_rsi(closes: &[f64], period: usize) -> Result<f64, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod);
    }
    if closes.len() < period + 1 {
        return Err(IndicatorError::InsufficientData {
            required: period + 1,
            actual: closes.len(),
        });
    }

    let n = period as f64;
    let mut changes = closes.windows(2).map(|w| w[1] - w[0]);

    let (mut avg_gain, mut avg_loss) = changes
        .by_ref()
        .take(period)
        .fold((0.0, 0.0), |(g, l), delta| (g + delta.max(0.0), l + (-delta).max(0.0)));
    avg_gain /= n;
    avg_loss /= n;

    for delta in changes {
        avg_gain = (avg_gain * (n - 1.0) + delta.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-delta).max(0.0)) / n;
    }

    let rsi = if avg_loss == 0.0 {
        // Flat history carries no momentum either way.
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    trace!(rsi, avg_gain, avg_loss, period, "RSI computed");
    Ok(rsi.clamp(0.0, 100.0))
}
