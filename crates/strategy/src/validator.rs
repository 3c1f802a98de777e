use common::config::StrategyConfig;
use common::models::{Direction, PriceSeries, Signal, TradeMode, ValidatedSignal};
use tracing::{info, warn};

/// Cross-checks a signal against an independent price source.
#[derive(Debug, Clone)]
pub struct SignalValidator {
    lookback: usize,
    trend_full_scale: f64,
    max_price_divergence: f64,
}

impl SignalValidator {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            lookback: config.validation_lookback,
            trend_full_scale: config.trend_full_scale,
            max_price_divergence: config.max_price_divergence,
        }
    }

    /// `secondary` is `None` when the secondary fetch failed after retries.
    ///
    /// Agreement averages the primary confidence with one derived from the
    /// size of the secondary move. When the source cannot be consulted, demo
    /// mode lets the signal through flagged `unverified` and real mode drops it.
    pub fn validate(
        &self,
        signal: Signal,
        secondary: Option<&PriceSeries>,
        mode: TradeMode,
    ) -> ValidatedSignal {
        let trend = secondary.and_then(|series| self.trend(series));

        let Some((delta, reference, latest)) = trend else {
            return match mode {
                TradeMode::Demo => {
                    warn!(
                        "Secondary source unavailable for {}; accepting unconfirmed in demo mode",
                        signal.instrument
                    );
                    ValidatedSignal {
                        confidence: signal.confidence,
                        signal,
                        confirmed: true,
                        unverified: true,
                    }
                }
                TradeMode::Real => {
                    warn!(
                        "Secondary source unavailable for {}; dropping signal in real mode",
                        signal.instrument
                    );
                    ValidatedSignal {
                        confidence: signal.confidence,
                        signal,
                        confirmed: false,
                        unverified: true,
                    }
                }
            };
        };

        let agrees = match signal.direction {
            Direction::Buy => delta > 0.0,
            Direction::Sell => delta < 0.0,
        };
        let divergence = if signal.price > 0.0 {
            (latest - signal.price).abs() / signal.price
        } else {
            f64::INFINITY
        };
        let close_enough = divergence <= self.max_price_divergence;

        if !(agrees && close_enough) {
            info!(
                "Signal {} {} not confirmed: secondary move {:+.5}, price divergence {:.3}%",
                signal.direction,
                signal.instrument,
                delta,
                divergence * 100.0
            );
            return ValidatedSignal {
                confidence: signal.confidence,
                signal,
                confirmed: false,
                unverified: false,
            };
        }

        let secondary_confidence = if reference > 0.0 && self.trend_full_scale > 0.0 {
            (delta.abs() / reference / self.trend_full_scale).min(1.0)
        } else {
            1.0
        };
        let confidence = ((signal.confidence + secondary_confidence) / 2.0).clamp(0.0, 1.0);
        info!(
            "Signal {} {} confirmed by secondary source: confidence {:.3} -> {:.3}",
            signal.direction, signal.instrument, signal.confidence, confidence
        );

        ValidatedSignal {
            signal,
            confirmed: true,
            confidence,
            unverified: false,
        }
    }

    /// (last - close `lookback` bars back, that older close, last close)
    fn trend(&self, series: &PriceSeries) -> Option<(f64, f64, f64)> {
        let points = series.points();
        if self.lookback == 0 || points.len() <= self.lookback {
            return None;
        }
        let latest = points[points.len() - 1].close;
        let reference = points[points.len() - 1 - self.lookback].close;
        Some((latest - reference, reference, latest))
    }
}

impl Default for SignalValidator {
    fn default() -> Self {
        Self::new(&StrategyConfig::default())
    }
}
