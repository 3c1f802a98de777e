use chrono::{DateTime, Utc};
use common::config::StrategyConfig;
use common::models::{Direction, IndicatorSnapshot, Signal};
use tracing::{debug, info};

/// RSI/SMA crossover rules.
///
/// BUY when RSI is below the oversold threshold while price sits above the
/// SMA; SELL when RSI is above the overbought threshold while price sits
/// below it. BUY is checked first.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    oversold: f64,
    overbought: f64,
    rsi_weight: f64,
    sma_weight: f64,
    validation_weight: f64,
    sma_full_divergence: f64,
}

impl SignalGenerator {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            oversold: config.oversold,
            overbought: config.overbought,
            rsi_weight: config.rsi_weight,
            sma_weight: config.sma_weight,
            validation_weight: config.validation_weight,
            sma_full_divergence: config.sma_full_divergence,
        }
    }

    pub fn generate(
        &self,
        instrument: &str,
        snapshot: IndicatorSnapshot,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Option<Signal> {
        let direction = if snapshot.rsi < self.oversold && price > snapshot.sma {
            Direction::Buy
        } else if snapshot.rsi > self.overbought && price < snapshot.sma {
            Direction::Sell
        } else {
            debug!(
                "No signal for {}: RSI={:.2} Price={:.5} SMA={:.5}",
                instrument, snapshot.rsi, price, snapshot.sma
            );
            return None;
        };

        let confidence = self.confidence(&snapshot, price, direction);
        info!(
            "{} signal for {}: RSI={:.2} Price={:.5} SMA={:.5} confidence={:.3} ({})",
            direction,
            instrument,
            snapshot.rsi,
            price,
            snapshot.sma,
            confidence,
            strength_label(confidence)
        );

        Some(Signal {
            instrument: instrument.to_string(),
            direction,
            confidence,
            snapshot,
            price,
            timestamp,
        })
    }

    /// Weighted blend of how far RSI sits beyond its threshold, how far price
    /// sits from the SMA, and a neutral prior for the pending validation.
    pub fn confidence(&self, snapshot: &IndicatorSnapshot, price: f64, direction: Direction) -> f64 {
        let rsi_strength = match direction {
            Direction::Buy if self.oversold > 0.0 => (self.oversold - snapshot.rsi) / self.oversold,
            Direction::Sell if self.overbought < 100.0 => {
                (snapshot.rsi - self.overbought) / (100.0 - self.overbought)
            }
            _ => 1.0,
        }
        .clamp(0.0, 1.0);

        let sma_divergence = if snapshot.sma > 0.0 && self.sma_full_divergence > 0.0 {
            ((price - snapshot.sma).abs() / snapshot.sma / self.sma_full_divergence).min(1.0)
        } else {
            0.0
        };

        (rsi_strength * self.rsi_weight
            + sma_divergence * self.sma_weight
            + 0.5 * self.validation_weight)
            .clamp(0.0, 1.0)
    }
}

impl Default for SignalGenerator {
    fn default() -> Self {
        Self::new(&StrategyConfig::default())
    }
}

pub fn strength_label(confidence: f64) -> &'static str {
    match confidence {
        c if c >= 0.8 => "Very Strong",
        c if c >= 0.6 => "Strong",
        c if c >= 0.4 => "Moderate",
        c if c >= 0.2 => "Weak",
        _ => "Very Weak",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snap(rsi: f64, sma: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi,
            sma,
            rsi_period: 14,
            sma_period: 20,
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    #[test]
    fn oversold_above_sma_is_buy() {
        let signal = SignalGenerator::default()
            .generate("EURUSD", snap(25.0, 100.0), 105.0, at())
            .unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        assert!(signal.confidence > 0.0);
        assert_eq!(signal.price, 105.0);
    }

    #[test]
    fn overbought_below_sma_is_sell() {
        let signal = SignalGenerator::default()
            .generate("EURUSD", snap(75.0, 100.0), 95.0, at())
            .unwrap();
        assert_eq!(signal.direction, Direction::Sell);
    }

    #[test]
    fn neutral_rsi_gives_no_signal() {
        let generator = SignalGenerator::default();
        assert!(generator.generate("EURUSD", snap(50.0, 100.0), 105.0, at()).is_none());
        assert!(generator.generate("EURUSD", snap(50.0, 100.0), 95.0, at()).is_none());
    }

    #[test]
    fn oversold_below_sma_gives_no_signal() {
        assert!(
            SignalGenerator::default()
                .generate("EURUSD", snap(25.0, 100.0), 95.0, at())
                .is_none()
        );
    }

    #[test]
    fn confidence_is_deterministic() {
        let generator = SignalGenerator::default();
        let a = generator.generate("EURUSD", snap(22.0, 100.0), 100.4, at()).unwrap();
        let b = generator.generate("EURUSD", snap(22.0, 100.0), 100.4, at()).unwrap();
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn confidence_grows_with_rsi_distance() {
        let generator = SignalGenerator::default();
        let mut previous = 0.0;
        for rsi in [29.0, 25.0, 15.0, 5.0, 0.0] {
            let c = generator.confidence(&snap(rsi, 100.0), 100.2, Direction::Buy);
            assert!(c > previous, "confidence {} at RSI {} not above {}", c, rsi, previous);
            previous = c;
        }

        let mut previous = 0.0;
        for rsi in [71.0, 80.0, 90.0, 100.0] {
            let c = generator.confidence(&snap(rsi, 100.0), 99.8, Direction::Sell);
            assert!(c > previous);
            previous = c;
        }
    }

    #[test]
    fn confidence_stays_in_unit_range() {
        let generator = SignalGenerator::default();
        let c = generator.confidence(&snap(0.0, 100.0), 200.0, Direction::Buy);
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn strength_labels() {
        assert_eq!(strength_label(0.85), "Very Strong");
        assert_eq!(strength_label(0.6), "Strong");
        assert_eq!(strength_label(0.45), "Moderate");
        assert_eq!(strength_label(0.2), "Weak");
        assert_eq!(strength_label(0.1), "Very Weak");
    }
}
