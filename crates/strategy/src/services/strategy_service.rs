use common::config::StrategyConfig;
use common::error::IndicatorError;
use common::models::{PriceSeries, Signal, TradeMode, ValidatedSignal};
use tracing::debug;

use crate::indicators;
use crate::signal::SignalGenerator;
use crate::validator::SignalValidator;

/// Indicators, signal rules and validation behind one configured facade.
#[derive(Debug, Clone)]
pub struct StrategyService {
    rsi_period: usize,
    sma_period: usize,
    generator: SignalGenerator,
    validator: SignalValidator,
}

impl StrategyService {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            rsi_period: config.rsi_period,
            sma_period: config.sma_period,
            generator: SignalGenerator::new(config),
            validator: SignalValidator::new(config),
        }
    }

    /// Runs the indicators over `series` and applies the signal rules to its
    /// last close.
    pub fn evaluate(
        &self,
        instrument: &str,
        series: &PriceSeries,
    ) -> Result<Option<Signal>, IndicatorError> {
        let last = series.last().ok_or(IndicatorError::InsufficientData {
            required: (self.rsi_period + 1).max(self.sma_period),
            actual: 0,
        })?;

        let closes = series.closes();
        let snapshot = indicators::snapshot(&closes, self.rsi_period, self.sma_period)?;
        debug!(
            "{}: RSI({})={:.2} SMA({})={:.5} close={:.5}",
            instrument, self.rsi_period, snapshot.rsi, self.sma_period, snapshot.sma, last.close
        );

        Ok(self
            .generator
            .generate(instrument, snapshot, last.close, last.timestamp))
    }

    pub fn validate(
        &self,
        signal: Signal,
        secondary: Option<&PriceSeries>,
        mode: TradeMode,
    ) -> ValidatedSignal {
        self.validator.validate(signal, secondary, mode)
    }
}
