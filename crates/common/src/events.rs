use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Signal, TradeOutcome, TradeRequest};

/// Something the notification sink should hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradingEvent {
    SignalGenerated(Signal),
    TradeAdmitted(TradeRequest),
    TradeRejected { instrument: String, reason: String },
    TradeCompleted(TradeOutcome),
    TradingPaused { reason: String },
    TradingResumed,
    CycleSkipped { instrument: String, reason: String },
    EngineStopped,
}

impl TradingEvent {
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::TradingPaused { .. } | Self::EngineStopped)
    }
}

impl fmt::Display for TradingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignalGenerated(s) => write!(
                f,
                "{} {} @ {:.5} (confidence {:.2}, RSI {:.1}, SMA {:.5})",
                s.direction, s.instrument, s.price, s.confidence, s.snapshot.rsi, s.snapshot.sma
            ),
            Self::TradeAdmitted(r) => write!(
                f,
                "Trade placed: {} {} stake {:.2} ({})",
                r.direction, r.instrument, r.stake, r.mode
            ),
            Self::TradeRejected { instrument, reason } => {
                write!(f, "Trade on {} rejected: {}", instrument, reason)
            }
            Self::TradeCompleted(o) => write!(
                f,
                "{} {} {} P/L {:+.2}",
                if o.is_win { "WIN" } else { "LOSS" },
                o.request.direction,
                o.request.instrument,
                o.profit_loss
            ),
            Self::TradingPaused { reason } => write!(f, "Trading paused: {}", reason),
            Self::TradingResumed => f.write_str("Trading resumed"),
            Self::CycleSkipped { instrument, reason } => {
                write!(f, "Cycle for {} skipped: {}", instrument, reason)
            }
            Self::EngineStopped => f.write_str("Trading engine stopped"),
        }
    }
}
