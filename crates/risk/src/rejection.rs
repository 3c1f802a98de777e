use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    Paused,
    ConfirmationRequired,
    DemoOnly,
    InsufficientBalance,
    DailyLimit,
    CircuitOpen,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Paused => "PAUSED",
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            Self::DemoOnly => "DEMO_ONLY",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::DailyLimit => "DAILY_LIMIT",
            Self::CircuitOpen => "CIRCUIT_OPEN",
        }
    }
}

/// A trade the risk gate refused. Expected control flow, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub detail: String,
}

impl Rejection {
    pub fn new(reason: RejectionReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason.code(), self.detail)
    }
}
