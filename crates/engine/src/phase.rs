use std::fmt;

/// Where the coordinator currently is within a trading cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Retry,
    Signaling,
    Validating,
    RiskCheck,
    Executing,
    Recording,
    Paused,
    Stopped,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Fetching => "FETCHING",
            Self::Retry => "RETRY",
            Self::Signaling => "SIGNALING",
            Self::Validating => "VALIDATING",
            Self::RiskCheck => "RISK_CHECK",
            Self::Executing => "EXECUTING",
            Self::Recording => "RECORDING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}
