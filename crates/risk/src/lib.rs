pub mod gate;
pub mod rejection;
pub mod state;

pub use gate::RiskGate;
pub use rejection::{Rejection, RejectionReason};
pub use state::{PauseReason, RiskMetrics, RiskState};
