pub mod clock;
pub mod commands;
pub mod coordinator;
pub mod guards;
pub mod notifier;
pub mod phase;

pub use clock::{Clock, FixedClock, SystemClock};
pub use commands::{EngineCommand, EngineHandle};
pub use coordinator::{Collaborators, CycleOutcome, SkipReason, TradingEngine};
pub use guards::EngineGuards;
pub use notifier::{BroadcastNotifier, NotificationSink};
pub use phase::CyclePhase;
