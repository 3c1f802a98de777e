pub mod indicators;
pub mod services;
pub mod signal;
pub mod validator;

pub use services::strategy_service::StrategyService;
pub use signal::{SignalGenerator, strength_label};
pub use validator::SignalValidator;
