pub mod binance_execution;
pub mod paper_execution;
pub mod telegram_service;
