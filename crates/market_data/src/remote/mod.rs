pub mod binance_client;
pub mod kline_response;
pub mod market_data;

pub use binance_client::{AccountInformation, BinanceClient, OrderResponse, OrderSide, OrderSize};
pub use kline_response::KlineRow;
pub use market_data::BinanceMarketData;
