pub mod data_manager;
pub mod db;
pub mod error;
pub mod instrument_manager;
pub mod repositories;
pub mod traits;

pub use data_manager::DataManager;
pub use error::StorageError;
pub use traits::TradeStore;
