use chrono::DateTime;
use common::error::DataError;
use common::models::PricePoint;
use serde::Deserialize;

/// One row of `GET /api/v3/klines`. Binance sends each candle as a
/// 12-element array with prices as strings.
#[derive(Debug, Deserialize)]
pub struct KlineRow(
    pub i64,    // open time, ms
    pub String, // open
    pub String, // high
    pub String, // low
    pub String, // close
    pub String, // volume
    pub i64,    // close time, ms
    pub String, // quote asset volume
    pub u64,    // number of trades
    pub String, // taker buy base volume
    pub String, // taker buy quote volume
    pub serde_json::Value,
);

#[derive(Debug, thiserror::Error)]
pub enum KlineParseError {
    #[error("bad timestamp {0}")]
    Timestamp(i64),
    #[error("bad number '{0}'")]
    Number(String),
    #[error(transparent)]
    Data(#[from] DataError),
}

impl KlineRow {
    pub fn to_price_point(&self) -> Result<PricePoint, KlineParseError> {
        let timestamp =
            DateTime::from_timestamp_millis(self.0).ok_or(KlineParseError::Timestamp(self.0))?;
        let point = PricePoint {
            timestamp,
            open: parse(&self.1)?,
            high: parse(&self.2)?,
            low: parse(&self.3)?,
            close: parse(&self.4)?,
            volume: parse(&self.5)?,
        };
        point.validate()?;
        Ok(point)
    }
}

fn parse(raw: &str) -> Result<f64, KlineParseError> {
    raw.parse::<f64>()
        .map_err(|_| KlineParseError::Number(raw.to_string()))
}
