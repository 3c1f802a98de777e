use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// One OHLCV candle as delivered by a market data provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PricePoint {
    pub fn validate(&self) -> Result<(), DataError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(DataError::NegativePrice(self.timestamp));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(DataError::NegativeVolume(self.timestamp));
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err(DataError::InconsistentRange(self.timestamp));
        }
        Ok(())
    }
}

/// Candles ordered by strictly increasing timestamp.
///
/// The ordering is checked once on construction; the series is read-only
/// afterwards so every consumer sees the same history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self, DataError> {
        for point in &points {
            point.validate()?;
        }
        for pair in points.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(DataError::OutOfOrder {
                    previous: pair[0].timestamp,
                    next: pair[1].timestamp,
                });
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
