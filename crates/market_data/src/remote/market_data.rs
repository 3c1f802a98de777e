use async_trait::async_trait;
use common::error::ProviderError;
use common::models::PriceSeries;
use tracing::debug;

use crate::remote::binance_client::BinanceClient;
use crate::remote::kline_response::KlineRow;
use crate::traits::MarketDataProvider;

/// Candle source backed by `GET /api/v3/klines`. The same type serves the
/// primary and the secondary host.
pub struct BinanceMarketData {
    client: BinanceClient,
}

impl BinanceMarketData {
    pub fn new(client: BinanceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarketDataProvider for BinanceMarketData {
    fn name(&self) -> &str {
        self.client.dependency()
    }

    async fn fetch_candles(
        &self,
        instrument: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<PriceSeries, ProviderError> {
        let rows: Vec<KlineRow> = self
            .client
            .get_public(
                "/api/v3/klines",
                &[
                    ("symbol", instrument.to_uppercase()),
                    ("interval", timeframe.to_string()),
                    ("limit", count.clamp(1, 1000).to_string()),
                ],
            )
            .await?;

        let points = rows
            .iter()
            .map(KlineRow::to_price_point)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.decode_error(instrument, e.to_string()))?;

        debug!(
            "Fetched {} {} candles for {} from {}",
            points.len(),
            timeframe,
            instrument,
            self.name()
        );
        PriceSeries::new(points).map_err(|e| self.decode_error(instrument, e.to_string()))
    }
}

impl BinanceMarketData {
    fn decode_error(&self, instrument: &str, reason: String) -> ProviderError {
        ProviderError::Decode {
            dependency: self.name().to_string(),
            reason: format!("{}: {}", instrument, reason),
        }
    }
}
