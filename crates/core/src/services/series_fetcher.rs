use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::candle::AssetSeries;
use crate::models::interval::Interval;
use crate::providers::traits::CandleSource;

/// Retrieves one asset's candles and normalizes them.
///
/// This is the only layer that sees source errors. Transport failures,
/// error payloads and empty responses all come out as an empty
/// [`AssetSeries`], so callers treat "empty" as "no data for this request".
#[derive(Clone)]
pub struct SeriesFetcher {
    source: Arc<dyn CandleSource>,
}

impl SeriesFetcher {
    pub fn new(source: Arc<dyn CandleSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn CandleSource> {
        &self.source
    }

    /// Fetch up to `limit` candles for `ticker`, strictly older than
    /// `end_boundary` when given.
    ///
    /// The result is ascending by time with unique timestamps, whatever
    /// order the source returned.
    pub async fn fetch(
        &self,
        ticker: &str,
        interval: Interval,
        limit: usize,
        end_boundary: Option<i64>,
    ) -> AssetSeries {
        let candles = match self
            .source
            .fetch_candles(ticker, interval, limit, end_boundary)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!(
                    ticker,
                    %interval,
                    source = self.source.name(),
                    error = %e,
                    "candle fetch failed, treating as no data"
                );
                return AssetSeries::empty(ticker);
            }
        };

        let received = candles.len();
        let mut series = AssetSeries::normalized(ticker, candles);
        if let Some(end) = end_boundary {
            series.candles.retain(|c| c.time < end);
        }

        if series.is_empty() {
            debug!(ticker, %interval, ?end_boundary, "no candles in requested window");
        } else {
            debug!(
                ticker,
                %interval,
                received,
                kept = series.len(),
                "fetched candles"
            );
        }
        series
    }

    /// Tickers for the asset selector. Failures yield an empty list.
    pub async fn available_tickers(&self) -> Vec<String> {
        match self.source.list_tickers().await {
            Ok(tickers) => tickers,
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "failed to load ticker list");
                Vec::new()
            }
        }
    }
}
