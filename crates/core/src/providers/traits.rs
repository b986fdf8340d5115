use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::candle::Candle;
use crate::models::interval::Interval;

/// Abstraction over the exchange's historical price API.
///
/// The Bybit client implements this for production; tests plug in
/// in-memory sources. Implementations report failures as errors; turning
/// them into empty series is the series fetcher's job.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait CandleSource: Send + Sync {
    /// Human-readable name of this source (for logs/errors).
    fn name(&self) -> &str;

    /// Fetch up to `limit` candles for `ticker` at `interval`.
    ///
    /// With `end` set, only candles strictly older than `end` (epoch seconds)
    /// are wanted; without it, the most recent ones. Order and uniqueness of
    /// the returned candles are not guaranteed.
    async fn fetch_candles(
        &self,
        ticker: &str,
        interval: Interval,
        limit: usize,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, CoreError>;

    /// Tickers tradable on this source, for the asset selector.
    async fn list_tickers(&self) -> Result<Vec<String>, CoreError>;
}
