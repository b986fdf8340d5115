use serde::{Deserialize, Serialize};

use super::interval::Interval;

/// Upper bound the exchange accepts for `limit` on a kline request.
pub const MAX_CANDLES_PER_REQUEST: usize = 1000;

/// User-configurable settings. Every field has a default, so partial JSON
/// files load fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Exchange REST root, or a relay in front of it.
    pub base_url: String,

    /// Product category for kline and instrument requests (e.g., "linear").
    pub category: String,

    /// Quote asset appended to every ticker to form the exchange symbol.
    pub quote_asset: String,

    /// Candles fetched on a full reset.
    pub initial_candles: usize,

    /// Candles fetched per backfill page.
    pub backfill_candles: usize,

    /// How many candles before the earliest loaded one the visible range may
    /// reach before another page is requested.
    pub prefetch_candles: usize,

    /// HTTP timeout per request.
    pub request_timeout_secs: u64,

    /// Interval selected on startup.
    pub default_interval: Interval,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://api.bybit.com".to_string(),
            category: "linear".to_string(),
            quote_asset: "USDT".to_string(),
            initial_candles: 300,
            backfill_candles: 300,
            prefetch_candles: 100,
            request_timeout_secs: 30,
            default_interval: Interval::Day,
        }
    }
}
