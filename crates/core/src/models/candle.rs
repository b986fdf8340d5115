use serde::{Deserialize, Serialize};

/// One OHLC price sample for a fixed time bucket.
///
/// `time` is the bucket's opening time in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
        }
    }

    /// A candle whose four prices are all `price`.
    pub fn flat(time: i64, price: f64) -> Self {
        Self::new(time, price, price, price, price)
    }
}

/// A weight-normalized blend of every portfolio asset at one timestamp.
///
/// Same shape as [`Candle`]; the alias keeps signatures honest about which
/// side of the aggregation a value comes from.
pub type WeightedCandle = Candle;

/// Candles for one ticker, ascending by `time`, no duplicate timestamps.
///
/// May hold fewer candles than requested when the asset's listing history is
/// shorter than the window, and is empty when nothing could be fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetSeries {
    pub ticker: String,
    pub candles: Vec<Candle>,
}

impl AssetSeries {
    pub fn new(ticker: impl Into<String>, candles: Vec<Candle>) -> Self {
        Self {
            ticker: ticker.into(),
            candles,
        }
    }

    pub fn empty(ticker: impl Into<String>) -> Self {
        Self::new(ticker, Vec::new())
    }

    /// Build a series from raw exchange rows: sorts ascending and keeps the
    /// first candle seen for each timestamp.
    pub fn normalized(ticker: impl Into<String>, mut candles: Vec<Candle>) -> Self {
        // Stable sort keeps arrival order among equal times, so dedup keeps the first.
        candles.sort_by_key(|c| c.time);
        candles.dedup_by_key(|c| c.time);
        Self::new(ticker, candles)
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Earliest candle time, `None` for an empty series.
    pub fn min_time(&self) -> Option<i64> {
        self.candles.first().map(|c| c.time)
    }

    pub fn max_time(&self) -> Option<i64> {
        self.candles.last().map(|c| c.time)
    }
}
