use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::candle::WeightedCandle;

/// Where and why an aggregated window was cut short.
///
/// `time` is the latest first-candle time across all assets (the common
/// start), and `ticker` is the asset whose history begins there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruncationInfo {
    pub time: i64,
    pub ticker: String,
}

impl TruncationInfo {
    /// Human-readable status line for the UI.
    pub fn message(&self) -> String {
        let when = DateTime::from_timestamp(self.time, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| self.time.to_string());
        format!("Data truncated to {when} because of {}", self.ticker)
    }
}

/// Output of one weighted aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Weighted candles, strictly ascending by time.
    pub series: Vec<WeightedCandle>,

    /// Present when at least one asset's history starts later than the others.
    pub truncated_at: Option<TruncationInfo>,

    /// Tickers that returned no candles at all for the requested window.
    pub missing: Vec<String>,
}

impl AggregationResult {
    pub fn earliest_time(&self) -> Option<i64> {
        self.series.first().map(|c| c.time)
    }

    /// Status line describing truncation or missing assets; empty when the
    /// window is complete.
    pub fn status_message(&self) -> String {
        if !self.missing.is_empty() {
            return format!("No data for {}", self.missing.join(", "));
        }
        self.truncated_at
            .as_ref()
            .map(TruncationInfo::message)
            .unwrap_or_default()
    }
}

/// The accumulated series currently on the chart.
///
/// Strictly ascending by time with no duplicate timestamps. Times only ever
/// enter the series; the whole thing is replaced on reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartSeries {
    candles: Vec<WeightedCandle>,
}

impl ChartSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an aggregation output. Input is expected ascending; it goes
    /// through `merge` anyway so the invariant holds regardless.
    pub fn from_candles(candles: Vec<WeightedCandle>) -> Self {
        let mut series = Self::new();
        series.merge(&candles);
        series
    }

    /// Union by time. Timestamps already present keep their existing candle
    /// (first seen wins). Returns the number of candles added.
    pub fn merge(&mut self, incoming: &[WeightedCandle]) -> usize {
        let mut fresh = incoming.to_vec();
        fresh.sort_by_key(|c| c.time);
        fresh.dedup_by_key(|c| c.time);

        let before = self.candles.len();
        let mut merged = Vec::with_capacity(before + fresh.len());
        let mut old = std::mem::take(&mut self.candles).into_iter().peekable();
        let mut new = fresh.into_iter().peekable();
        loop {
            let next = match (old.peek().map(|c| c.time), new.peek().map(|c| c.time)) {
                (Some(a), Some(b)) if b < a => new.next(),
                (Some(a), Some(b)) if b == a => {
                    new.next();
                    old.next()
                }
                (Some(_), _) => old.next(),
                (None, _) => new.next(),
            };
            match next {
                Some(candle) => merged.push(candle),
                None => break,
            }
        }
        self.candles = merged;
        self.candles.len() - before
    }

    pub fn candles(&self) -> &[WeightedCandle] {
        &self.candles
    }

    pub fn earliest_time(&self) -> Option<i64> {
        self.candles.first().map(|c| c.time)
    }

    pub fn latest_time(&self) -> Option<i64> {
        self.candles.last().map(|c| c.time)
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// Identifies one state of the accumulated series. `revision` moves on every
/// change, `generation` only on reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesVersion {
    pub generation: u64,
    pub revision: u64,
}

/// Backfill bookkeeping for one chart series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillState {
    pub earliest_loaded_time: Option<i64>,
    pub in_flight: bool,
    /// Monotonic until the next reset.
    pub exhausted: bool,
}

/// Result of one `extend_before` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// Older candles were merged; `earliest` is the series' new first time.
    Extended { earliest: i64, added: usize },
    /// The start of available history was reached; no further calls will fetch.
    NoMoreData,
    /// Another backfill (or the initial load) is still running; the call was dropped.
    Busy,
    /// A reset happened while the request was outstanding; its result was discarded.
    Superseded,
}

/// The time span currently visible in the chart widget, in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleRange {
    pub from: i64,
    pub to: i64,
}
