use std::collections::BTreeMap;

use futures::future::join_all;
use tracing::{debug, info};

use crate::models::candle::{AssetSeries, WeightedCandle};
use crate::models::chart::{AggregationResult, TruncationInfo};
use crate::models::interval::Interval;
use crate::models::portfolio::PortfolioEntry;
use crate::services::series_fetcher::SeriesFetcher;

/// Per-timestamp running sums.
#[derive(Default)]
struct Bucket {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    weight: f64,
}

impl Bucket {
    fn average(&self, time: i64) -> WeightedCandle {
        if self.weight == 0.0 {
            return WeightedCandle::flat(time, 0.0);
        }
        WeightedCandle {
            time,
            open: self.open / self.weight,
            high: self.high / self.weight,
            low: self.low / self.weight,
            close: self.close / self.weight,
        }
    }
}

/// Blends every portfolio asset into one weighted candle series.
///
/// Each OHLC field is averaged independently, weighted by the entries that
/// actually have a candle at that timestamp. That is an approximation of a
/// real index, and it is what "portfolio price" means here.
#[derive(Clone)]
pub struct WeightedAggregator {
    fetcher: SeriesFetcher,
}

impl WeightedAggregator {
    pub fn new(fetcher: SeriesFetcher) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &SeriesFetcher {
        &self.fetcher
    }

    /// Fetch every entry's series concurrently, then combine them.
    ///
    /// Completes only once all fetches have settled; a failing asset
    /// contributes an empty series rather than an error.
    pub async fn aggregate(
        &self,
        portfolio: &[PortfolioEntry],
        interval: Interval,
        limit: usize,
        end_boundary: Option<i64>,
    ) -> AggregationResult {
        let fetches = portfolio.iter().map(|entry| {
            self.fetcher
                .fetch(&entry.ticker, interval, limit, end_boundary)
        });
        let series = join_all(fetches).await;
        let result = combine(portfolio, &series);

        if let Some(truncation) = &result.truncated_at {
            info!(
                ticker = %truncation.ticker,
                time = truncation.time,
                "aggregated window truncated by shorter history"
            );
        }
        debug!(
            assets = portfolio.len(),
            %interval,
            ?end_boundary,
            candles = result.series.len(),
            "aggregation complete"
        );
        result
    }
}

/// Align per-asset series on their common start and weight-average them.
///
/// `series[i]` belongs to `portfolio[i]`. The common start is the latest of
/// the per-asset first times: the earliest point where every asset has data.
/// Candles before it are dropped. When the first times differ, the result is
/// marked truncated at the common start, naming the first entry whose history
/// begins there.
///
/// An asset with no candles at all leaves no time where every asset has
/// data, so the series comes back empty and the ticker is listed in
/// `missing`. When every asset is empty the result is simply empty.
pub fn combine(portfolio: &[PortfolioEntry], series: &[AssetSeries]) -> AggregationResult {
    let pairs: Vec<(&PortfolioEntry, &AssetSeries)> = portfolio.iter().zip(series).collect();

    if pairs.iter().all(|(_, s)| s.is_empty()) {
        return AggregationResult::default();
    }

    let missing: Vec<String> = pairs
        .iter()
        .filter(|(_, s)| s.is_empty())
        .map(|(entry, _)| entry.ticker.clone())
        .collect();
    if !missing.is_empty() {
        return AggregationResult {
            series: Vec::new(),
            truncated_at: None,
            missing,
        };
    }

    let min_times: Vec<i64> = pairs.iter().filter_map(|(_, s)| s.min_time()).collect();
    let Some(common_start) = min_times.iter().copied().max() else {
        return AggregationResult::default();
    };

    let truncated_at = if min_times.iter().any(|&t| t != common_start) {
        pairs
            .iter()
            .find(|(_, s)| s.min_time() == Some(common_start))
            .map(|(entry, _)| TruncationInfo {
                time: common_start,
                ticker: entry.ticker.clone(),
            })
    } else {
        None
    };

    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    for (entry, asset) in &pairs {
        let weight = entry.weight;
        for candle in asset.candles.iter().filter(|c| c.time >= common_start) {
            let bucket = buckets.entry(candle.time).or_default();
            bucket.open += candle.open * weight;
            bucket.high += candle.high * weight;
            bucket.low += candle.low * weight;
            bucket.close += candle.close * weight;
            bucket.weight += weight;
        }
    }

    AggregationResult {
        series: buckets
            .iter()
            .map(|(&time, bucket)| bucket.average(time))
            .collect(),
        truncated_at,
        missing: Vec::new(),
    }
}
