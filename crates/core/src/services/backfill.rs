use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::candle::WeightedCandle;
use crate::models::chart::{
    AggregationResult, BackfillOutcome, BackfillState, ChartSeries, SeriesVersion, VisibleRange,
};
use crate::models::interval::Interval;
use crate::models::portfolio::Portfolio;
use crate::models::settings::Settings;
use crate::services::aggregator::WeightedAggregator;

/// Everything that changes together. Replaced wholesale on reset.
struct Inner {
    /// Bumped on every reset; requests remember the generation they started in.
    generation: u64,
    portfolio: Portfolio,
    interval: Interval,
    series: ChartSeries,
    state: BackfillState,
    status: String,
}

/// Clears `in_flight` when a request finishes, however it finishes,
/// unless a reset has already replaced the state it belonged to.
struct InFlightGuard<'a> {
    inner: &'a Mutex<Inner>,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.generation == self.generation {
            inner.state.in_flight = false;
        }
    }
}

/// Owns the accumulated chart series and extends it into the past.
///
/// - **Single-flight**: while one load or backfill is outstanding, further
///   `extend_before` calls return [`BackfillOutcome::Busy`] without fetching.
/// - **Exhaustion**: a backfill that yields nothing older than its anchor
///   marks the series exhausted; later calls return
///   [`BackfillOutcome::NoMoreData`] without fetching, until the next reset.
/// - **Generations**: `reset` bumps a generation counter. Results of requests
///   started before the reset are dropped instead of merged.
///
/// The lock is never held across an `.await`; all mutation happens when a
/// fetch completes. Every change to the series is announced on a
/// [`watch`] channel, see [`BackfillCoordinator::subscribe`].
pub struct BackfillCoordinator {
    aggregator: WeightedAggregator,
    initial_candles: usize,
    page_size: usize,
    prefetch_candles: usize,
    inner: Mutex<Inner>,
    changes: watch::Sender<SeriesVersion>,
}

impl BackfillCoordinator {
    pub fn new(aggregator: WeightedAggregator, settings: &Settings) -> Self {
        Self {
            aggregator,
            initial_candles: settings.initial_candles,
            page_size: settings.backfill_candles,
            prefetch_candles: settings.prefetch_candles,
            inner: Mutex::new(Inner {
                generation: 0,
                portfolio: Vec::new(),
                interval: settings.default_interval,
                series: ChartSeries::new(),
                state: BackfillState::default(),
                status: String::new(),
            }),
            changes: watch::channel(SeriesVersion::default()).0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Called with the lock held so versions go out in mutation order.
    fn publish(&self, inner: &Inner) {
        self.changes.send_modify(|version| {
            version.generation = inner.generation;
            version.revision += 1;
        });
    }

    /// Receiver that wakes on every reset, initial load and merged page.
    pub fn subscribe(&self) -> watch::Receiver<SeriesVersion> {
        self.changes.subscribe()
    }

    /// Discard everything and load a fresh initial window for `portfolio`
    /// at `interval`.
    ///
    /// The old series is cleared immediately and backfills are refused until
    /// the initial window lands. Returns `None` when another reset overtook
    /// this one before its data arrived.
    pub async fn reset(
        &self,
        portfolio: Portfolio,
        interval: Interval,
    ) -> Option<AggregationResult> {
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.portfolio = portfolio.clone();
            inner.interval = interval;
            inner.series = ChartSeries::new();
            inner.state = BackfillState {
                in_flight: true,
                ..BackfillState::default()
            };
            inner.status.clear();
            self.publish(&inner);
            inner.generation
        };
        let _guard = InFlightGuard {
            inner: &self.inner,
            generation,
        };
        info!(generation, assets = portfolio.len(), %interval, "resetting chart series");

        let result = self
            .aggregator
            .aggregate(&portfolio, interval, self.initial_candles, None)
            .await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, current = inner.generation, "discarding superseded initial load");
            return None;
        }
        inner.series = ChartSeries::from_candles(result.series.clone());
        inner.state.earliest_loaded_time = inner.series.earliest_time();
        inner.status = result.status_message();
        self.publish(&inner);
        Some(result)
    }

    /// Load up to one page of candles strictly older than `anchor` and merge
    /// them into the series.
    pub async fn extend_before(&self, anchor: i64) -> BackfillOutcome {
        let (generation, portfolio, interval) = {
            let mut inner = self.lock();
            if inner.state.exhausted {
                return BackfillOutcome::NoMoreData;
            }
            if inner.state.in_flight {
                debug!(anchor, "backfill already in flight, dropping request");
                return BackfillOutcome::Busy;
            }
            inner.state.in_flight = true;
            (inner.generation, inner.portfolio.clone(), inner.interval)
        };
        let _guard = InFlightGuard {
            inner: &self.inner,
            generation,
        };
        info!(generation, anchor, page = self.page_size, "backfilling history");

        let result = self
            .aggregator
            .aggregate(&portfolio, interval, self.page_size, Some(anchor))
            .await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, current = inner.generation, "discarding superseded backfill");
            return BackfillOutcome::Superseded;
        }

        match result.earliest_time() {
            Some(earliest) if earliest < anchor => {
                let added = inner.series.merge(&result.series);
                let new_earliest = inner.series.earliest_time().unwrap_or(earliest);
                if inner
                    .state
                    .earliest_loaded_time
                    .map_or(true, |t| new_earliest < t)
                {
                    inner.state.earliest_loaded_time = Some(new_earliest);
                }
                inner.status = result.status_message();
                self.publish(&inner);
                info!(added, earliest = new_earliest, total = inner.series.len(), "merged backfill page");
                BackfillOutcome::Extended {
                    earliest: new_earliest,
                    added,
                }
            }
            _ => {
                inner.state.exhausted = true;
                info!(anchor, "reached start of available history");
                BackfillOutcome::NoMoreData
            }
        }
    }

    /// Whether a chart showing `range` is close enough to the oldest loaded
    /// candle to warrant another page.
    pub fn should_backfill(&self, range: VisibleRange) -> bool {
        let inner = self.lock();
        if inner.state.exhausted || inner.state.in_flight {
            return false;
        }
        let Some(earliest) = inner.state.earliest_loaded_time else {
            return false;
        };
        let margin = (self.prefetch_candles as i64).saturating_mul(inner.interval.duration_secs());
        range.from <= earliest.saturating_add(margin)
    }

    /// React to the chart's "visible range changed" event. Returns `None`
    /// when the range did not call for a backfill.
    pub async fn on_visible_range_changed(&self, range: VisibleRange) -> Option<BackfillOutcome> {
        if !self.should_backfill(range) {
            return None;
        }
        let anchor = self.lock().state.earliest_loaded_time?;
        Some(self.extend_before(anchor).await)
    }

    // ── Read-only snapshots ─────────────────────────────────────────

    #[must_use]
    pub fn series(&self) -> ChartSeries {
        self.lock().series.clone()
    }

    #[must_use]
    pub fn candles(&self) -> Vec<WeightedCandle> {
        self.lock().series.candles().to_vec()
    }

    #[must_use]
    pub fn state(&self) -> BackfillState {
        self.lock().state
    }

    #[must_use]
    pub fn version(&self) -> SeriesVersion {
        *self.changes.borrow()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    #[must_use]
    pub fn interval(&self) -> Interval {
        self.lock().interval
    }

    #[must_use]
    pub fn portfolio(&self) -> Portfolio {
        self.lock().portfolio.clone()
    }

    /// Truncation / missing-data status from the latest applied aggregation.
    #[must_use]
    pub fn status_message(&self) -> String {
        self.lock().status.clone()
    }

    pub fn aggregator(&self) -> &WeightedAggregator {
        &self.aggregator
    }
}
