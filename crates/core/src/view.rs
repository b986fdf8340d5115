use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::debug;

use crate::models::candle::WeightedCandle;
use crate::models::chart::{BackfillOutcome, SeriesVersion, VisibleRange};
use crate::services::backfill::BackfillCoordinator;

/// The candlestick widget the series is drawn in.
///
/// The core always pushes the whole accumulated series; the widget replaces
/// whatever it displayed before.
pub trait ChartWidget: Send {
    /// Replace the displayed data. `candles` is strictly ascending by time.
    fn set_data(&mut self, candles: &[WeightedCandle]);

    /// Zoom so all loaded data is visible.
    fn fit_content(&mut self);

    /// Start delivering "visible range changed" events to `sender`.
    fn subscribe_visible_range(&mut self, sender: UnboundedSender<VisibleRange>);

    /// Stop delivering range events.
    fn unsubscribe_visible_range(&mut self);
}

/// A chart view bound to a [`BackfillCoordinator`].
///
/// Opening the session subscribes to the widget's range events; dropping it
/// unsubscribes, on every exit path. Range events that pile up while a
/// backfill is running are coalesced to the latest one. While [`run`] is
/// active every change to the coordinator's series reaches the widget,
/// including resets started elsewhere.
///
/// [`run`]: ChartSession::run
pub struct ChartSession<W: ChartWidget> {
    widget: W,
    ranges: UnboundedReceiver<VisibleRange>,
    changes: watch::Receiver<SeriesVersion>,
    coordinator: Arc<BackfillCoordinator>,
    /// Coordinator generation the widget's data was last fitted for.
    shown_generation: u64,
    /// Whether the last push was empty; the first real data gets fitted.
    shown_empty: bool,
}

impl<W: ChartWidget> ChartSession<W> {
    pub fn open(mut widget: W, coordinator: Arc<BackfillCoordinator>) -> Self {
        let (sender, ranges) = mpsc::unbounded_channel();
        widget.subscribe_visible_range(sender);
        let changes = coordinator.subscribe();
        let mut session = Self {
            widget,
            ranges,
            changes,
            coordinator,
            shown_generation: 0,
            shown_empty: true,
        };
        session.push(true);
        session
    }

    fn push(&mut self, fit: bool) {
        let version = *self.changes.borrow_and_update();
        let candles = self.coordinator.candles();
        self.widget.set_data(&candles);
        if fit {
            self.widget.fit_content();
        }
        self.shown_generation = version.generation;
        self.shown_empty = candles.is_empty();
    }

    /// Push the coordinator's current series. After a reset, or when data
    /// first arrives, the view is also re-fitted since the old zoom belongs
    /// to discarded data.
    pub fn sync(&mut self) {
        let generation = self.changes.borrow().generation;
        if generation != self.shown_generation {
            debug!(generation, "chart series was reset");
            self.push(true);
        } else {
            self.push(self.shown_empty);
        }
    }

    /// Handle one range event: backfill if needed, then push the series if
    /// it changed since the last push.
    pub async fn handle_range(&mut self, range: VisibleRange) -> Option<BackfillOutcome> {
        let outcome = self.coordinator.on_visible_range_changed(range).await;
        if self.changes.has_changed().unwrap_or(false) {
            self.sync();
        }
        outcome
    }

    /// Process range events and series changes until the widget drops its
    /// sender.
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                received = self.ranges.recv() => {
                    let Some(mut range) = received else {
                        break;
                    };
                    while let Ok(newer) = self.ranges.try_recv() {
                        range = newer;
                    }
                    self.handle_range(range).await;
                }
                Ok(()) = self.changes.changed() => self.sync(),
            }
        }
    }

    /// Wait for the next range event and handle it. Returns `None` once the
    /// widget has gone away.
    pub async fn next_range(&mut self) -> Option<Option<BackfillOutcome>> {
        let range = self.ranges.recv().await?;
        Some(self.handle_range(range).await)
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn coordinator(&self) -> &Arc<BackfillCoordinator> {
        &self.coordinator
    }
}

impl<W: ChartWidget> Drop for ChartSession<W> {
    fn drop(&mut self) {
        self.widget.unsubscribe_visible_range();
    }
}
