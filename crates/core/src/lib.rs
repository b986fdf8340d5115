pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;
pub mod view;

use std::sync::Arc;

use models::{
    chart::{AggregationResult, BackfillOutcome, BackfillState, ChartSeries},
    interval::Interval,
    portfolio::{default_portfolio, validate_portfolio, Portfolio, PortfolioEntry},
    settings::Settings,
};
use providers::{bybit::BybitProvider, traits::CandleSource};
use services::{
    aggregator::WeightedAggregator, backfill::BackfillCoordinator,
    series_fetcher::SeriesFetcher,
};
use tracing::info;
use view::{ChartSession, ChartWidget};

use errors::CoreError;

/// Main entry point for the Portfolio Chart core library.
///
/// Holds the user's portfolio and selected interval, and the coordinator
/// that owns the chart series built from them. Changing either one throws
/// the series away and loads a fresh initial window.
#[must_use]
pub struct PortfolioChart {
    settings: Settings,
    portfolio: Portfolio,
    interval: Interval,
    coordinator: Arc<BackfillCoordinator>,
}

impl std::fmt::Debug for PortfolioChart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioChart")
            .field("portfolio", &self.portfolio)
            .field("interval", &self.interval)
            .field("candles", &self.coordinator.series().len())
            .field("state", &self.coordinator.state())
            .finish()
    }
}

impl PortfolioChart {
    /// Build a chart over `source` with the default portfolio. Nothing is
    /// fetched until [`reload`](Self::reload) or a setter is called.
    pub fn new(settings: Settings, source: Arc<dyn CandleSource>) -> Self {
        let fetcher = SeriesFetcher::new(source);
        let aggregator = WeightedAggregator::new(fetcher);
        let coordinator = Arc::new(BackfillCoordinator::new(aggregator, &settings));
        Self {
            interval: settings.default_interval,
            portfolio: default_portfolio(),
            settings,
            coordinator,
        }
    }

    /// Build a chart backed by the Bybit market API.
    pub fn with_bybit(settings: Settings) -> Self {
        let source = Arc::new(BybitProvider::new(&settings));
        Self::new(settings, source)
    }

    // ── Portfolio & Interval ────────────────────────────────────────

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn portfolio(&self) -> &[PortfolioEntry] {
        &self.portfolio
    }

    #[must_use]
    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Replace the portfolio and rebuild the series from scratch.
    /// Tickers are normalized to uppercase. Nothing changes if validation fails.
    pub async fn set_portfolio(
        &mut self,
        entries: Portfolio,
    ) -> Result<Option<AggregationResult>, CoreError> {
        let entries: Portfolio = entries
            .into_iter()
            .map(|e| PortfolioEntry::new(e.ticker, e.weight))
            .collect();
        validate_portfolio(&entries)?;
        info!(assets = entries.len(), "portfolio changed");
        self.portfolio = entries;
        Ok(self.reload().await)
    }

    /// Switch interval and rebuild the series from scratch.
    pub async fn set_interval(&mut self, interval: Interval) -> Option<AggregationResult> {
        info!(%interval, "interval changed");
        self.interval = interval;
        self.reload().await
    }

    /// Discard the current series and load the initial window again.
    /// Returns `None` if a newer reset overtook this one.
    pub async fn reload(&self) -> Option<AggregationResult> {
        self.coordinator
            .reset(self.portfolio.clone(), self.interval)
            .await
    }

    // ── History ─────────────────────────────────────────────────────

    /// Extend the series with candles older than `anchor`.
    pub async fn extend_before(&self, anchor: i64) -> BackfillOutcome {
        self.coordinator.extend_before(anchor).await
    }

    /// Snapshot of the series currently on the chart.
    #[must_use]
    pub fn series(&self) -> ChartSeries {
        self.coordinator.series()
    }

    #[must_use]
    pub fn backfill_state(&self) -> BackfillState {
        self.coordinator.state()
    }

    /// Truncation or missing-data note for the UI; empty when there is none.
    #[must_use]
    pub fn status_message(&self) -> String {
        self.coordinator.status_message()
    }

    #[must_use]
    pub fn coordinator(&self) -> Arc<BackfillCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Bind a chart widget to this chart's series.
    pub fn open_session<W: ChartWidget>(&self, widget: W) -> ChartSession<W> {
        ChartSession::open(widget, self.coordinator())
    }

    // ── Instrument Discovery ────────────────────────────────────────

    /// Tickers tradable on the source, for the asset selector.
    /// Empty when the list could not be loaded.
    pub async fn available_tickers(&self) -> Vec<String> {
        self.coordinator
            .aggregator()
            .fetcher()
            .available_tickers()
            .await
    }
}
