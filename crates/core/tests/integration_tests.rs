// ═══════════════════════════════════════════════════════════════════
// Integration Tests — PortfolioChart facade and ChartSession wiring
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use portfolio_chart_core::errors::CoreError;
use portfolio_chart_core::models::candle::{Candle, WeightedCandle};
use portfolio_chart_core::models::chart::{BackfillOutcome, VisibleRange};
use portfolio_chart_core::models::interval::Interval;
use portfolio_chart_core::models::portfolio::{default_portfolio, PortfolioEntry};
use portfolio_chart_core::models::settings::Settings;
use portfolio_chart_core::providers::traits::CandleSource;
use portfolio_chart_core::view::ChartWidget;
use portfolio_chart_core::PortfolioChart;

// ═══════════════════════════════════════════════════════════════════
// Test Helpers
// ═══════════════════════════════════════════════════════════════════

const DAY: i64 = 86_400;
const T0: i64 = 1_700_000_000;

fn t(i: i64) -> i64 {
    T0 + i * DAY
}

/// History per (ticker, interval). Serves the latest `limit` candles older than `end`.
struct HistorySource {
    history: HashMap<(String, Interval), Vec<Candle>>,
}

impl HistorySource {
    fn new() -> Self {
        Self {
            history: HashMap::new(),
        }
    }

    fn with(mut self, ticker: &str, interval: Interval, start: i64, closes: &[f64]) -> Self {
        let step = interval.duration_secs();
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::flat(T0 + (start + i as i64) * step, c))
            .collect();
        self.history.insert((ticker.to_string(), interval), candles);
        self
    }
}

#[async_trait]
impl CandleSource for HistorySource {
    fn name(&self) -> &str {
        "History"
    }

    async fn fetch_candles(
        &self,
        ticker: &str,
        interval: Interval,
        limit: usize,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, CoreError> {
        let Some(all) = self.history.get(&(ticker.to_string(), interval)) else {
            return Err(CoreError::Api {
                provider: "History".into(),
                message: format!("unknown symbol {ticker}"),
            });
        };
        let older: Vec<Candle> = all
            .iter()
            .copied()
            .filter(|c| end.map_or(true, |e| c.time < e))
            .collect();
        let skip = older.len().saturating_sub(limit);
        Ok(older.into_iter().skip(skip).rev().collect())
    }

    async fn list_tickers(&self) -> Result<Vec<String>, CoreError> {
        let mut tickers: Vec<String> = self.history.keys().map(|(t, _)| t.clone()).collect();
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }
}

fn settings() -> Settings {
    Settings {
        initial_candles: 3,
        backfill_candles: 3,
        prefetch_candles: 1,
        ..Settings::default()
    }
}

/// Everything the widget was asked to do, shared so it survives the session.
#[derive(Default)]
struct WidgetLog {
    pushes: Vec<Vec<WeightedCandle>>,
    fits: usize,
    sender: Option<UnboundedSender<VisibleRange>>,
    unsubscribed: bool,
}

#[derive(Clone, Default)]
struct RecordingWidget {
    log: Arc<Mutex<WidgetLog>>,
}

impl ChartWidget for RecordingWidget {
    fn set_data(&mut self, candles: &[WeightedCandle]) {
        self.log.lock().unwrap().pushes.push(candles.to_vec());
    }

    fn fit_content(&mut self) {
        self.log.lock().unwrap().fits += 1;
    }

    fn subscribe_visible_range(&mut self, sender: UnboundedSender<VisibleRange>) {
        self.log.lock().unwrap().sender = Some(sender);
    }

    fn unsubscribe_visible_range(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.sender = None;
        log.unsubscribed = true;
    }
}

impl RecordingWidget {
    fn emit(&self, range: VisibleRange) {
        let log = self.log.lock().unwrap();
        log.sender
            .as_ref()
            .expect("widget is not subscribed")
            .send(range)
            .unwrap();
    }
}

fn btc_eth_chart() -> PortfolioChart {
    let source = HistorySource::new()
        .with("BTC", Interval::Day, 0, &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0])
        .with("ETH", Interval::Day, 0, &[100.0, 200.0, 300.0, 400.0, 500.0, 600.0])
        .with("BTC", Interval::Week, 0, &[1.0, 2.0, 3.0])
        .with("ETH", Interval::Week, 0, &[4.0, 5.0, 6.0])
        .with("SOL", Interval::Day, 4, &[7.0, 8.0]);
    PortfolioChart::new(settings(), Arc::new(source))
}

// ═══════════════════════════════════════════════════════════════════
// PortfolioChart facade
// ═══════════════════════════════════════════════════════════════════

mod facade {
    use super::*;

    #[test]
    fn starts_with_default_portfolio_and_interval() {
        let chart = btc_eth_chart();
        assert_eq!(chart.portfolio(), default_portfolio().as_slice());
        assert_eq!(chart.interval(), Interval::Day);
        assert!(chart.series().is_empty());
    }

    #[tokio::test]
    async fn reload_builds_weighted_series() {
        let chart = btc_eth_chart();
        let result = chart.reload().await.unwrap();

        let closes: Vec<f64> = result.series.iter().map(|c| c.close).collect();
        // (btc*1 + eth*2) / 3
        assert_eq!(closes, vec![(40.0 + 800.0) / 3.0, (50.0 + 1000.0) / 3.0, (60.0 + 1200.0) / 3.0]);
        assert_eq!(chart.series().len(), 3);
        assert_eq!(chart.status_message(), "");
    }

    #[tokio::test]
    async fn set_portfolio_normalizes_and_resets() {
        let mut chart = btc_eth_chart();
        chart.reload().await;

        let entries = vec![PortfolioEntry {
            ticker: " btc".into(),
            weight: 3.0,
        }];
        chart.set_portfolio(entries).await.unwrap();

        assert_eq!(chart.portfolio(), &[PortfolioEntry::new("BTC", 3.0)]);
        let closes: Vec<f64> = chart.series().candles().iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![40.0, 50.0, 60.0]);
    }

    #[tokio::test]
    async fn invalid_portfolio_changes_nothing() {
        let mut chart = btc_eth_chart();
        chart.reload().await;
        let series = chart.series();

        let err = chart
            .set_portfolio(vec![PortfolioEntry::new("BTC", 0.0)])
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ValidationError(_)));
        assert_eq!(chart.portfolio(), default_portfolio().as_slice());
        assert_eq!(chart.series(), series);
    }

    #[tokio::test]
    async fn set_interval_discards_accumulated_history() {
        let mut chart = btc_eth_chart();
        chart.reload().await;
        chart.extend_before(t(3)).await;
        assert_eq!(chart.series().len(), 6);

        chart.set_interval(Interval::Week).await.unwrap();

        assert_eq!(chart.interval(), Interval::Week);
        let closes: Vec<f64> = chart.series().candles().iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![(1.0 + 8.0) / 3.0, (2.0 + 10.0) / 3.0, (3.0 + 12.0) / 3.0]);
        assert!(!chart.backfill_state().exhausted);
    }

    #[tokio::test]
    async fn truncation_surfaces_in_status() {
        let mut chart = btc_eth_chart();
        chart
            .set_portfolio(vec![PortfolioEntry::new("BTC", 1.0), PortfolioEntry::new("SOL", 1.0)])
            .await
            .unwrap();

        let times: Vec<i64> = chart.series().candles().iter().map(|c| c.time).collect();
        assert_eq!(times, vec![t(4), t(5)]);
        assert!(chart.status_message().ends_with("because of SOL"));
    }

    #[tokio::test]
    async fn unknown_ticker_reports_missing() {
        let mut chart = btc_eth_chart();
        chart
            .set_portfolio(vec![PortfolioEntry::new("BTC", 1.0), PortfolioEntry::new("NOPE", 1.0)])
            .await
            .unwrap();

        assert!(chart.series().is_empty());
        assert_eq!(chart.status_message(), "No data for NOPE");
    }

    #[tokio::test]
    async fn history_scrolls_back_until_exhausted() {
        let chart = btc_eth_chart();
        chart.reload().await;

        assert_eq!(
            chart.extend_before(t(3)).await,
            BackfillOutcome::Extended {
                earliest: t(0),
                added: 3
            }
        );
        assert_eq!(chart.extend_before(t(0)).await, BackfillOutcome::NoMoreData);
        assert_eq!(chart.extend_before(t(0)).await, BackfillOutcome::NoMoreData);
        assert!(chart.backfill_state().exhausted);
    }

    #[tokio::test]
    async fn available_tickers_from_source() {
        let chart = btc_eth_chart();
        assert_eq!(chart.available_tickers().await, vec!["BTC", "ETH", "SOL"]);
    }

    #[test]
    fn debug_output_is_compact() {
        let chart = btc_eth_chart();
        let debug = format!("{chart:?}");
        assert!(debug.starts_with("PortfolioChart"));
        assert!(debug.contains("candles: 0"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// ChartSession
// ═══════════════════════════════════════════════════════════════════

mod chart_session {
    use super::*;

    fn closes(candles: &[WeightedCandle]) -> Vec<f64> {
        candles.iter().map(|c| c.close).collect()
    }

    /// Poll the widget log until `done` holds, letting the session task run.
    async fn wait_for(handle: &RecordingWidget, done: impl Fn(&WidgetLog) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if done(&handle.log.lock().unwrap()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("widget never reached the expected state");
    }

    #[tokio::test]
    async fn open_subscribes_and_shows_series() {
        let chart = btc_eth_chart();
        chart.reload().await;
        let widget = RecordingWidget::default();
        let log = Arc::clone(&widget.log);

        let _session = chart.open_session(widget);

        let log = log.lock().unwrap();
        assert!(log.sender.is_some());
        assert_eq!(log.pushes.len(), 1);
        assert_eq!(log.pushes[0].len(), 3);
        assert_eq!(log.fits, 1);
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let chart = btc_eth_chart();
        let widget = RecordingWidget::default();
        let log = Arc::clone(&widget.log);

        {
            let _session = chart.open_session(widget);
            assert!(!log.lock().unwrap().unsubscribed);
        }

        let log = log.lock().unwrap();
        assert!(log.unsubscribed);
        assert!(log.sender.is_none());
    }

    #[tokio::test]
    async fn range_near_start_pushes_merged_series() {
        let chart = btc_eth_chart();
        chart.reload().await;
        let widget = RecordingWidget::default();
        let handle = widget.clone();
        let mut session = chart.open_session(widget);

        handle.emit(VisibleRange { from: t(3), to: t(5) });
        let outcome = session.next_range().await.unwrap();

        assert!(matches!(outcome, Some(BackfillOutcome::Extended { .. })));
        let log = handle.log.lock().unwrap();
        assert_eq!(log.pushes.len(), 2);
        let times: Vec<i64> = log.pushes[1].iter().map(|c| c.time).collect();
        assert_eq!(times, (0..6).map(t).collect::<Vec<_>>());
        // extension keeps the user's zoom
        assert_eq!(log.fits, 1);
    }

    #[tokio::test]
    async fn range_away_from_start_does_nothing() {
        let chart = btc_eth_chart();
        chart.reload().await;
        let widget = RecordingWidget::default();
        let handle = widget.clone();
        let mut session = chart.open_session(widget);

        handle.emit(VisibleRange { from: t(5), to: t(5) });
        assert_eq!(session.next_range().await, Some(None));
        assert_eq!(handle.log.lock().unwrap().pushes.len(), 1);
    }

    #[tokio::test]
    async fn sync_after_reset_refits() {
        let mut chart = btc_eth_chart();
        chart.reload().await;
        let widget = RecordingWidget::default();
        let handle = widget.clone();
        let mut session = chart.open_session(widget);

        chart.set_interval(Interval::Week).await;
        session.sync();

        let log = handle.log.lock().unwrap();
        assert_eq!(log.fits, 2);
        assert_eq!(log.pushes.last().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn run_ends_when_widget_unsubscribes() {
        let chart = btc_eth_chart();
        chart.reload().await;
        let widget = RecordingWidget::default();
        let handle = widget.clone();
        let mut session = chart.open_session(widget);

        handle.emit(VisibleRange { from: t(5), to: t(5) });
        handle.emit(VisibleRange { from: t(3), to: t(4) });
        handle.log.lock().unwrap().sender = None;

        session.run().await;

        // the two queued events were coalesced into the latest one
        let state = chart.backfill_state();
        assert_eq!(state.earliest_loaded_time, Some(t(0)));
    }

    #[tokio::test]
    async fn run_pushes_reset_series_without_range_event() {
        let mut chart = btc_eth_chart();
        chart.reload().await;
        let widget = RecordingWidget::default();
        let handle = widget.clone();
        let mut session = chart.open_session(widget);
        let task = tokio::spawn(async move { session.run().await });

        chart.set_interval(Interval::Week).await;
        let weekly = chart.series().candles().to_vec();
        assert_eq!(closes(&weekly), vec![3.0, 4.0, 5.0]);

        wait_for(&handle, |log| log.pushes.last() == Some(&weekly)).await;
        assert!(handle.log.lock().unwrap().fits >= 2);

        handle.log.lock().unwrap().sender = None;
        task.await.unwrap();
        assert!(handle.log.lock().unwrap().unsubscribed);
    }

    #[tokio::test]
    async fn run_shows_initial_load_finished_after_open() {
        let chart = btc_eth_chart();
        let widget = RecordingWidget::default();
        let handle = widget.clone();
        let mut session = chart.open_session(widget);
        assert!(handle.log.lock().unwrap().pushes[0].is_empty());
        let task = tokio::spawn(async move { session.run().await });

        chart.reload().await;

        wait_for(&handle, |log| log.pushes.last().map_or(0, Vec::len) == 3).await;
        // the empty view on open was fitted, and the loaded window again
        assert!(handle.log.lock().unwrap().fits >= 2);

        handle.log.lock().unwrap().sender = None;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn range_event_after_reset_pushes_new_series() {
        let mut chart = btc_eth_chart();
        chart.reload().await;
        let widget = RecordingWidget::default();
        let handle = widget.clone();
        let mut session = chart.open_session(widget);

        chart.set_interval(Interval::Week).await;
        // far from the weekly start: no backfill, but the reset is still shown
        handle.emit(VisibleRange { from: t(100), to: t(101) });
        assert_eq!(session.next_range().await, Some(None));

        let log = handle.log.lock().unwrap();
        assert_eq!(log.pushes.len(), 2);
        assert_eq!(closes(log.pushes.last().unwrap()), vec![3.0, 4.0, 5.0]);
        assert_eq!(log.fits, 2);
    }
}
