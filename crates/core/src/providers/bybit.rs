use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;
use tracing::debug;

use super::traits::CandleSource;
use crate::errors::CoreError;
use crate::models::candle::Candle;
use crate::models::interval::Interval;
use crate::models::settings::{Settings, MAX_CANDLES_PER_REQUEST};

const PROVIDER: &str = "Bybit";

/// Page size for instrument discovery (the endpoint's maximum).
const INSTRUMENTS_PAGE_LIMIT: usize = 1000;

/// Hard stop for cursor pagination in case the API keeps handing out cursors.
const MAX_INSTRUMENT_PAGES: usize = 20;

/// Bybit v5 public market API.
///
/// - **Free**: No API key required.
/// - **Endpoints**: `/v5/market/kline`, `/v5/market/instruments-info`
///
/// Tickers are bare base assets ("BTC"); the configured quote asset is
/// appended to form the exchange symbol ("BTCUSDT").
pub struct BybitProvider {
    client: Client,
    base_url: String,
    category: String,
    quote_asset: String,
}

impl BybitProvider {
    pub fn new(settings: &Settings) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(settings.request_timeout_secs));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            category: settings.category.clone(),
            quote_asset: settings.quote_asset.to_uppercase(),
        }
    }

    /// Exchange symbol for a bare ticker: "eth" → "ETHUSDT".
    pub fn symbol_for(&self, ticker: &str) -> String {
        format!("{}{}", ticker.trim().to_uppercase(), self.quote_asset)
    }

    /// Kline request URL. `end` is exclusive, so the request asks for
    /// candles opening at or before one millisecond earlier.
    pub fn kline_url(
        &self,
        ticker: &str,
        interval: Interval,
        limit: usize,
        end: Option<i64>,
    ) -> String {
        let limit = limit.clamp(1, MAX_CANDLES_PER_REQUEST);
        let mut url = format!(
            "{}/v5/market/kline?category={}&symbol={}&interval={}&limit={limit}",
            self.base_url,
            self.category,
            self.symbol_for(ticker),
            interval.as_api_str(),
        );
        if let Some(end) = end {
            let end_ms = end.saturating_mul(1000).saturating_sub(1);
            url.push_str(&format!("&end={end_ms}"));
        }
        url
    }

    fn instruments_url(&self, cursor: Option<&str>) -> String {
        let mut url = format!(
            "{}/v5/market/instruments-info?category={}&limit={INSTRUMENTS_PAGE_LIMIT}",
            self.base_url, self.category
        );
        if let Some(cursor) = cursor {
            url.push_str(&format!("&cursor={cursor}"));
        }
        url
    }

    async fn get_body(&self, url: &str) -> Result<String, CoreError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("HTTP {status}"),
            });
        }
        Ok(resp.text().await?)
    }
}

// ── Bybit API response types ────────────────────────────────────────

#[derive(Deserialize)]
struct ApiResponse<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Deserialize)]
struct KlineResult {
    // Rows of [startMs, open, high, low, close, volume, turnover], newest first.
    list: Option<Vec<Vec<Value>>>,
}

#[derive(Deserialize)]
struct InstrumentsResult {
    #[serde(default)]
    list: Vec<InstrumentEntry>,
    #[serde(rename = "nextPageCursor", default)]
    next_page_cursor: Option<String>,
}

#[derive(Deserialize)]
struct InstrumentEntry {
    symbol: String,
}

fn unwrap_result<T>(resp: ApiResponse<T>, what: &str) -> Result<T, CoreError> {
    if resp.ret_code != 0 {
        return Err(CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("{what}: retCode {} ({})", resp.ret_code, resp.ret_msg),
        });
    }
    resp.result.ok_or_else(|| CoreError::Api {
        provider: PROVIDER.into(),
        message: format!("{what}: response has no result"),
    })
}

/// Numbers arrive as strings, but accept plain JSON numbers too.
fn field_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn field_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Convert one kline row. Returns `None` for short or unparseable rows.
fn parse_kline_row(row: &[Value]) -> Option<Candle> {
    if row.len() < 5 {
        return None;
    }
    let start_ms = field_i64(&row[0])?;
    Some(Candle {
        time: start_ms.div_euclid(1000),
        open: field_f64(&row[1])?,
        high: field_f64(&row[2])?,
        low: field_f64(&row[3])?,
        close: field_f64(&row[4])?,
    })
}

/// Parse a kline response body into candles (exchange order, bad rows skipped).
pub fn parse_kline_body(body: &str) -> Result<Vec<Candle>, CoreError> {
    let resp: ApiResponse<KlineResult> = serde_json::from_str(body)?;
    let rows = unwrap_result(resp, "kline")?
        .list
        .ok_or_else(|| CoreError::Api {
            provider: PROVIDER.into(),
            message: "kline: response has no list".into(),
        })?;
    Ok(rows.iter().filter_map(|row| parse_kline_row(row)).collect())
}

/// Strip the quote asset from exchange symbols and drop duplicates,
/// keeping first-seen order. Symbols quoted in anything else are skipped
/// because they could not be charted against this quote.
pub fn tickers_from_symbols<'a>(
    symbols: impl IntoIterator<Item = &'a str>,
    quote_asset: &str,
) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for symbol in symbols {
        let Some(base) = symbol.strip_suffix(quote_asset) else {
            continue;
        };
        if base.is_empty() || tickers.iter().any(|t| t == base) {
            continue;
        }
        tickers.push(base.to_string());
    }
    tickers
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl CandleSource for BybitProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_candles(
        &self,
        ticker: &str,
        interval: Interval,
        limit: usize,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, CoreError> {
        let url = self.kline_url(ticker, interval, limit, end);
        debug!(ticker, %interval, limit, ?end, "requesting klines");
        let body = self.get_body(&url).await?;
        parse_kline_body(&body)
    }

    async fn list_tickers(&self) -> Result<Vec<String>, CoreError> {
        let mut symbols = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_INSTRUMENT_PAGES {
            let body = self.get_body(&self.instruments_url(cursor.as_deref())).await?;
            let resp: ApiResponse<InstrumentsResult> = serde_json::from_str(&body)?;
            let page = unwrap_result(resp, "instruments-info")?;
            symbols.extend(page.list.into_iter().map(|i| i.symbol));

            match page.next_page_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(count = symbols.len(), "fetched instrument list");
        Ok(tickers_from_symbols(
            symbols.iter().map(String::as_str),
            &self.quote_asset,
        ))
    }
}
