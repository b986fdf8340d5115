use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// One asset of the synthetic portfolio and its relative weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    /// Ticker symbol without the quote asset, uppercased (e.g., "BTC").
    pub ticker: String,

    /// Relative weight; must be positive and finite.
    /// Older saved portfolios call this field `amount`.
    #[serde(alias = "amount")]
    pub weight: f64,
}

impl PortfolioEntry {
    pub fn new(ticker: impl Into<String>, weight: f64) -> Self {
        Self {
            ticker: ticker.into().trim().to_uppercase(),
            weight,
        }
    }
}

/// Ordered list of portfolio entries. Order is insertion order and has no
/// meaning to the aggregation beyond the truncation tie-break.
pub type Portfolio = Vec<PortfolioEntry>;

/// The portfolio shown when nothing has been saved yet.
pub fn default_portfolio() -> Portfolio {
    vec![PortfolioEntry::new("BTC", 1.0), PortfolioEntry::new("ETH", 2.0)]
}

/// Check that a portfolio can be charted: at least one entry, every ticker
/// non-empty, every weight positive and finite.
pub fn validate_portfolio(entries: &[PortfolioEntry]) -> Result<(), CoreError> {
    if entries.is_empty() {
        return Err(CoreError::ValidationError(
            "Portfolio must contain at least one asset".into(),
        ));
    }
    for (idx, entry) in entries.iter().enumerate() {
        if entry.ticker.trim().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Entry #{idx} has an empty ticker"
            )));
        }
        if !entry.weight.is_finite() || entry.weight <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Weight for {} must be positive and finite, got {}",
                entry.ticker, entry.weight
            )));
        }
    }
    Ok(())
}
