use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::CoreError;

/// Candle interval offered by the exchange's kline endpoint.
///
/// Serialized as the exchange's own code ("1", "60", "D", ...), which is also
/// what the interval selector shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1")]
    Min1,
    #[serde(rename = "3")]
    Min3,
    #[serde(rename = "5")]
    Min5,
    #[serde(rename = "15")]
    Min15,
    #[serde(rename = "30")]
    Min30,
    #[serde(rename = "60")]
    Hour1,
    #[serde(rename = "120")]
    Hour2,
    #[serde(rename = "240")]
    Hour4,
    #[serde(rename = "360")]
    Hour6,
    #[serde(rename = "720")]
    Hour12,
    #[default]
    #[serde(rename = "D")]
    Day,
    #[serde(rename = "W")]
    Week,
    #[serde(rename = "M")]
    Month,
}

impl Interval {
    /// Every interval, in selector order.
    pub const ALL: [Interval; 13] = [
        Interval::Min1,
        Interval::Min3,
        Interval::Min5,
        Interval::Min15,
        Interval::Min30,
        Interval::Hour1,
        Interval::Hour2,
        Interval::Hour4,
        Interval::Hour6,
        Interval::Hour12,
        Interval::Day,
        Interval::Week,
        Interval::Month,
    ];

    /// The code used in kline requests.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1",
            Interval::Min3 => "3",
            Interval::Min5 => "5",
            Interval::Min15 => "15",
            Interval::Min30 => "30",
            Interval::Hour1 => "60",
            Interval::Hour2 => "120",
            Interval::Hour4 => "240",
            Interval::Hour6 => "360",
            Interval::Hour12 => "720",
            Interval::Day => "D",
            Interval::Week => "W",
            Interval::Month => "M",
        }
    }

    /// Nominal bucket length in seconds. A month counts as 30 days; only
    /// used for scroll heuristics, never for bucketing.
    pub fn duration_secs(&self) -> i64 {
        const MINUTE: i64 = 60;
        const DAY: i64 = 24 * 60 * MINUTE;
        match self {
            Interval::Min1 => MINUTE,
            Interval::Min3 => 3 * MINUTE,
            Interval::Min5 => 5 * MINUTE,
            Interval::Min15 => 15 * MINUTE,
            Interval::Min30 => 30 * MINUTE,
            Interval::Hour1 => 60 * MINUTE,
            Interval::Hour2 => 120 * MINUTE,
            Interval::Hour4 => 240 * MINUTE,
            Interval::Hour6 => 360 * MINUTE,
            Interval::Hour12 => 720 * MINUTE,
            Interval::Day => DAY,
            Interval::Week => 7 * DAY,
            Interval::Month => 30 * DAY,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for Interval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_api_str().eq_ignore_ascii_case(code))
            .ok_or_else(|| CoreError::InvalidInterval(s.to_string()))
    }
}
