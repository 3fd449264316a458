//! History providers
//!
//! The forecasting core only needs "give me the bars for this symbol". Network
//! and file adapters live here behind [`HistoryProvider`].

pub mod binance;
pub mod file;

pub use binance::BinanceClient;
pub use file::FileHistoryProvider;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Bar;

/// What to fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub symbol: String,
    /// Bar interval such as `1d` or `1h`
    pub interval: String,
    /// Most recent bars to return
    pub limit: usize,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

impl HistoryRequest {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>, limit: usize) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            limit,
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_range(mut self, start_time: Option<i64>, end_time: Option<i64>) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }
}

/// Source of time-ordered OHLCV bars. An empty result is an error.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn fetch_history(&self, request: &HistoryRequest) -> Result<Vec<Bar>>;
}

/// Keep bars inside the requested time range, then the last `limit` of them
pub(crate) fn clip_to_request(mut bars: Vec<Bar>, request: &HistoryRequest) -> Vec<Bar> {
    bars.retain(|b| {
        request.start_time.map_or(true, |s| b.timestamp >= s)
            && request.end_time.map_or(true, |e| b.timestamp <= e)
    });
    if request.limit > 0 && bars.len() > request.limit {
        bars.drain(..bars.len() - request.limit);
    }
    bars
}

/// Interval string to milliseconds (`1m`, `15m`, `1h`, `4h`, `1d`, `1w`)
pub fn interval_to_ms(interval: &str) -> Option<i64> {
    let interval = interval.trim();
    let split = interval.find(|c: char| !c.is_ascii_digit())?;
    let (count, unit) = interval.split_at(split);
    let count: i64 = count.parse().ok()?;
    let unit_ms = match unit {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 7 * 86_400_000,
        _ => return None,
    };
    Some(count * unit_ms)
}
