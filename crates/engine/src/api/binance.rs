//! Binance public klines as a history source (no authentication required)

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};

use super::{clip_to_request, HistoryProvider, HistoryRequest};
use crate::types::Bar;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const MAX_KLINES_PER_REQUEST: usize = 1000;

#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

/// Raw kline row (array of mixed values)
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    u64,    // 8: Number of trades
    String, // 9: Taker buy base
    String, // 10: Taker buy quote
    String, // 11: Ignore
);

impl RawKline {
    fn into_bar(self) -> Option<Bar> {
        Some(Bar {
            timestamp: self.0,
            open: Decimal::from_str(&self.1).ok()?,
            high: Decimal::from_str(&self.2).ok()?,
            low: Decimal::from_str(&self.3).ok()?,
            close: Decimal::from_str(&self.4).ok()?,
            volume: Decimal::from_str(&self.5).ok()?,
        })
    }
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// One page of klines, oldest first
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}",
            self.base_url, symbol, interval
        );
        if let Some(start) = start_time {
            url.push_str(&format!("&startTime={}", start));
        }
        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={}", end));
        }
        url.push_str(&format!("&limit={}", limit.clamp(1, MAX_KLINES_PER_REQUEST)));

        debug!(symbol, interval, "Fetching klines from Binance");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let raw: Vec<RawKline> = response.json().await?;
        let bars: Vec<Bar> = raw.into_iter().filter_map(RawKline::into_bar).collect();
        debug!(count = bars.len(), "Fetched klines");
        Ok(bars)
    }

    /// Walk forward page by page until `end_time`
    pub async fn get_klines_paginated(
        &self,
        symbol: &str,
        interval: &str,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<Bar>> {
        let mut all = Vec::new();
        let mut current_start = start_time;

        info!(symbol, interval, "Fetching paginated klines from Binance");

        while current_start < end_time {
            let page = self
                .get_klines(
                    symbol,
                    interval,
                    Some(current_start),
                    Some(end_time),
                    MAX_KLINES_PER_REQUEST,
                )
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            current_start = last.timestamp + 1;
            all.extend(page);

            // rate limit
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        info!(total = all.len(), "Paginated kline fetch complete");
        Ok(all)
    }
}

#[async_trait]
impl HistoryProvider for BinanceClient {
    async fn fetch_history(&self, request: &HistoryRequest) -> Result<Vec<Bar>> {
        let bars = match (request.start_time, request.end_time) {
            (Some(start), Some(end)) => {
                self.get_klines_paginated(&request.symbol, &request.interval, start, end)
                    .await?
            }
            _ => {
                self.get_klines(
                    &request.symbol,
                    &request.interval,
                    request.start_time,
                    request.end_time,
                    request.limit,
                )
                .await?
            }
        };
        let bars = clip_to_request(bars, request);
        if bars.is_empty() {
            anyhow::bail!("No data available for {}", request.symbol);
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_raw_kline_parses() {
        let json = r#"[[1700000000000,"100.5","101.0","99.5","100.8","1234.5",1700086399999,"0",10,"0","0","0"]]"#;
        let raw: Vec<RawKline> = serde_json::from_str(json).unwrap();
        let bar = raw.into_iter().next().unwrap().into_bar().unwrap();
        assert_eq!(bar.timestamp, 1_700_000_000_000);
        assert_eq!(bar.close, dec!(100.8));
        assert_eq!(bar.volume, dec!(1234.5));
    }

    #[test]
    fn test_raw_kline_rejects_bad_number() {
        let json = r#"[[1,"x","1","1","1","1",2,"0",1,"0","0","0"]]"#;
        let raw: Vec<RawKline> = serde_json::from_str(json).unwrap();
        assert!(raw.into_iter().next().unwrap().into_bar().is_none());
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = BinanceClient::with_base_url("http://localhost:9000/").unwrap();
        assert_eq!(client.base_url, "http://localhost:9000");
    }
}
