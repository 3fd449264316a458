//! Offline history from JSON files, one `<SYMBOL>.json` array of bars per symbol

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::{clip_to_request, HistoryProvider, HistoryRequest};
use crate::types::Bar;

#[derive(Debug, Clone)]
pub struct FileHistoryProvider {
    dir: PathBuf,
}

impl FileHistoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", symbol))
    }
}

#[async_trait]
impl HistoryProvider for FileHistoryProvider {
    async fn fetch_history(&self, request: &HistoryRequest) -> Result<Vec<Bar>> {
        let path = self.path_for(&request.symbol);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("No data available for {} ({})", request.symbol, path.display()))?;
        let mut bars: Vec<Bar> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid bar file {}", path.display()))?;
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);

        let bars = clip_to_request(bars, request);
        if bars.is_empty() {
            anyhow::bail!("No data available for {}", request.symbol);
        }
        debug!(symbol = %request.symbol, count = bars.len(), "Loaded bars from file");
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stockcast-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn bar(ts: i64) -> Bar {
        Bar {
            timestamp: ts,
            open: dec!(10),
            high: dec!(11),
            low: dec!(9),
            close: dec!(10.5),
            volume: dec!(100),
        }
    }

    #[tokio::test]
    async fn test_reads_sorted_bars() {
        let dir = temp_dir("read");
        let bars = vec![bar(3), bar(1), bar(2), bar(2)];
        std::fs::write(dir.join("ABC.json"), serde_json::to_string(&bars).unwrap()).unwrap();

        let provider = FileHistoryProvider::new(&dir);
        let loaded = provider
            .fetch_history(&HistoryRequest::new("ABC", "1d", 0))
            .await
            .unwrap();
        let ts: Vec<i64> = loaded.iter().map(|b| b.timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3]);

        let limited = provider
            .fetch_history(&HistoryRequest::new("ABC", "1d", 2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].timestamp, 2);
    }

    #[tokio::test]
    async fn test_missing_symbol_is_error() {
        let provider = FileHistoryProvider::new(temp_dir("missing"));
        let err = provider
            .fetch_history(&HistoryRequest::new("NOPE", "1d", 10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No data available"));
    }

    #[tokio::test]
    async fn test_empty_file_is_error() {
        let dir = temp_dir("empty");
        std::fs::write(dir.join("EMPTY.json"), "[]").unwrap();
        let provider = FileHistoryProvider::new(&dir);
        assert!(provider
            .fetch_history(&HistoryRequest::new("EMPTY", "1d", 10))
            .await
            .is_err());
    }
}
