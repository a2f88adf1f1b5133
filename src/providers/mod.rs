// =============================================================================
// Data Providers
// =============================================================================
//
// The pipeline consumes normalized `Snapshot` / `NewsItem` lists and does not
// care how they were fetched. Providers may fail or return partial data; the
// orchestrator tolerates both.
//
// Provider kinds (selected once at startup):
//   mock          deterministic in-process data
//   file:<path>   normalized JSON array on disk
//   none          news only: always empty
//   auto          news only: `mock` when the market provider is mock, else `none`

pub mod file;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::{NewsItem, Snapshot};

pub use file::{FileMarketDataProvider, FileNewsProvider};
pub use mock::{MockMarketDataProvider, MockNewsProvider};

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_snapshots(&self, symbols: &[String]) -> Result<Vec<Snapshot>, ScanError>;
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_news(&self, symbols: &[String]) -> Result<Vec<NewsItem>, ScanError>;
}

// ---------------------------------------------------------------------------
// NullNewsProvider
// ---------------------------------------------------------------------------

/// News provider that never has news.
pub struct NullNewsProvider;

#[async_trait]
impl NewsProvider for NullNewsProvider {
    fn name(&self) -> &str {
        "none"
    }

    async fn get_news(&self, _symbols: &[String]) -> Result<Vec<NewsItem>, ScanError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

fn file_path(kind: &str) -> Option<&str> {
    kind.strip_prefix("file:").map(str::trim).filter(|p| !p.is_empty())
}

pub fn build_market_provider(kind: &str) -> Result<Arc<dyn MarketDataProvider>, ScanError> {
    let kind = kind.trim();
    if let Some(path) = file_path(kind) {
        return Ok(Arc::new(FileMarketDataProvider::new(path)));
    }
    match kind.to_lowercase().as_str() {
        "mock" => Ok(Arc::new(MockMarketDataProvider)),
        other => Err(ScanError::provider(
            "market",
            format!("unsupported market provider '{other}'"),
        )),
    }
}

pub fn build_news_provider(
    kind: &str,
    market_kind: &str,
) -> Result<Arc<dyn NewsProvider>, ScanError> {
    let kind = kind.trim();
    if let Some(path) = file_path(kind) {
        return Ok(Arc::new(FileNewsProvider::new(path)));
    }
    let mut mode = kind.to_lowercase();
    if mode == "auto" {
        mode = if market_kind.trim().eq_ignore_ascii_case("mock") {
            "mock".to_string()
        } else {
            "none".to_string()
        };
    }
    match mode.as_str() {
        "mock" => Ok(Arc::new(MockNewsProvider)),
        "none" => Ok(Arc::new(NullNewsProvider)),
        other => Err(ScanError::provider(
            "news",
            format!("unsupported news provider '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_news_follows_market_kind() {
        assert_eq!(build_news_provider("auto", "mock").unwrap().name(), "mock");
        assert_eq!(build_news_provider("auto", "file:x.json").unwrap().name(), "none");
        assert_eq!(build_news_provider(" NONE ", "mock").unwrap().name(), "none");
    }

    #[test]
    fn file_kinds_are_recognised() {
        assert_eq!(build_market_provider("file:data/s.json").unwrap().name(), "file");
        assert_eq!(build_news_provider("file:data/n.json", "mock").unwrap().name(), "file");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(build_market_provider("bloomberg").is_err());
        assert!(build_market_provider("file:").is_err());
        assert!(build_news_provider("rss", "mock").is_err());
    }

    #[tokio::test]
    async fn null_provider_is_empty() {
        let news = NullNewsProvider.get_news(&["AAA".to_string()]).await.unwrap();
        assert!(news.is_empty());
    }
}
