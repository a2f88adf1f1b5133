// =============================================================================
// File providers - normalized JSON arrays on disk
// =============================================================================
//
// The file is re-read on every call and filtered to the requested symbols
// (case-insensitive). Records for symbols outside the request are ignored; a
// missing symbol simply yields a partial result.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{MarketDataProvider, NewsProvider};
use crate::error::ScanError;
use crate::types::{NewsItem, Snapshot};

async fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ScanError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ScanError::provider("file", format!("{}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| ScanError::provider("file", format!("{}: malformed payload: {e}", path.display())))
}

fn requested(symbols: &[String]) -> HashSet<String> {
    symbols.iter().map(|s| s.trim().to_uppercase()).collect()
}

pub struct FileMarketDataProvider {
    path: PathBuf,
}

impl FileMarketDataProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MarketDataProvider for FileMarketDataProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_snapshots(&self, symbols: &[String]) -> Result<Vec<Snapshot>, ScanError> {
        let wanted = requested(symbols);
        let all: Vec<Snapshot> = read_records(&self.path).await?;
        let total = all.len();
        let snaps: Vec<Snapshot> = all
            .into_iter()
            .filter(|s| s.symbol.trim().is_empty() || wanted.contains(&s.symbol.trim().to_uppercase()))
            .collect();
        debug!(path = %self.path.display(), total, kept = snaps.len(), "snapshots loaded from file");
        Ok(snaps)
    }
}

pub struct FileNewsProvider {
    path: PathBuf,
}

impl FileNewsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NewsProvider for FileNewsProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_news(&self, symbols: &[String]) -> Result<Vec<NewsItem>, ScanError> {
        let wanted = requested(symbols);
        let all: Vec<NewsItem> = read_records(&self.path).await?;
        let total = all.len();
        let news: Vec<NewsItem> = all
            .into_iter()
            .filter(|n| {
                n.symbols.iter().all(|s| s.trim().is_empty())
                    || n.symbols.iter().any(|s| wanted.contains(&s.trim().to_uppercase()))
            })
            .collect();
        debug!(path = %self.path.display(), total, kept = news.len(), "news loaded from file");
        Ok(news)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshots_are_filtered_to_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        std::fs::write(
            &path,
            r#"[{"symbol":"AAA","price":12.0,"pe_ttm":10.0},{"symbol":"BBB","price":3.0}]"#,
        )
        .unwrap();

        let provider = FileMarketDataProvider::new(&path);
        let snaps = provider.get_snapshots(&["aaa".to_string(), "CCC".to_string()]).await.unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].symbol, "AAA");
        assert_eq!(snaps[0].pe_ttm, Some(10.0));
    }

    #[tokio::test]
    async fn news_keeps_items_mentioning_any_requested_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.json");
        std::fs::write(
            &path,
            r#"[
                {"symbols":["AAA","BBB"],"title":"Joint contract","source":"akshare","published_at":"2026-10-16T08:00:00Z"},
                {"symbols":["ZZZ"],"title":"Unrelated","source":"akshare","published_at":"2026-10-16T08:00:00Z"}
            ]"#,
        )
        .unwrap();

        let news = FileNewsProvider::new(&path).get_news(&["BBB".to_string()]).await.unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "Joint contract");
    }

    #[tokio::test]
    async fn missing_or_malformed_file_is_a_provider_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileMarketDataProvider::new(dir.path().join("nope.json"));
        assert!(matches!(
            missing.get_snapshots(&[]).await,
            Err(ScanError::Provider { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            FileNewsProvider::new(&bad).get_news(&[]).await,
            Err(ScanError::Provider { .. })
        ));
    }
}
