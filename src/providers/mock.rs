// Deterministic in-process providers. Values depend only on a symbol's index
// in the request, so repeated runs over the same watchlist are reproducible.

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{MarketDataProvider, NewsProvider};
use crate::error::ScanError;
use crate::types::{NewsItem, Snapshot};

pub struct MockMarketDataProvider;

#[async_trait]
impl MarketDataProvider for MockMarketDataProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_snapshots(&self, symbols: &[String]) -> Result<Vec<Snapshot>, ScanError> {
        let now = Utc::now();
        Ok(symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let i = i as f64;
                Snapshot {
                    symbol: symbol.clone(),
                    name: format!("{symbol}_NAME"),
                    price: 3.0 + i * 1.6,
                    pe_ttm: Some(10.0 + i * 6.0),
                    pb: Some(1.0 + i * 0.3),
                    roe: Some(7.0 + i * 2.0),
                    revenue_growth: Some(5.0 + i * 3.0),
                    return_20d: Some(-2.0 + i * 1.5),
                    volume_ratio: Some(1.0 + i * 0.2),
                    as_of: now,
                }
            })
            .collect())
    }
}

pub struct MockNewsProvider;

#[async_trait]
impl NewsProvider for MockNewsProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_news(&self, symbols: &[String]) -> Result<Vec<NewsItem>, ScanError> {
        let now = Utc::now();
        Ok(symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let title = if i % 2 == 0 {
                    format!("{symbol} 公告：签订重大订单，业绩预增")
                } else {
                    format!("{symbol} 公告：股东计划减持")
                };
                NewsItem {
                    symbols: vec![symbol.clone()],
                    title,
                    source: "mock".to_string(),
                    published_at: now - Duration::hours(i as i64),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<String> {
        ["600000", "000001", "300750"].iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn mock_snapshots_are_deterministic_per_index() {
        let snaps = MockMarketDataProvider.get_snapshots(&symbols()).await.unwrap();
        assert_eq!(snaps.len(), 3);
        assert_eq!(snaps[1].name, "000001_NAME");
        assert!((snaps[2].price - 6.2).abs() < 1e-9);
        assert!((snaps[0].return_20d.unwrap() + 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn mock_news_alternates_sentiment() {
        let news = MockNewsProvider.get_news(&symbols()).await.unwrap();
        assert_eq!(news.len(), 3);
        assert!(news[0].title.contains("业绩预增"));
        assert!(news[1].title.contains("减持"));
        assert!(news[1].published_at < news[0].published_at);
    }
}
