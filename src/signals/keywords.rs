// =============================================================================
// Keyword Catalyst - legacy lexical scoring of headlines
// =============================================================================
//
// Counts positive and negative keywords in each headline. Kept alongside the
// structured news signal so the fuser can fall back to it when few events are
// available.

use std::collections::HashMap;

use crate::config::NewsParams;
use crate::types::NewsItem;

/// Per-symbol keyword score in [-100, 100]. Symbols without news are absent
/// (callers treat absence as 0).
pub fn keyword_scores(items: &[NewsItem], params: &NewsParams) -> HashMap<String, f64> {
    let positive: Vec<String> = params.positive_keywords.iter().map(|k| k.to_lowercase()).collect();
    let negative: Vec<String> = params.negative_keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut scores: HashMap<String, f64> = HashMap::new();
    for item in items {
        let title = item.title.to_lowercase();
        let hits_pos = positive.iter().filter(|k| title.contains(k.as_str())).count() as f64;
        let hits_neg = negative.iter().filter(|k| title.contains(k.as_str())).count() as f64;
        let delta = hits_pos * params.positive_keyword_step - hits_neg * params.negative_keyword_step;

        for symbol in &item.symbols {
            let key = symbol.trim().to_uppercase();
            if key.is_empty() {
                continue;
            }
            let score = scores.entry(key).or_insert(0.0);
            *score = (*score + delta).clamp(-100.0, 100.0);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn news(symbol: &str, title: &str) -> NewsItem {
        NewsItem {
            symbols: vec![symbol.to_string()],
            title: title.to_string(),
            source: "mock".to_string(),
            published_at: Utc::now(),
        }
    }

    #[test]
    fn positive_and_negative_keywords_offset() {
        let params = NewsParams::default();
        let scores = keyword_scores(
            &[news("AAA", "Buyback follows revenue growth"), news("AAA", "Lawsuit filed")],
            &params,
        );
        // +12 +12 -18
        assert!((scores["AAA"] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn scores_are_clamped() {
        let params = NewsParams::default();
        let items: Vec<NewsItem> = (0..10).map(|i| news("BBB", &format!("退市 违约 {i}"))).collect();
        let scores = keyword_scores(&items, &params);
        assert!((scores["BBB"] + 100.0).abs() < 1e-9);
    }

    #[test]
    fn symbols_without_news_are_absent() {
        let scores = keyword_scores(&[], &NewsParams::default());
        assert!(scores.get("AAA").is_none());
    }
}
