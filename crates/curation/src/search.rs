//! Search gateway: one external query in, scored candidates out.
//!
//! The external API sits behind the [`SearchApi`] trait so the pipeline's
//! tests can run against a canned implementation.  The production backend
//! is the [Brave Search API](https://api.search.brave.com/app/documentation/web-search).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credibility::score_url;
use crate::error::CurationError;

/// Lowercased URL with any trailing slash stripped; the dedup key for
/// search results.
pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// A result exactly as the search backend returned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// A deduplicated, scored result awaiting filtering and curation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub description: String,
    pub publisher: String,
    pub credibility: f32,
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Run one query.  `freshness` is a `YYYY-MM-DDtoYYYY-MM-DD` range.
    async fn search(
        &self,
        query: &str,
        freshness: &str,
        count: usize,
    ) -> Result<Vec<RawSearchResult>, CurationError>;
}

// ── Brave backend ─────────────────────────────────────────────────────────────

pub struct BraveSearchApi {
    client: reqwest::Client,
    api_key: String,
}

impl BraveSearchApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SearchApi for BraveSearchApi {
    async fn search(
        &self,
        query: &str,
        freshness: &str,
        count: usize,
    ) -> Result<Vec<RawSearchResult>, CurationError> {
        if self.api_key.trim().is_empty() {
            return Err(CurationError::Upstream("BRAVE_API_KEY not set".to_string()));
        }

        let response = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .query(&[
                ("q", query),
                ("count", &count.to_string()),
                ("freshness", freshness),
            ])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| CurationError::Upstream(format!("brave search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CurationError::Upstream(format!(
                "brave search error {status}: {body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CurationError::Upstream(format!("brave search bad body: {e}")))?;

        let mut results = Vec::new();
        if let Some(items) = json["web"]["results"].as_array() {
            for item in items {
                let title = item["title"].as_str().unwrap_or("").trim();
                let url = item["url"].as_str().unwrap_or("").trim();
                let description = item["description"].as_str().unwrap_or("").trim();
                if !title.is_empty() && !url.is_empty() {
                    results.push(RawSearchResult {
                        title: title.to_string(),
                        url: url.to_string(),
                        description: description.to_string(),
                    });
                }
            }
        }
        Ok(results)
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────────

pub struct SearchGateway {
    api: Arc<dyn SearchApi>,
    max_results: usize,
    freshness_days: i64,
}

impl SearchGateway {
    pub fn new(api: Arc<dyn SearchApi>, max_results: usize, freshness_days: i64) -> Self {
        Self {
            api,
            max_results,
            freshness_days,
        }
    }

    /// Rolling freshness window ending today.
    fn freshness_window(&self) -> String {
        let today = Utc::now().date_naive();
        let start = today - Duration::days(self.freshness_days);
        format!("{}to{}", start.format("%Y-%m-%d"), today.format("%Y-%m-%d"))
    }

    /// Query the backend, then drop non-HTTPS results, deduplicate by
    /// normalized URL, score each by domain credibility, and sort
    /// best-first.
    pub async fn search(&self, query: &str) -> Result<Vec<Candidate>, CurationError> {
        let raw = self
            .api
            .search(query, &self.freshness_window(), self.max_results)
            .await?;
        tracing::debug!(query, results = raw.len(), "search returned");

        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        for result in raw {
            if !result.url.starts_with("https://") {
                continue;
            }
            if !seen.insert(normalize_url(&result.url)) {
                continue;
            }
            let publisher = Url::parse(&result.url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
                .unwrap_or_default();
            candidates.push(Candidate {
                credibility: score_url(&result.url),
                title: result.title,
                url: result.url,
                description: result.description,
                publisher,
            });
        }

        candidates.sort_by(|a, b| {
            b.credibility
                .total_cmp(&a.credibility)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(candidates)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedSearch(Vec<RawSearchResult>);

    #[async_trait]
    impl SearchApi for CannedSearch {
        async fn search(
            &self,
            _query: &str,
            _freshness: &str,
            _count: usize,
        ) -> Result<Vec<RawSearchResult>, CurationError> {
            Ok(self.0.clone())
        }
    }

    fn raw(title: &str, url: &str, description: &str) -> RawSearchResult {
        RawSearchResult {
            title: title.to_string(),
            url: url.to_string(),
            description: description.to_string(),
        }
    }

    fn gateway(results: Vec<RawSearchResult>) -> SearchGateway {
        SearchGateway::new(Arc::new(CannedSearch(results)), 20, 730)
    }

    #[test]
    fn normalize_url_lowercases_and_strips_slash() {
        assert_eq!(
            normalize_url("https://Example.com/Path/"),
            "https://example.com/path"
        );
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
    }

    #[tokio::test]
    async fn drops_non_https_results() {
        let gw = gateway(vec![
            raw("Plain HTTP guide", "http://example.com/guide", "insecure"),
            raw("Secure guide", "https://example.com/guide", "secure"),
        ]);
        let candidates = gw.search("anything").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://example.com/guide");
    }

    #[tokio::test]
    async fn dedups_by_normalized_url() {
        let gw = gateway(vec![
            raw("First", "https://example.com/page/", "one"),
            raw("Second", "https://EXAMPLE.com/page", "two"),
        ]);
        let candidates = gw.search("anything").await.unwrap();
        assert_eq!(candidates.len(), 1, "trailing slash and case are the same URL");
    }

    #[tokio::test]
    async fn sorts_by_credibility_descending() {
        let gw = gateway(vec![
            raw("Some blog post on loans", "https://randomblog.net/loans", "…"),
            raw("IRS retirement topics", "https://www.irs.gov/retirement", "…"),
            raw("Nerdwallet lender picks", "https://www.nerdwallet.com/lenders", "…"),
        ]);
        let candidates = gw.search("anything").await.unwrap();
        let scores: Vec<f32> = candidates.iter().map(|c| c.credibility).collect();
        assert_eq!(scores, vec![1.0, 0.85, 0.5]);
    }

    #[tokio::test]
    async fn publisher_is_host_without_www() {
        let gw = gateway(vec![raw(
            "Bankrate mortgage rates",
            "https://www.bankrate.com/mortgages/rates",
            "…",
        )]);
        let candidates = gw.search("anything").await.unwrap();
        assert_eq!(candidates[0].publisher, "bankrate.com");
    }

    #[test]
    fn freshness_window_spans_configured_days() {
        let gw = gateway(vec![]);
        let window = gw.freshness_window();
        let (start, end) = window.split_once("to").unwrap();
        let start: chrono::NaiveDate = start.parse().unwrap();
        let end: chrono::NaiveDate = end.parse().unwrap();
        assert_eq!((end - start).num_days(), 730);
    }
}
