// src/retrieval/mod.rs
//! Retrieval Adapter: turns a query into validated [`Article`]s for one subject.
//!
//! The external source is behind [`NewsSource`]. Calls are time-bounded; any
//! failure (including a missing API key) is replaced by a small deterministic
//! placeholder set unless the fallback is switched off.

pub mod newsapi;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::article::{clean_text, is_blank_or_removed, Article, REMOVED_MARKER, REMOVED_URL};
use crate::error::RetrievalError;
use crate::subject::SubjectKey;

pub use newsapi::NewsApiSource;

/// Most recent items requested per fetch.
pub const PAGE_SIZE: u32 = 25;
/// Language every fetch is restricted to.
pub const LANGUAGE: &str = "en";

/// One item as the source returns it. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    #[serde(default)]
    pub source: Option<RawSource>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// External article source: query (+ optional lower time bound) to raw items.
#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn search(
        &self,
        query: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawArticle>, RetrievalError>;

    fn name(&self) -> &'static str;
}

/// Shared handle to a source.
pub type DynNewsSource = Arc<dyn NewsSource>;

#[derive(Clone)]
pub struct RetrievalAdapter {
    source: DynNewsSource,
    timeout: Duration,
    fallback: bool,
}

impl RetrievalAdapter {
    pub fn new(source: DynNewsSource, timeout: Duration, fallback: bool) -> Self {
        Self {
            source,
            timeout,
            fallback,
        }
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback
    }

    /// Fetch and normalize. With the fallback on this never returns `Err`.
    pub async fn fetch(
        &self,
        subject: &SubjectKey,
        query: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Article>, RetrievalError> {
        let t0 = Instant::now();
        let res = match tokio::time::timeout(self.timeout, self.source.search(query, since)).await
        {
            Ok(r) => r,
            Err(_) => Err(RetrievalError::Timeout(self.timeout)),
        };
        histogram!("tracker_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        match res {
            Ok(raw) => {
                let total = raw.len();
                let articles: Vec<Article> = raw
                    .into_iter()
                    .filter_map(|r| normalize_raw(r, subject))
                    .collect();
                tracing::debug!(
                    target: "retrieval",
                    subject = %subject,
                    source = self.source.name(),
                    %query,
                    total,
                    kept = articles.len(),
                    "fetched"
                );
                Ok(articles)
            }
            Err(e) if self.fallback => {
                tracing::warn!(
                    target: "retrieval",
                    subject = %subject,
                    source = self.source.name(),
                    error = %e,
                    "retrieval failed, serving placeholder articles"
                );
                counter!("tracker_retrieval_fallback_total").increment(1);
                Ok(placeholder_articles(subject, Utc::now()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Map a raw item into an [`Article`], or drop it when a required field is
/// missing or carries a removal marker.
pub fn normalize_raw(raw: RawArticle, subject: &SubjectKey) -> Option<Article> {
    let title = clean_text(raw.title.as_deref()?);
    if is_blank_or_removed(&title) {
        return None;
    }

    let description = match raw.description.as_deref().map(clean_text) {
        Some(d) if d == REMOVED_MARKER => return None,
        Some(d) if d.is_empty() => None,
        other => other,
    };

    let url = raw.url?.trim().to_string();
    if is_blank_or_removed(&url) || url == REMOVED_URL {
        return None;
    }

    let published_at = DateTime::parse_from_rfc3339(raw.published_at.as_deref()?.trim())
        .ok()?
        .with_timezone(&Utc);

    let source = raw
        .source
        .and_then(|s| s.name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let url_to_image = raw
        .url_to_image
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let article = Article {
        id: url.clone(),
        title,
        description,
        url,
        url_to_image,
        published_at,
        source,
        subject: subject.clone(),
    };
    article.is_valid().then_some(article)
}

/// Deterministic stand-in used when retrieval fails: two articles, one at
/// `now` and one 30 minutes earlier, identified by stable URLs.
pub fn placeholder_articles(subject: &SubjectKey, now: DateTime<Utc>) -> Vec<Article> {
    let slug = subject.slug();
    let url1 = format!("https://example.com/news/{slug}/1");
    let url2 = format!("https://example.com/news/{slug}/2");
    vec![
        Article {
            id: url1.clone(),
            title: format!("Breaking: Major development in {subject}"),
            description: Some(format!(
                "Latest updates on {subject} situation with significant implications..."
            )),
            url: url1,
            url_to_image: Some("https://via.placeholder.com/400x200?text=News+Image".into()),
            published_at: now,
            source: "Mock News".into(),
            subject: subject.clone(),
        },
        Article {
            id: url2.clone(),
            title: format!("Analysis: Understanding the {subject} situation"),
            description: Some(format!(
                "Expert analysis provides insight into the ongoing {subject} developments..."
            )),
            url: url2,
            url_to_image: Some("https://via.placeholder.com/400x200?text=Analysis".into()),
            published_at: now - chrono::Duration::minutes(30),
            source: "Mock Analysis".into(),
            subject: subject.clone(),
        },
    ]
}
