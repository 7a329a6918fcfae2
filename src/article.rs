// src/article.rs
//! Article entity and the text cleanup applied to everything a source returns.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::subject::SubjectKey;

/// Marker NewsAPI puts into title/description of withdrawn items.
pub const REMOVED_MARKER: &str = "[Removed]";
/// URL NewsAPI substitutes for withdrawn items.
pub const REMOVED_URL: &str = "https://removed.com";
/// Source-name prefix carried by placeholder articles.
pub const PLACEHOLDER_SOURCE_PREFIX: &str = "Mock ";

/// One news item in a subject's timeline. `id` is the canonical URL and is the
/// dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub url_to_image: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub subject: SubjectKey,
}

impl Article {
    /// Identifier, title, URL and timestamp must all be present and real.
    pub fn is_valid(&self) -> bool {
        !is_blank_or_removed(&self.id)
            && !is_blank_or_removed(&self.title)
            && !is_blank_or_removed(&self.url)
            && self.url != REMOVED_URL
            && self.published_at.timestamp() > 0
    }

    /// Synthetic article produced by the retrieval fallback.
    pub fn is_placeholder(&self) -> bool {
        self.source.starts_with(PLACEHOLDER_SOURCE_PREFIX)
    }
}

pub(crate) fn is_blank_or_removed(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || t == REMOVED_MARKER
}

/// Decode HTML entities, strip tags and collapse whitespace.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let decoded = html_escape::decode_html_entities(s);

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let stripped = re_tags.replace_all(&decoded, "");

    // 3) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&stripped, " ").trim().to_string()
}
