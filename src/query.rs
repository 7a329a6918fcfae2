// src/query.rs
//! Maps a subject to the query string sent to the news source.
//!
//! Precedence: a user-supplied custom query is returned verbatim; multi-word
//! subjects become an exact phrase; single words go through the expansion
//! table and fall back to a quoted phrase.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::subject::SubjectKey;

/// Built-in single-word expansions.
static EXPANSIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("tesla", "tesla"),
        ("ai", "artificial intelligence"),
        ("palestine", "palestine"),
        ("bitcoin", "bitcoin cryptocurrency"),
        ("climate", "climate change"),
        ("covid", "covid coronavirus"),
        ("ukraine", "ukraine"),
        ("apple", "apple iphone"),
        ("google", "google"),
        ("meta", "meta facebook"),
        ("liverpool", "liverpool fc"),
        ("muslims", "muslim islam"),
    ])
});

/// Query builder with optional extra expansions layered over the built-ins.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    extra: BTreeMap<String, String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra expansions win over the built-in table. Keys are normalized.
    pub fn with_expansions(extra: &BTreeMap<String, String>) -> Self {
        let extra = extra
            .iter()
            .filter_map(|(k, v)| {
                let key = SubjectKey::parse(k).ok()?;
                let val = v.trim();
                (!val.is_empty()).then(|| (key.as_str().to_string(), val.to_string()))
            })
            .collect();
        Self { extra }
    }

    /// Build the query for a raw subject name.
    pub fn build_query(&self, name: &str, custom_query: Option<&str>) -> Result<String> {
        if let Some(q) = custom_query {
            return Ok(q.to_string());
        }
        let key = SubjectKey::parse(name)?;
        Ok(self.build(&key, None))
    }

    /// Build the query for an already-normalized key.
    pub fn build(&self, key: &SubjectKey, custom_query: Option<&str>) -> String {
        if let Some(q) = custom_query {
            return q.to_string();
        }
        if key.is_phrase() {
            return quoted(key.as_str());
        }
        if let Some(q) = self.extra.get(key.as_str()) {
            return q.clone();
        }
        match EXPANSIONS.get(key.as_str()) {
            Some(q) => (*q).to_string(),
            None => quoted(key.as_str()),
        }
    }
}

fn quoted(s: &str) -> String {
    format!("\"{s}\"")
}
