// src/timeline.rs
//! # Timeline Cache
//! Per-subject bounded store of articles, newest first.
//!
//! Invariants after every mutation: no two entries share an `id`, entries are
//! ordered by `published_at` descending, and there are at most
//! [`MAX_TIMELINE_LEN`] entries.

use std::collections::{HashMap, HashSet};

use crate::article::Article;
use crate::subject::SubjectKey;

pub const MAX_TIMELINE_LEN: usize = 100;

/// Ordered article history of one subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    articles: Vec<Article>,
}

/// Result of merging a fetched batch into a timeline.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Articles of the batch whose id was not in the timeline before, newest first.
    pub added: Vec<Article>,
    /// Timeline length after the merge.
    pub len: usize,
}

impl MergeOutcome {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    pub fn latest(&self) -> Option<&Article> {
        self.added.first()
    }
}

impl Timeline {
    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Put `incoming` ahead of the current entries, keep the first copy of each
    /// id (so a re-fetched article replaces the cached one), sort and truncate.
    pub fn merge(&mut self, incoming: Vec<Article>) -> MergeOutcome {
        let prior: HashSet<&str> = self.articles.iter().map(|a| a.id.as_str()).collect();

        let mut seen_new = HashSet::new();
        let mut added: Vec<Article> = incoming
            .iter()
            .filter(|a| a.is_valid())
            .filter(|&a| !prior.contains(a.id.as_str()) && seen_new.insert(a.id.as_str()))
            .cloned()
            .collect();
        sort_newest_first(&mut added);

        let existing = std::mem::take(&mut self.articles);
        self.articles = normalize(incoming.into_iter().chain(existing));

        MergeOutcome {
            added,
            len: self.articles.len(),
        }
    }

    /// Discard prior state and keep only `articles` (deduplicated, sorted, capped).
    pub fn replace(&mut self, articles: Vec<Article>) {
        self.articles = normalize(articles.into_iter());
    }
}

fn normalize(items: impl Iterator<Item = Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut out: Vec<Article> = items
        .filter(|a| a.is_valid())
        .filter(|a| seen.insert(a.id.clone()))
        .collect();
    sort_newest_first(&mut out);
    out.truncate(MAX_TIMELINE_LEN);
    out
}

/// Stable, so equal timestamps keep their merge order.
fn sort_newest_first(items: &mut [Article]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

/// Timelines of every tracked subject.
#[derive(Debug, Default)]
pub struct TimelineCache {
    timelines: HashMap<SubjectKey, Timeline>,
}

impl TimelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty timeline if none exists yet.
    pub fn ensure(&mut self, key: &SubjectKey) {
        self.timelines.entry(key.clone()).or_default();
    }

    pub fn remove(&mut self, key: &SubjectKey) -> Option<Timeline> {
        self.timelines.remove(key)
    }

    pub fn contains(&self, key: &SubjectKey) -> bool {
        self.timelines.contains_key(key)
    }

    pub fn merge(&mut self, key: &SubjectKey, incoming: Vec<Article>) -> MergeOutcome {
        self.timelines.entry(key.clone()).or_default().merge(incoming)
    }

    pub fn replace(&mut self, key: &SubjectKey, articles: Vec<Article>) -> &Timeline {
        let tl = self.timelines.entry(key.clone()).or_default();
        tl.replace(articles);
        tl
    }

    /// Cloned snapshot; empty when the subject is untracked.
    pub fn get(&self, key: &SubjectKey) -> Vec<Article> {
        self.timelines
            .get(key)
            .map(|t| t.articles.clone())
            .unwrap_or_default()
    }

    pub fn len_of(&self, key: &SubjectKey) -> usize {
        self.timelines.get(key).map(Timeline::len).unwrap_or(0)
    }
}
