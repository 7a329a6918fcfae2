// src/registry.rs
//! Subject Registry: the authoritative set of tracked subjects with their
//! last-checked instant and optional custom query.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, TrackerError};
use crate::subject::SubjectKey;

/// Registry record of one tracked subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectEntry {
    pub registered_at: DateTime<Utc>,
    /// Lower bound (`since`) for the next incremental fetch.
    pub last_checked: DateTime<Utc>,
    pub custom_query: Option<String>,
    /// Distinguishes this registration from earlier ones of the same key.
    #[serde(skip)]
    pub generation: u64,
}

/// Whether `register` created the subject or found it already tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Existing,
}

#[derive(Debug, Default)]
pub struct Registry {
    subjects: BTreeMap<SubjectKey, SubjectEntry>,
    next_generation: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent. A supplied custom query replaces any previous one, for new
    /// and existing subjects alike; an all-blank one clears it.
    pub fn register(
        &mut self,
        key: &SubjectKey,
        custom_query: Option<&str>,
        now: DateTime<Utc>,
    ) -> Registration {
        let mut outcome = Registration::Existing;
        let next_generation = &mut self.next_generation;
        let entry = self.subjects.entry(key.clone()).or_insert_with(|| {
            outcome = Registration::Created;
            *next_generation += 1;
            SubjectEntry {
                registered_at: now,
                last_checked: now,
                custom_query: None,
                generation: *next_generation,
            }
        });
        if let Some(q) = custom_query {
            entry.custom_query = clean_query(q);
        }
        outcome
    }

    /// Returns the removed record; `None` when the subject was not tracked.
    pub fn unregister(&mut self, key: &SubjectKey) -> Option<SubjectEntry> {
        self.subjects.remove(key)
    }

    pub fn set_custom_query(&mut self, key: &SubjectKey, query: &str) -> Result<()> {
        let entry = self
            .subjects
            .get_mut(key)
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))?;
        entry.custom_query = clean_query(query);
        Ok(())
    }

    /// Move `last_checked` forward to `at`; never moves it backwards.
    pub fn advance_last_checked(&mut self, key: &SubjectKey, at: DateTime<Utc>) -> bool {
        match self.subjects.get_mut(key) {
            Some(entry) => {
                if at > entry.last_checked {
                    entry.last_checked = at;
                }
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &SubjectKey) -> Option<&SubjectEntry> {
        self.subjects.get(key)
    }

    /// Generation of the current registration of `key`.
    pub fn generation(&self, key: &SubjectKey) -> Option<u64> {
        self.subjects.get(key).map(|e| e.generation)
    }

    pub fn contains(&self, key: &SubjectKey) -> bool {
        self.subjects.contains_key(key)
    }

    /// Tracked keys in key order (stable for the life of the process).
    pub fn list(&self) -> Vec<SubjectKey> {
        self.subjects.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&SubjectKey, &SubjectEntry)> {
        self.subjects.iter()
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

/// Stored verbatim; only an all-blank query clears the override.
fn clean_query(q: &str) -> Option<String> {
    (!q.trim().is_empty()).then(|| q.to_string())
}
