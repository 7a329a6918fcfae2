// src/subject.rs
//! Subject keys: the case-insensitive name every registry, timeline and
//! subscription lookup is keyed by.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Normalized subject name: trimmed, lowercased, inner whitespace collapsed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
    /// Normalize `name` into a key. Blank names are rejected.
    pub fn parse(name: &str) -> Result<Self> {
        static RE_WS: OnceCell<Regex> = OnceCell::new();
        let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));

        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(TrackerError::Validation(
                "subject name must not be blank".to_string(),
            ));
        }
        let collapsed = re_ws.replace_all(trimmed, " ");
        Ok(Self(collapsed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the key has more than one word.
    pub fn is_phrase(&self) -> bool {
        self.0.contains(' ')
    }

    /// URL-path friendly form, used for placeholder links.
    pub fn slug(&self) -> String {
        self.0.replace(' ', "-")
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SubjectKey {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for SubjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
