// src/error.rs
//! Error taxonomy shared by the registry, the engine and the retrieval layer.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The operation needs a tracked subject and this one is not tracked.
    #[error("subject not tracked: {0}")]
    NotFound(String),

    /// Blank or otherwise unusable input (e.g. an empty subject name).
    #[error("validation error: {0}")]
    Validation(String),

    /// Only surfaces when the placeholder fallback is switched off.
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("no news API key configured")]
    MissingCredential,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("news API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("news API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("malformed news API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("retrieval timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;
