// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod article;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod query;
pub mod registry;
pub mod retrieval;
pub mod scheduler;
pub mod subject;
pub mod timeline;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::article::Article;
pub use crate::config::TrackerConfig;
pub use crate::engine::{CycleOutcome, CycleReport, Engine, EngineOptions};
pub use crate::error::{RetrievalError, TrackerError};
pub use crate::notify::{ChannelListener, Listener, ListenerId, NewsAlert, WebhookListener};
pub use crate::retrieval::{NewsApiSource, NewsSource, RawArticle};
pub use crate::scheduler::{PollingScheduler, SchedulerHandle};
pub use crate::subject::SubjectKey;
