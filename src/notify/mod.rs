// src/notify/mod.rs
//! Fan-out of "new articles" alerts to listeners subscribed per subject.
//!
//! Delivery is fire-and-forget: every listener gets its own task bounded by
//! the delivery timeout, so a slow or failing listener never holds up the
//! publisher or the other listeners.

pub mod channel;
pub mod webhook;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use metrics::counter;
use serde::Serialize;

use crate::article::Article;
use crate::subject::SubjectKey;

pub use channel::ChannelListener;
pub use webhook::WebhookListener;

/// Payload pushed to subscribers when a refresh found new articles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsAlert {
    pub subject: SubjectKey,
    pub count: usize,
    pub latest: Article,
    pub message: String,
}

impl NewsAlert {
    /// `None` when `added` is empty: nothing to announce.
    pub fn from_added(subject: &SubjectKey, added: &[Article]) -> Option<Self> {
        let latest = added.first()?.clone();
        let count = added.len();
        Some(Self {
            subject: subject.clone(),
            count,
            latest,
            message: format!(
                "{count} new article{} about {subject}",
                if count > 1 { "s" } else { "" }
            ),
        })
    }
}

/// A delivery endpoint (stream, webhook, ...).
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    async fn deliver(&self, alert: &NewsAlert) -> Result<()>;

    fn kind(&self) -> &'static str;

    /// Overrides the notifier-wide delivery timeout for this listener.
    fn delivery_budget(&self) -> Option<Duration> {
        None
    }
}

/// Opaque handle returned by [`Notifier::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Default)]
struct Inner {
    listeners: HashMap<ListenerId, Arc<dyn Listener>>,
    subscriptions: HashMap<SubjectKey, HashSet<ListenerId>>,
}

pub struct Notifier {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    delivery_timeout: Duration,
}

impl Notifier {
    pub fn new(delivery_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
            delivery_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a delivery endpoint; it receives nothing until subscribed.
    pub fn attach(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().listeners.insert(id, listener);
        tracing::debug!(target: "notify", listener = %id, "attached");
        id
    }

    /// Drop the endpoint and every subscription it holds.
    pub fn detach(&self, id: ListenerId) {
        let mut inner = self.lock();
        inner.listeners.remove(&id);
        inner.subscriptions.retain(|_, set| {
            set.remove(&id);
            !set.is_empty()
        });
        tracing::debug!(target: "notify", listener = %id, "detached");
    }

    /// Idempotent. Returns false when `id` is not attached.
    pub fn subscribe(&self, id: ListenerId, subject: &SubjectKey) -> bool {
        let mut inner = self.lock();
        if !inner.listeners.contains_key(&id) {
            return false;
        }
        inner
            .subscriptions
            .entry(subject.clone())
            .or_default()
            .insert(id);
        tracing::debug!(target: "notify", listener = %id, subject = %subject, "subscribed");
        true
    }

    /// Idempotent.
    pub fn unsubscribe(&self, id: ListenerId, subject: &SubjectKey) {
        let mut inner = self.lock();
        if let Some(set) = inner.subscriptions.get_mut(subject) {
            set.remove(&id);
            if set.is_empty() {
                inner.subscriptions.remove(subject);
            }
        }
    }

    /// Drop every subscription to `subject` (listeners stay attached).
    pub fn clear_subject(&self, subject: &SubjectKey) {
        self.lock().subscriptions.remove(subject);
    }

    pub fn subscribers(&self, subject: &SubjectKey) -> Vec<ListenerId> {
        let mut ids: Vec<ListenerId> = self
            .lock()
            .subscriptions
            .get(subject)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Dispatch `alert` to every current subscriber of `subject` and return
    /// how many deliveries were started. Must run inside a Tokio runtime.
    pub fn publish(&self, subject: &SubjectKey, alert: NewsAlert) -> usize {
        let targets: Vec<(ListenerId, Arc<dyn Listener>)> = {
            let inner = self.lock();
            match inner.subscriptions.get(subject) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| inner.listeners.get(id).map(|l| (*id, Arc::clone(l))))
                    .collect(),
                None => Vec::new(),
            }
        };
        if targets.is_empty() {
            return 0;
        }

        let alert = Arc::new(alert);
        for (id, listener) in &targets {
            let listener = Arc::clone(listener);
            let alert = Arc::clone(&alert);
            let id = *id;
            let timeout = listener.delivery_budget().unwrap_or(self.delivery_timeout);
            tokio::spawn(async move {
                match tokio::time::timeout(timeout, listener.deliver(&alert)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        counter!("tracker_alert_delivery_failures_total").increment(1);
                        tracing::warn!(
                            target: "notify",
                            listener = %id,
                            kind = listener.kind(),
                            subject = %alert.subject,
                            "delivery failed: {e:#}"
                        );
                    }
                    Err(_) => {
                        counter!("tracker_alert_delivery_failures_total").increment(1);
                        tracing::warn!(
                            target: "notify",
                            listener = %id,
                            kind = listener.kind(),
                            subject = %alert.subject,
                            ?timeout,
                            "delivery timed out"
                        );
                    }
                }
            });
        }
        counter!("tracker_alerts_published_total").increment(1);
        targets.len()
    }
}
