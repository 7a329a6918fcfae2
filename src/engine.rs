//! # Tracking Engine
//! Owns the registry and the timeline cache behind one lock and exposes the
//! operations the request layer and the scheduler call.
//!
//! Concurrency rules:
//! - registry and timelines change together under a single `RwLock`, so a
//!   reader never sees a half-applied merge;
//! - every fetch+merge/replace of one subject holds that subject's async
//!   refresh lock, so a scheduled refresh and a manual one queue up instead
//!   of interleaving. The lock outlives a removal while anyone holds or waits
//!   on it, and a refresh started under an earlier registration discards its
//!   result;
//! - only one scheduled cycle runs at a time; an overlapping call is skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::config::{key_fingerprint, TrackerConfig};
use crate::error::{Result, TrackerError};
use crate::notify::{ListenerId, NewsAlert, Notifier};
use crate::query::QueryBuilder;
use crate::registry::{Registration, Registry};
use crate::retrieval::{DynNewsSource, NewsApiSource, RetrievalAdapter};
use crate::subject::SubjectKey;
use crate::timeline::TimelineCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub fetch_timeout: Duration,
    pub delivery_timeout: Duration,
    pub retrieval_fallback: bool,
    pub cycle_concurrency: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        TrackerConfig::default().engine_options()
    }
}

/// Snapshot of one tracked subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectInfo {
    pub subject: SubjectKey,
    pub registered_at: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,
    pub custom_query: Option<String>,
    pub article_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub subject: SubjectKey,
    pub article_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    pub total_subjects: usize,
    pub subjects: Vec<SubjectStats>,
}

/// Tally of one scheduled cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Subjects in the registry snapshot taken at cycle start.
    pub subjects: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub new_articles: usize,
    /// Subjects for which an alert was published.
    pub alerts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// A previous cycle was still in flight.
    Skipped,
}

type RefreshLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Default)]
struct State {
    registry: Registry,
    timelines: TimelineCache,
    refresh_locks: HashMap<SubjectKey, RefreshLock>,
}

impl State {
    /// Forget the refresh lock of an untracked subject once nobody holds or
    /// waits on it.
    fn prune_refresh_lock(&mut self, key: &SubjectKey) {
        if self.registry.contains(key) {
            return;
        }
        let idle = self
            .refresh_locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            self.refresh_locks.remove(key);
        }
    }

    /// `(generation, last_checked, custom_query)` of the current registration.
    fn snapshot(&self, key: &SubjectKey) -> Option<(u64, DateTime<Utc>, Option<String>)> {
        self.registry
            .get(key)
            .map(|e| (e.generation, e.last_checked, e.custom_query.clone()))
    }
}

/// Result of one incremental refresh.
#[derive(Debug, Default)]
struct RefreshDelta {
    added: usize,
    alerted: bool,
}

pub struct Engine {
    state: RwLock<State>,
    retrieval: RetrievalAdapter,
    queries: QueryBuilder,
    notifier: Arc<Notifier>,
    cycle_running: AtomicBool,
    cycle_concurrency: usize,
}

impl Engine {
    pub fn new(source: DynNewsSource, options: EngineOptions) -> Self {
        Self {
            state: RwLock::new(State::default()),
            retrieval: RetrievalAdapter::new(
                source,
                options.fetch_timeout,
                options.retrieval_fallback,
            ),
            queries: QueryBuilder::new(),
            notifier: Arc::new(Notifier::new(options.delivery_timeout)),
            cycle_running: AtomicBool::new(false),
            cycle_concurrency: options.cycle_concurrency.max(1),
        }
    }

    /// Engine wired to NewsAPI as configured.
    pub fn from_config(cfg: &TrackerConfig) -> Self {
        match cfg.news_api_key.as_deref() {
            Some(key) => info!(
                target: "engine",
                key_fp = %key_fingerprint(key),
                base_url = %cfg.news_api_base_url,
                "news API key configured"
            ),
            None => warn!(
                target: "engine",
                "NEWS_API_KEY not set; timelines will hold placeholder articles"
            ),
        }
        let source = NewsApiSource::new(
            cfg.news_api_base_url.clone(),
            cfg.news_api_key.clone(),
            cfg.fetch_timeout,
        );
        Self::new(Arc::new(source), cfg.engine_options())
            .with_query_builder(QueryBuilder::with_expansions(&cfg.expansions))
    }

    pub fn with_query_builder(mut self, queries: QueryBuilder) -> Self {
        self.queries = queries;
        self
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` when the subject is not tracked.
    fn refresh_lock(&self, key: &SubjectKey) -> Option<RefreshLock> {
        let st = self.read();
        if !st.registry.contains(key) {
            return None;
        }
        st.refresh_locks.get(key).map(Arc::clone)
    }

    /* ----------------------------
    Registry operations
    ---------------------------- */

    pub fn list_subjects(&self) -> Vec<SubjectKey> {
        self.read().registry.list()
    }

    /// Idempotent registration. Does not fetch; see [`Engine::refresh_now`].
    pub fn add_subject(&self, name: &str, custom_query: Option<&str>) -> Result<SubjectKey> {
        let key = SubjectKey::parse(name)?;
        let (created, total) = {
            let mut st = self.write();
            let reg = st.registry.register(&key, custom_query, Utc::now());
            st.timelines.ensure(&key);
            st.refresh_locks.entry(key.clone()).or_default();
            (reg == Registration::Created, st.registry.len())
        };
        gauge!("tracker_subjects").set(total as f64);
        if created {
            info!(target: "engine", subject = %key, "started tracking");
        } else {
            debug!(target: "engine", subject = %key, "already tracked");
        }
        Ok(key)
    }

    /// Drops the subject, its timeline and its subscriptions. Untracked or
    /// blank names are a no-op.
    pub fn remove_subject(&self, name: &str) {
        let Ok(key) = SubjectKey::parse(name) else {
            return;
        };
        let (removed, total) = {
            let mut st = self.write();
            let removed = st.registry.unregister(&key).is_some();
            st.timelines.remove(&key);
            st.prune_refresh_lock(&key);
            (removed, st.registry.len())
        };
        self.notifier.clear_subject(&key);
        gauge!("tracker_subjects").set(total as f64);
        if removed {
            info!(target: "engine", subject = %key, "stopped tracking");
        }
    }

    /// `false` when the subject is not tracked.
    pub fn set_custom_query(&self, name: &str, query: &str) -> bool {
        let Ok(key) = SubjectKey::parse(name) else {
            return false;
        };
        match self.write().registry.set_custom_query(&key, query) {
            Ok(()) => {
                info!(target: "engine", subject = %key, "custom query updated");
                true
            }
            Err(_) => false,
        }
    }

    pub fn custom_query(&self, name: &str) -> Option<String> {
        let key = SubjectKey::parse(name).ok()?;
        self.read().registry.get(&key)?.custom_query.clone()
    }

    /// Query the next fetch for `name` would send.
    pub fn query_for(&self, name: &str) -> Result<String> {
        let key = SubjectKey::parse(name)?;
        let custom = self.custom_query(key.as_str());
        Ok(self.queries.build(&key, custom.as_deref()))
    }

    pub fn subject(&self, name: &str) -> Option<SubjectInfo> {
        let key = SubjectKey::parse(name).ok()?;
        let st = self.read();
        let entry = st.registry.get(&key)?;
        Some(SubjectInfo {
            subject: key.clone(),
            registered_at: entry.registered_at,
            last_checked: entry.last_checked,
            custom_query: entry.custom_query.clone(),
            article_count: st.timelines.len_of(&key),
        })
    }

    /* ----------------------------
    Timeline reads
    ---------------------------- */

    /// Current timeline, newest first; empty when untracked.
    pub fn get_timeline(&self, name: &str) -> Vec<Article> {
        match SubjectKey::parse(name) {
            Ok(key) => self.read().timelines.get(&key),
            Err(_) => Vec::new(),
        }
    }

    pub fn stats(&self) -> TrackerStats {
        let st = self.read();
        let subjects: Vec<SubjectStats> = st
            .registry
            .entries()
            .map(|(key, _)| SubjectStats {
                subject: key.clone(),
                article_count: st.timelines.len_of(key),
            })
            .collect();
        TrackerStats {
            total_subjects: subjects.len(),
            subjects,
        }
    }

    /* ----------------------------
    Subscriptions
    ---------------------------- */

    /// Returns false when `id` is not attached to the notifier.
    pub fn subscribe(&self, id: ListenerId, name: &str) -> Result<bool> {
        let key = SubjectKey::parse(name)?;
        Ok(self.notifier.subscribe(id, &key))
    }

    pub fn unsubscribe(&self, id: ListenerId, name: &str) -> Result<()> {
        let key = SubjectKey::parse(name)?;
        self.notifier.unsubscribe(id, &key);
        Ok(())
    }

    /* ----------------------------
    Refresh
    ---------------------------- */

    /// Full fetch (no `since` bound) that replaces the subject's timeline.
    /// Used for the initial load after registration and manual refreshes.
    pub async fn refresh_now(&self, name: &str) -> Result<Vec<Article>> {
        let key = SubjectKey::parse(name)?;
        let lock = self
            .refresh_lock(&key)
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))?;
        let guard = lock.lock_owned().await;
        let res = self.replace_from_source(&key).await;
        drop(guard);
        self.write().prune_refresh_lock(&key);
        res
    }

    async fn replace_from_source(&self, key: &SubjectKey) -> Result<Vec<Article>> {
        let (generation, _, custom) = self
            .read()
            .snapshot(key)
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))?;

        let started = Utc::now();
        let query = self.queries.build(key, custom.as_deref());
        let articles = self.retrieval.fetch(key, &query, None).await?;

        let timeline = {
            let mut st = self.write();
            if st.registry.generation(key) != Some(generation) {
                return Err(TrackerError::NotFound(key.to_string()));
            }
            let timeline = st.timelines.replace(key, articles).articles().to_vec();
            st.registry.advance_last_checked(key, started);
            timeline
        };

        info!(
            target: "engine",
            subject = %key,
            %query,
            articles = timeline.len(),
            "timeline replaced"
        );
        Ok(timeline)
    }

    pub fn is_cycle_running(&self) -> bool {
        self.cycle_running.load(Ordering::Acquire)
    }

    /// One pass over every subject tracked at cycle start. Safe to call with
    /// no subjects; skipped when another cycle is still running.
    pub async fn run_scheduled_cycle(&self) -> CycleOutcome {
        let Some(_running) = CycleGuard::acquire(&self.cycle_running) else {
            counter!("tracker_cycles_skipped_total").increment(1);
            info!(target: "scheduler", "previous cycle still running, tick skipped");
            return CycleOutcome::Skipped;
        };

        let started_at = Utc::now();
        let subjects = self.list_subjects();
        counter!("tracker_cycles_total").increment(1);
        debug!(target: "scheduler", subjects = subjects.len(), "cycle started");

        let total = subjects.len();
        let results: Vec<(SubjectKey, Result<RefreshDelta>)> = stream::iter(subjects)
            .map(|key| async move {
                let res = self.refresh_incremental(&key, started_at).await;
                (key, res)
            })
            .buffer_unordered(self.cycle_concurrency)
            .collect()
            .await;

        let mut report = CycleReport {
            started_at,
            subjects: total,
            refreshed: 0,
            failed: 0,
            new_articles: 0,
            alerts: 0,
        };
        for (key, res) in results {
            match res {
                Ok(delta) => {
                    report.refreshed += 1;
                    report.new_articles += delta.added;
                    report.alerts += usize::from(delta.alerted);
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("tracker_refresh_failures_total").increment(1);
                    warn!(target: "scheduler", subject = %key, error = %e, "refresh failed");
                }
            }
        }

        info!(
            target: "scheduler",
            subjects = report.subjects,
            refreshed = report.refreshed,
            failed = report.failed,
            new_articles = report.new_articles,
            alerts = report.alerts,
            "cycle finished"
        );
        CycleOutcome::Completed(report)
    }

    /// Fetch everything since `last_checked`, merge, advance the bound to
    /// `cycle_start` and publish an alert when something new arrived. On
    /// error nothing is changed so the same window is retried next cycle.
    async fn refresh_incremental(
        &self,
        key: &SubjectKey,
        cycle_start: DateTime<Utc>,
    ) -> Result<RefreshDelta> {
        // removed after the cycle snapshot was taken
        let Some(lock) = self.refresh_lock(key) else {
            return Ok(RefreshDelta::default());
        };
        let guard = lock.lock_owned().await;
        let res = self.merge_from_source(key, cycle_start).await;
        drop(guard);
        self.write().prune_refresh_lock(key);
        res
    }

    async fn merge_from_source(
        &self,
        key: &SubjectKey,
        cycle_start: DateTime<Utc>,
    ) -> Result<RefreshDelta> {
        let snapshot = self.read().snapshot(key);
        let Some((generation, since, custom)) = snapshot else {
            return Ok(RefreshDelta::default());
        };

        let query = self.queries.build(key, custom.as_deref());
        let fetched = self.retrieval.fetch(key, &query, Some(since)).await?;

        let outcome = {
            let mut st = self.write();
            if st.registry.generation(key) != Some(generation) {
                return Ok(RefreshDelta::default());
            }
            let outcome = st.timelines.merge(key, fetched);
            st.registry.advance_last_checked(key, cycle_start);
            outcome
        };

        let added = outcome.added_count();
        if added == 0 {
            debug!(target: "scheduler", subject = %key, "no new articles");
            return Ok(RefreshDelta::default());
        }

        counter!("tracker_articles_added_total").increment(added as u64);
        let listeners = NewsAlert::from_added(key, &outcome.added)
            .map(|alert| self.notifier.publish(key, alert))
            .unwrap_or_default();
        info!(
            target: "scheduler",
            subject = %key,
            added,
            timeline = outcome.len,
            listeners,
            "new articles"
        );
        Ok(RefreshDelta {
            added,
            alerted: true,
        })
    }
}

/// Idle/Running flag for scheduled cycles; resets on drop.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
