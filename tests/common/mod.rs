// tests/common/mod.rs
// Scripted in-memory news source shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;

use subject_news_tracker::{
    Engine, EngineOptions, NewsSource, RawArticle, RetrievalError,
};
use subject_news_tracker::retrieval::RawSource;

pub enum Step {
    Articles(Vec<RawArticle>),
    Fail,
}

/// Answers per query from a queue of scripted steps; an exhausted queue
/// answers with no articles. Every call is recorded.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, Option<DateTime<Utc>>)>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every search waits for a permit from the returned semaphore.
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let src = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (Arc::new(src), gate)
    }

    pub fn push(&self, query: &str, step: Step) {
        self.scripts
            .lock()
            .unwrap()
            .entry(query.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn calls(&self) -> Vec<(String, Option<DateTime<Utc>>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, query: &str) -> Vec<Option<DateTime<Utc>>> {
        self.calls()
            .into_iter()
            .filter(|(q, _)| q == query)
            .map(|(_, since)| since)
            .collect()
    }
}

#[async_trait::async_trait]
impl NewsSource for ScriptedSource {
    async fn search(
        &self,
        query: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawArticle>, RetrievalError> {
        self.calls.lock().unwrap().push((query.to_string(), since));
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(query)
            .and_then(VecDeque::pop_front);
        match step {
            Some(Step::Articles(items)) => Ok(items),
            Some(Step::Fail) => Err(RetrievalError::Status {
                status: 503,
                body: "upstream unavailable".into(),
            }),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn options(fallback: bool) -> EngineOptions {
    EngineOptions {
        fetch_timeout: Duration::from_secs(5),
        delivery_timeout: Duration::from_millis(500),
        retrieval_fallback: fallback,
        cycle_concurrency: 4,
    }
}

pub fn engine(src: &Arc<ScriptedSource>, fallback: bool) -> Arc<Engine> {
    Arc::new(Engine::new(src.clone(), options(fallback)))
}

/// Fixed base instant; `minutes` offsets keep publication order obvious.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

pub fn raw(n: u32, minutes: i64) -> RawArticle {
    RawArticle {
        source: Some(RawSource {
            id: None,
            name: Some("Wire".into()),
        }),
        title: Some(format!("Story {n}")),
        description: Some(format!("Body of story {n}")),
        url: Some(format!("https://news.test/story/{n}")),
        url_to_image: None,
        published_at: Some(at(minutes).to_rfc3339()),
    }
}

/// `count` articles numbered from `first`, the highest number newest.
pub fn batch(first: u32, count: u32) -> Vec<RawArticle> {
    (first..first + count).map(|n| raw(n, n as i64)).collect()
}
