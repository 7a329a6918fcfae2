// tests/fanout.rs
//
// Alert fan-out: per-subject routing, unsubscribe/detach, slow listeners and
// the webhook listener against a local mock server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{batch, engine, ScriptedSource, Step};
use subject_news_tracker::{ChannelListener, Listener, NewsAlert, WebhookListener};

struct Hanging;

#[async_trait::async_trait]
impl Listener for Hanging {
    async fn deliver(&self, _alert: &NewsAlert) -> Result<()> {
        futures::future::pending::<()>().await;
        Ok(())
    }
    fn kind(&self) -> &'static str {
        "hanging"
    }
}

#[tokio::test]
async fn alerts_reach_only_subscribers_of_that_subject() {
    let src = ScriptedSource::new();
    src.push("tesla", Step::Articles(batch(1, 2)));
    src.push("artificial intelligence", Step::Articles(batch(10, 1)));
    let e = engine(&src, true);
    e.add_subject("tesla", None).unwrap();
    e.add_subject("ai", None).unwrap();

    let (tesla_l, mut tesla_rx) = ChannelListener::pair(4);
    let (ai_l, mut ai_rx) = ChannelListener::pair(4);
    let tesla_id = e.notifier().attach(Arc::new(tesla_l));
    let ai_id = e.notifier().attach(Arc::new(ai_l));
    e.subscribe(tesla_id, "tesla").unwrap();
    e.subscribe(ai_id, "AI").unwrap();

    e.run_scheduled_cycle().await;

    let t = tokio::time::timeout(Duration::from_secs(1), tesla_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let a = tokio::time::timeout(Duration::from_secs(1), ai_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((t.subject.as_str(), t.count), ("tesla", 2));
    assert_eq!((a.subject.as_str(), a.count), ("ai", 1));
    assert!(tesla_rx.try_recv().is_err());
    assert!(ai_rx.try_recv().is_err());
}

#[tokio::test]
async fn unsubscribed_and_detached_listeners_get_nothing() {
    let src = ScriptedSource::new();
    src.push("tesla", Step::Articles(batch(1, 2)));
    let e = engine(&src, true);
    e.add_subject("tesla", None).unwrap();

    let (l1, mut rx1) = ChannelListener::pair(4);
    let (l2, mut rx2) = ChannelListener::pair(4);
    let id1 = e.notifier().attach(Arc::new(l1));
    let id2 = e.notifier().attach(Arc::new(l2));
    e.subscribe(id1, "tesla").unwrap();
    e.subscribe(id2, "tesla").unwrap();
    e.unsubscribe(id1, "tesla").unwrap();
    e.notifier().detach(id2);

    e.run_scheduled_cycle().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_err());
    assert_eq!(e.get_timeline("tesla").len(), 2);
}

#[tokio::test]
async fn hanging_listener_does_not_stall_the_cycle() {
    let src = ScriptedSource::new();
    src.push("tesla", Step::Articles(batch(1, 1)));
    let e = engine(&src, true);
    e.add_subject("tesla", None).unwrap();

    let stuck = e.notifier().attach(Arc::new(Hanging));
    let (l, mut rx) = ChannelListener::pair(4);
    let ok = e.notifier().attach(Arc::new(l));
    e.subscribe(stuck, "tesla").unwrap();
    e.subscribe(ok, "tesla").unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(1), e.run_scheduled_cycle())
        .await
        .expect("cycle does not wait for listeners");
    assert!(matches!(
        outcome,
        subject_news_tracker::CycleOutcome::Completed(_)
    ));
    let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.count, 1);
}

#[tokio::test]
async fn webhook_posts_alert_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(serde_json::json!({
            "event": "news-alert",
            "subject": "tesla",
            "count": 2
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let src = ScriptedSource::new();
    src.push("tesla", Step::Articles(batch(1, 2)));
    let e = engine(&src, true);
    e.add_subject("tesla", None).unwrap();
    let hook = WebhookListener::new(format!("{}/hook", server.uri()))
        .with_timeout(Duration::from_secs(2));
    let id = e.notifier().attach(Arc::new(hook));
    e.subscribe(id, "tesla").unwrap();

    e.run_scheduled_cycle().await;

    // delivery is asynchronous; poll the mock server
    for _ in 0..100 {
        if !server.received_requests().await.unwrap_or_default().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let reqs = server.received_requests().await.unwrap();
    assert_eq!(reqs.len(), 1);
    let body: Value = serde_json::from_slice(&reqs[0].body).unwrap();
    assert_eq!(body["latest"]["url"], "https://news.test/story/2");
    assert!(body["text"].as_str().unwrap().starts_with("2 new articles about tesla"));
}

#[tokio::test]
async fn webhook_retries_after_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let hook = WebhookListener::new(format!("{}/hook", server.uri()))
        .with_timeout(Duration::from_secs(2))
        .with_retries(2);
    let key = "tesla".parse().unwrap();
    let articles = subject_news_tracker::retrieval::placeholder_articles(&key, chrono::Utc::now());
    let alert = NewsAlert::from_added(&key, &articles).unwrap();

    hook.deliver(&alert).await.expect("second attempt succeeds");
}

#[tokio::test]
async fn webhook_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let hook = WebhookListener::new(format!("{}/hook", server.uri())).with_retries(2);
    let key = "ai".parse().unwrap();
    let articles = subject_news_tracker::retrieval::placeholder_articles(&key, chrono::Utc::now());
    let alert = NewsAlert::from_added(&key, &articles).unwrap();

    assert!(hook.deliver(&alert).await.is_err());
}
