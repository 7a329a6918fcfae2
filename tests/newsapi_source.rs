// tests/newsapi_source.rs
//
// NewsAPI `/v2/everything` client against a wiremock server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use subject_news_tracker::retrieval::RetrievalAdapter;
use subject_news_tracker::{NewsApiSource, NewsSource, RetrievalError, SubjectKey};

const FIXTURE: &str = include_str!("fixtures/newsapi_everything.json");

fn source(server: &MockServer) -> NewsApiSource {
    NewsApiSource::new(server.uri(), Some("test-key".into()), Duration::from_secs(2))
}

#[tokio::test]
async fn search_sends_expected_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(header("X-Api-Key", "test-key"))
        .and(query_param("q", "tesla"))
        .and(query_param("sortBy", "publishedAt"))
        .and(query_param("pageSize", "25"))
        .and(query_param("language", "en"))
        .and(query_param_is_missing("from"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(1)
        .mount(&server)
        .await;

    let raw = source(&server).search("tesla", None).await.unwrap();
    assert_eq!(raw.len(), 4);
}

#[tokio::test]
async fn since_bound_is_sent_as_rfc3339() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(query_param("from", "2025-06-01T12:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(1)
        .mount(&server)
        .await;

    let since = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    source(&server).search("tesla", Some(since)).await.unwrap();
}

#[tokio::test]
async fn adapter_normalizes_and_drops_unusable_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .mount(&server)
        .await;

    let adapter = RetrievalAdapter::new(Arc::new(source(&server)), Duration::from_secs(2), false);
    let key = SubjectKey::parse("tesla").unwrap();
    let articles = adapter.fetch(&key, "tesla", None).await.unwrap();

    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].title, "Tesla & SpaceX executives meet regulators");
    assert_eq!(
        articles[0].description.as_deref(),
        Some("Talks focused on autonomy rules.")
    );
    assert_eq!(articles[0].source, "Reuters");
    assert_eq!(articles[1].description, None);
    assert!(articles.iter().all(|a| a.id == a.url && a.subject == key));
}

#[tokio::test]
async fn api_error_body_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#,
        ))
        .mount(&server)
        .await;

    let err = source(&server).search("tesla", None).await.unwrap_err();
    match err {
        RetrievalError::Api { code, .. } => assert_eq!(code, "apiKeyInvalid"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn non_ok_status_field_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"status":"error","code":"rateLimited","message":"Too many requests."}"#,
        ))
        .mount(&server)
        .await;

    let err = source(&server).search("tesla", None).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Api { ref code, .. } if code == "rateLimited"));
}

#[tokio::test]
async fn plain_server_error_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = source(&server).search("tesla", None).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Status { status: 502, .. }));
}

#[tokio::test]
async fn garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let err = source(&server).search("tesla", None).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Decode(_)));
}

#[tokio::test]
async fn missing_key_never_hits_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(0)
        .mount(&server)
        .await;

    let src = NewsApiSource::new(server.uri(), None, Duration::from_secs(2));
    let err = src.search("tesla", None).await.unwrap_err();
    assert!(matches!(err, RetrievalError::MissingCredential));
}
