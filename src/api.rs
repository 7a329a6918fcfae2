// src/api.rs
//! HTTP surface over the engine: subject management, timelines, stats and a
//! Server-Sent Events stream of alerts per subject.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::engine::Engine;
use crate::error::TrackerError;
use crate::notify::{ChannelListener, ListenerId, Notifier};
use crate::subject::SubjectKey;

/// Alerts buffered per SSE client before new ones are dropped.
const SSE_BUFFER: usize = 32;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/news/subjects", get(list_subjects).post(add_subject))
        .route(
            "/api/news/subjects/{subject}",
            get(subject_info).delete(remove_subject),
        )
        .route("/api/news/subjects/{subject}/query", put(set_query))
        .route("/api/news/timeline/{subject}", get(timeline))
        .route("/api/news/update/{subject}", post(update))
        .route("/api/news/stats", get(stats))
        .route("/api/news/events/{subject}", get(events))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Error body: `{"error": "..."}`.
pub struct ApiError(TrackerError);

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TrackerError::Validation(_) => StatusCode::BAD_REQUEST,
            TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::Retrieval(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::warn!(target: "api", error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now(),
        "subjects": state.engine.list_subjects().len(),
    }))
}

async fn list_subjects(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "subjects": state.engine.list_subjects() }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddSubjectReq {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    custom_query: Option<String>,
}

async fn add_subject(
    State(state): State<AppState>,
    Json(body): Json<AddSubjectReq>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = body
        .subject
        .ok_or_else(|| TrackerError::Validation("Subject is required".into()))?;
    let key = state
        .engine
        .add_subject(&name, body.custom_query.as_deref())?;
    let timeline = state.engine.refresh_now(key.as_str()).await?;
    Ok(Json(json!({
        "message": format!("Started tracking {key}"),
        "subject": key,
        "timeline": timeline,
    })))
}

async fn subject_info(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let info = state
        .engine
        .subject(&subject)
        .ok_or(TrackerError::NotFound(subject))?;
    Ok(Json(json!(info)))
}

async fn remove_subject(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Json<serde_json::Value> {
    state.engine.remove_subject(&subject);
    Json(json!({ "message": format!("Stopped tracking {subject}") }))
}

#[derive(Deserialize)]
struct SetQueryReq {
    query: String,
}

async fn set_query(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    Json(body): Json<SetQueryReq>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.engine.set_custom_query(&subject, &body.query) {
        return Err(TrackerError::NotFound(subject).into());
    }
    Ok(Json(json!({
        "subject": SubjectKey::parse(&subject)?,
        "query": state.engine.query_for(&subject)?,
    })))
}

async fn timeline(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Json<serde_json::Value> {
    let timeline = state.engine.get_timeline(&subject);
    Json(json!({ "subject": subject, "timeline": timeline }))
}

async fn update(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let timeline = state.engine.refresh_now(&subject).await?;
    Ok(Json(json!({
        "message": format!("Updated news for {subject}"),
        "timeline": timeline,
    })))
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!(state.engine.stats()))
}

/// Detaches the SSE client's listener when the response stream is dropped.
struct StreamSubscription {
    notifier: Arc<Notifier>,
    id: ListenerId,
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.notifier.detach(self.id);
    }
}

async fn events(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // untracked subjects are accepted; alerts start once it is tracked
    let key = SubjectKey::parse(&subject)?;
    let (listener, rx) = ChannelListener::pair(SSE_BUFFER);
    let notifier = Arc::clone(state.engine.notifier());
    let id = notifier.attach(Arc::new(listener));
    notifier.subscribe(id, &key);
    tracing::debug!(target: "api", subject = %key, listener = %id, "sse client connected");

    let sub = StreamSubscription { notifier, id };
    let stream = stream::unfold((rx, sub), |(mut rx, sub)| async move {
        let alert = rx.recv().await?;
        let event = Event::default()
            .event("news-alert")
            .json_data(&alert)
            .unwrap_or_else(|_| Event::default().event("news-alert").data(&alert.message));
        Some((Ok(event), (rx, sub)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
