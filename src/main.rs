//! Subject News Tracker: binary entrypoint.
//! Loads configuration, starts the polling scheduler and serves the HTTP API.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use subject_news_tracker::{
    api, metrics::Metrics, Engine, PollingScheduler, TrackerConfig, WebhookListener,
};

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("subject_news_tracker=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if let Err(e) = res {
        eprintln!("tracing already initialised: {e}");
    }
}

/// Attach the configured webhook and subscribe it to its subjects.
fn attach_webhook(engine: &Engine, cfg: &TrackerConfig) -> Result<()> {
    let Some(url) = cfg.webhook_url.clone() else {
        return Ok(());
    };
    let id = engine
        .notifier()
        .attach(Arc::new(WebhookListener::new(url)));
    for subject in &cfg.webhook_subjects {
        engine.add_subject(subject, None)?;
        engine.subscribe(id, subject)?;
    }
    info!(
        target: "notify",
        listener = %id,
        subjects = ?cfg.webhook_subjects,
        "webhook listener attached"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = TrackerConfig::load().context("loading tracker config")?;
    let metrics = Metrics::init(cfg.poll_interval.as_secs())?;

    let engine = Arc::new(Engine::from_config(&cfg));
    attach_webhook(&engine, &cfg).context("attaching webhook listener")?;
    for subject in engine.list_subjects() {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if let Err(e) = engine.refresh_now(subject.as_str()).await {
                warn!(subject = %subject, error = %e, "initial load failed");
            }
        });
    }

    let scheduler = PollingScheduler::new(Arc::clone(&engine), cfg.poll_interval).spawn();

    let app = api::router(api::AppState::new(Arc::clone(&engine))).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    scheduler.shutdown().await;
    Ok(())
}
