//! HTTP control surface.
//!
//! Minimal operational interface: a liveness probe, a manual trigger for
//! the daily job, and a messaging wiring check. Account linking and any
//! user-facing web flow live outside this daemon.

use crate::config::ServerConfig;
use crate::notifier::Notifier;
use crate::scheduler::Scheduler;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    scheduler: Arc<Scheduler>,
    notifier: Arc<Notifier>,
    started: Instant,
}

#[derive(serde::Deserialize)]
struct SendHelloBody {
    #[serde(default)]
    to: Option<String>,
}

/// Build the control-surface router.
pub fn router(scheduler: Arc<Scheduler>, notifier: Arc<Notifier>) -> Router {
    let state = AppState {
        scheduler,
        notifier,
        started: Instant::now(),
    };
    Router::new()
        .route("/health", get(health))
        .route("/api/run-now", post(run_now))
        .route("/api/send-hello", post(send_hello))
        .with_state(state)
}

/// Bind and serve until the shutdown future resolves.
pub async fn run_server(
    config: &ServerConfig,
    scheduler: Arc<Scheduler>,
    notifier: Arc<Notifier>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!("control surface listening on http://{local_addr}");

    axum::serve(listener, router(scheduler, notifier))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "uptime_secs": state.started.elapsed().as_secs(),
        "last_run_at": state.scheduler.last_run_at().map(|t| t.to_rfc3339()),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Fire the daily job asynchronously and respond immediately. A trigger
/// while a run is in flight is dropped, which the response reports.
async fn run_now(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.run_now() {
        Some(_handle) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"ok": true, "started": true})),
        ),
        None => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"ok": false, "started": false, "error": "run in flight"})),
        ),
    }
}

async fn send_hello(
    State(state): State<AppState>,
    Json(body): Json<SendHelloBody>,
) -> impl IntoResponse {
    match state.notifier.send_hello(body.to.as_deref()).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "sid": summary.sid})),
        ),
        Err(err) => {
            error!(error = %err, "hello send failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"ok": false, "error": err.to_string()})),
            )
        }
    }
}
