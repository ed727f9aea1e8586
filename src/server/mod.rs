//! HTTP control surface.
//!
//! Every handler answers immediately: power actions are handed to the
//! coordinator and clipboard text to the clipboard sync, and neither result
//! is waited on.

use std::future::Future;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::clipboard::ClipboardSync;
use crate::coordinator::Coordinator;
use crate::error::ClipboardError;
use crate::types::{truncate_for_display, ActionKind, CoordinatorStatus, APP_NAME};

/// Characters of clipboard text echoed back to the client.
pub const ECHO_PREVIEW_CHARS: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub clipboard: ClipboardSync,
}

#[derive(Debug, Serialize)]
struct Reply {
    status: &'static str,
    message: String,
}

type ReplyResponse = (StatusCode, Json<Reply>);

fn reply(code: StatusCode, status: &'static str, message: impl Into<String>) -> ReplyResponse {
    (
        code,
        Json(Reply {
            status,
            message: message.into(),
        }),
    )
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/shutdown", get(shutdown))
        .route("/sleep", get(sleep))
        .route("/cancel", get(cancel))
        .route("/status", get(status))
        .route("/clip", get(clip_empty))
        .route("/clip/{*text}", get(clip))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind the listening socket.
pub async fn bind(address: &str) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, "HTTP server listening");
    Ok(listener)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "app": APP_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "grace_period_seconds": state.coordinator.grace_period().as_secs(),
        "routes": ["/ping", "/shutdown", "/sleep", "/cancel", "/status", "/clip/{text}"],
    }))
}

async fn ping() -> ReplyResponse {
    info!("Ping");
    reply(
        StatusCode::OK,
        "ok",
        format!("Pong! {APP_NAME} server online."),
    )
}

async fn shutdown(State(state): State<AppState>) -> ReplyResponse {
    request(&state, ActionKind::PowerOff, "Shutdown")
}

async fn sleep(State(state): State<AppState>) -> ReplyResponse {
    request(&state, ActionKind::Suspend, "Sleep")
}

fn request(state: &AppState, kind: ActionKind, label: &str) -> ReplyResponse {
    info!(action = %kind, "Action requested over HTTP");
    state.coordinator.request_action(kind);
    let secs = state.coordinator.grace_period().as_secs();
    reply(
        StatusCode::ACCEPTED,
        "accepted",
        format!(
            "{label} command received. Action will be performed in {secs} seconds unless cancelled."
        ),
    )
}

async fn cancel(State(state): State<AppState>) -> ReplyResponse {
    let message = if state.coordinator.cancel_pending_action() {
        "Cancel request received."
    } else {
        "No pending action to cancel."
    };
    reply(StatusCode::ACCEPTED, "accepted", message)
}

async fn status(State(state): State<AppState>) -> Json<CoordinatorStatus> {
    Json(state.coordinator.status())
}

async fn clip(State(state): State<AppState>, Path(text): Path<String>) -> ReplyResponse {
    info!(chars = text.chars().count(), "Clipboard sync requested");
    let echo = truncate_for_display(&text, ECHO_PREVIEW_CHARS);
    match state.clipboard.sync(text) {
        Ok(()) => reply(
            StatusCode::ACCEPTED,
            "accepted",
            format!("Clipboard sync request sent: \"{echo}\""),
        ),
        Err(ClipboardError::Empty) => empty_clip(),
        Err(e) => {
            warn!(error = %e, "Clipboard sync could not be started");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "error",
                "Failed to initiate clipboard sync.",
            )
        }
    }
}

async fn clip_empty() -> ReplyResponse {
    empty_clip()
}

fn empty_clip() -> ReplyResponse {
    reply(
        StatusCode::BAD_REQUEST,
        "error",
        "No text to sync. Use /clip/<text>.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::ClipboardWriter;
    use crate::executor::SystemExecutor;
    use crate::notifications::LogNotifier;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    #[derive(Default)]
    struct MemoryClipboard(Mutex<Vec<String>>);

    impl ClipboardWriter for MemoryClipboard {
        fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn state() -> (AppState, Arc<MemoryClipboard>) {
        let sink = Arc::new(LogNotifier::default());
        let clipboard = Arc::new(MemoryClipboard::default());
        let state = AppState {
            coordinator: Coordinator::new(
                Duration::from_secs(30),
                Arc::new(SystemExecutor::new(true)),
                sink.clone(),
                Vec::new(),
            ),
            clipboard: ClipboardSync::new(clipboard.clone(), sink),
        };
        (state, clipboard)
    }

    async fn get(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let code = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (code, json)
    }

    #[tokio::test]
    async fn test_ping() {
        let (state, _) = state();
        let (code, json) = get(&state, "/ping").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["message"].as_str().unwrap().contains("Bealink"));
    }

    #[tokio::test]
    async fn test_index_describes_service() {
        let (state, _) = state();
        let (code, json) = get(&state, "/").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["app"], "Bealink");
        assert_eq!(json["grace_period_seconds"], 30);
    }

    #[tokio::test]
    async fn test_shutdown_is_accepted_and_pending() {
        let (state, _) = state();
        let (code, json) = get(&state, "/shutdown").await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "accepted");
        assert!(json["message"].as_str().unwrap().contains("30 seconds"));

        let (_, status) = get(&state, "/status").await;
        assert_eq!(status["state"], "pending");
        assert_eq!(status["kind"], "power_off");
    }

    #[tokio::test]
    async fn test_sleep_then_cancel() {
        let (state, _) = state();
        let (code, _) = get(&state, "/sleep").await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert!(matches!(
            state.coordinator.status(),
            CoordinatorStatus::Pending {
                kind: ActionKind::Suspend,
                ..
            }
        ));

        let (code, json) = get(&state, "/cancel").await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(json["message"], "Cancel request received.");
        assert!(state.coordinator.status().is_idle());

        let (_, json) = get(&state, "/cancel").await;
        assert_eq!(json["message"], "No pending action to cancel.");
    }

    #[tokio::test]
    async fn test_cancel_reports_only_its_own_win() {
        let (state, _) = state();
        get(&state, "/shutdown").await;
        let CoordinatorStatus::Pending { generation, .. } = state.coordinator.status() else {
            panic!("expected a pending action");
        };

        // Another source (click or key) gets there first.
        assert!(state.coordinator.cancel_generation(generation));

        let (code, json) = get(&state, "/cancel").await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(json["message"], "No pending action to cancel.");
    }

    #[tokio::test]
    async fn test_clip_decodes_and_syncs() {
        let (state, clipboard) = state();
        let (code, json) = get(&state, "/clip/hello%20world/again").await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(
            json["message"],
            "Clipboard sync request sent: \"hello world/again\""
        );

        let deadline = Instant::now() + Duration::from_secs(2);
        while clipboard.0.lock().unwrap().is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(clipboard.0.lock().unwrap()[0], "hello world/again");
    }

    #[tokio::test]
    async fn test_clip_echo_is_truncated() {
        let (state, _) = state();
        let long = "a".repeat(80);
        let (code, json) = get(&state, &format!("/clip/{long}")).await;
        assert_eq!(code, StatusCode::ACCEPTED);
        let expected = format!("Clipboard sync request sent: \"{}...\"", "a".repeat(47));
        assert_eq!(json["message"], expected);
    }

    #[tokio::test]
    async fn test_clip_without_text_is_bad_request() {
        let (state, _) = state();
        let (code, json) = get(&state, "/clip").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (state, _) = state();
        let (code, _) = get(&state, "/reboot").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }
}
