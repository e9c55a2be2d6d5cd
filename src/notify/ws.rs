//! WebSocket + REST surface for notification events.
//!
//! Server-to-client only: clients watch scheduled/received/cancelled
//! events; all mutations go through the task socket.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::model::NotifyWsMessage;
use super::scheduler::NotificationScheduler;
use crate::store::Database;

/// Shared state for the notification WebSocket.
#[derive(Clone)]
pub struct NotifyState {
    pub db: Arc<dyn Database>,
    pub scheduler: Arc<NotificationScheduler>,
}

/// Build the Axum router for `/ws/notifications`.
pub fn notify_routes(state: NotifyState) -> Router {
    Router::new()
        .route("/ws/notifications", get(ws_handler))
        .route("/api/notifications/upcoming", get(upcoming))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<NotifyState>) -> impl IntoResponse {
    info!("Notification WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: NotifyState) {
    info!("Notification WebSocket client connected");

    // Subscribe before the initial sync so a timer armed while the sync
    // is in flight still reaches this client as a live event.
    let mut rx = state.scheduler.subscribe();

    // Send upcoming unsent notifications on connect
    match state.db.list_unsent_after(Utc::now()).await {
        Ok(notifications) => {
            let sync_msg = NotifyWsMessage::UpcomingSync { notifications };
            if let Ok(json) = serde_json::to_string(&sync_msg) {
                if socket.send(Message::Text(json.into())).await.is_err() {
                    warn!("Failed to send initial notification sync, client disconnected");
                    return;
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to load upcoming notifications for initial sync");
        }
    }

    loop {
        tokio::select! {
            // Forward scheduler events to this client
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                debug!("Notification WS client disconnected during send");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Notification WS client lagged behind broadcast");
                        // Re-sync
                        if let Ok(notifications) = state.db.list_unsent_after(Utc::now()).await {
                            let sync = NotifyWsMessage::UpcomingSync { notifications };
                            if let Ok(json) = serde_json::to_string(&sync) {
                                if socket.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Notification broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        debug!(text = %text, "Ignoring client message on notification socket");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Notification WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Notification WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Notification WebSocket connection closed");
}

// ── REST Endpoints ──────────────────────────────────────────────────────

async fn upcoming(State(state): State<NotifyState>) -> impl IntoResponse {
    match state.db.list_unsent_after(Utc::now()).await {
        Ok(notifications) => (StatusCode::OK, Json(serde_json::json!(notifications))),
        Err(e) => {
            warn!(error = %e, "Failed to list upcoming notifications");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to load notifications"})),
            )
        }
    }
}
