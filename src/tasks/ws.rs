//! WebSocket server + REST endpoints for real-time task sync and planning.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::model::{Task, TaskAction, TaskStatus, TaskWsMessage};
use crate::coordinator::Coordinator;
use crate::notify::model::{Notification, NotificationKind};
use crate::notify::scheduler::NotificationScheduler;
use crate::planner::DayPlanner;
use crate::store::Database;

/// Shared state for the task WebSocket and planning endpoints.
#[derive(Clone)]
pub struct TaskState {
    pub db: Arc<dyn Database>,
    pub coordinator: Arc<Coordinator>,
    pub scheduler: Arc<NotificationScheduler>,
    pub planner: Arc<DayPlanner>,
    /// Broadcast channel for pushing updates to all connected clients.
    pub tx: broadcast::Sender<TaskWsMessage>,
}

impl TaskState {
    pub fn new(
        db: Arc<dyn Database>,
        coordinator: Arc<Coordinator>,
        scheduler: Arc<NotificationScheduler>,
        planner: Arc<DayPlanner>,
    ) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            db,
            coordinator,
            scheduler,
            planner,
            tx,
        }
    }
}

/// Build the Axum router for `/ws/tasks` and the REST endpoints.
pub fn task_routes(state: TaskState) -> Router {
    Router::new()
        .route("/ws/tasks", get(ws_handler))
        .route("/health", get(health))
        .route("/api/plan", post(run_planner))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dayflow"
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<TaskState>) -> impl IntoResponse {
    info!("Task WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: TaskState) {
    info!("Task WebSocket client connected");

    // Subscribe before the initial sync so updates racing the sync are
    // not lost.
    let mut rx = state.tx.subscribe();

    // Send all non-done tasks on connect
    match state.db.list_open_tasks().await {
        Ok(tasks) => {
            let sync_msg = TaskWsMessage::TasksSync { tasks };
            if let Ok(json) = serde_json::to_string(&sync_msg) {
                if socket.send(Message::Text(json.into())).await.is_err() {
                    warn!("Failed to send initial task sync, client disconnected");
                    return;
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to load tasks for initial sync");
        }
    }

    loop {
        tokio::select! {
            // Forward broadcast events to this client
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                debug!("Task WS client disconnected during send");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Task WS client lagged behind broadcast");
                        // Re-sync
                        if let Ok(tasks) = state.db.list_open_tasks().await {
                            let sync = TaskWsMessage::TasksSync { tasks };
                            if let Ok(json) = serde_json::to_string(&sync) {
                                if socket.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Task broadcast channel closed");
                        break;
                    }
                }
            }

            // Receive actions from client
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_action(&text, &state).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Task WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Task WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Task WebSocket connection closed");
}

async fn handle_client_action(text: &str, state: &TaskState) {
    match serde_json::from_str::<TaskAction>(text) {
        Ok(action) => match action {
            TaskAction::Create {
                name,
                description,
                duration_minutes,
                due_date,
                planned_time,
                priority,
                project_id,
            } => {
                let mut task = Task::new(name);
                if let Some(desc) = description {
                    task = task.with_description(desc);
                }
                if let Some(minutes) = duration_minutes {
                    task = task.with_duration(minutes);
                }
                if let Some(due) = due_date {
                    task = task.with_due_date(due);
                }
                if let Some(at) = planned_time {
                    task = task.with_planned_time(at);
                }
                if let Some(p) = priority {
                    task = task.with_priority(p);
                }
                if let Some(project) = project_id {
                    task = task.with_project(project);
                }

                match state.db.create_task(&task).await {
                    Ok(()) => {
                        info!(id = %task.id, name = %task.name, "Task created via WS");
                        if task.planned_time.is_some() {
                            if let Err(e) = state.coordinator.planned_time_changed(&task).await {
                                warn!(id = %task.id, error = %e, "Failed to arm planned-time notification");
                            }
                        }
                        let _ = state.tx.send(TaskWsMessage::TaskCreated { task });
                    }
                    Err(e) => warn!(error = %e, "Failed to create task"),
                }
            }

            TaskAction::Update {
                id,
                name,
                description,
                duration_minutes,
                due_date,
                status,
                priority,
            } => {
                match state.db.get_task(id).await {
                    Ok(Some(mut task)) => {
                        let previous = task.status;
                        if let Some(n) = name {
                            task.name = n;
                        }
                        if let Some(d) = description {
                            task.description = Some(d);
                        }
                        if let Some(m) = duration_minutes {
                            task.duration_minutes = Some(m);
                        }
                        if let Some(due) = due_date {
                            task.due_date = Some(due);
                        }
                        if let Some(s) = status {
                            task.status = s;
                        }
                        if let Some(p) = priority {
                            task.priority = p;
                        }
                        task.updated_at = chrono::Utc::now();

                        match state.db.update_task(&task).await {
                            Ok(()) => {
                                info!(id = %id, "Task updated via WS");
                                if let Err(e) =
                                    state.coordinator.task_status_changed(&task, previous).await
                                {
                                    warn!(id = %id, error = %e, "Status side effects failed");
                                }
                                let _ = state.tx.send(TaskWsMessage::TaskUpdated { task });
                            }
                            Err(e) => warn!(id = %id, error = %e, "Failed to update task"),
                        }
                    }
                    Ok(None) => warn!(id = %id, "Update failed — task not found"),
                    Err(e) => warn!(id = %id, error = %e, "Failed to fetch task for update"),
                }
            }

            TaskAction::Complete { id } => {
                match state.db.get_task(id).await {
                    Ok(Some(task)) => {
                        let previous = task.status;
                        match state.db.update_task_status(id, TaskStatus::Done).await {
                            Ok(()) => {
                                info!(id = %id, "Task completed via WS");
                                let mut done = task;
                                done.status = TaskStatus::Done;
                                done.updated_at = chrono::Utc::now();
                                if let Err(e) =
                                    state.coordinator.task_status_changed(&done, previous).await
                                {
                                    warn!(id = %id, error = %e, "Completion side effects failed");
                                }
                                let _ = state.tx.send(TaskWsMessage::TaskUpdated { task: done });
                            }
                            Err(e) => warn!(id = %id, error = %e, "Failed to complete task"),
                        }
                    }
                    Ok(None) => warn!(id = %id, "Complete failed — task not found"),
                    Err(e) => warn!(id = %id, error = %e, "Failed to fetch task for completion"),
                }
            }

            TaskAction::SetPlannedTime { id, planned_time } => {
                match state.db.get_task(id).await {
                    Ok(Some(mut task)) => {
                        match state.db.set_task_planned_time(id, Some(planned_time)).await {
                            Ok(()) => {
                                info!(id = %id, at = %planned_time, "Task planned via WS");
                                task.planned_time = Some(planned_time);
                                task.updated_at = chrono::Utc::now();
                                if let Err(e) = state.coordinator.planned_time_changed(&task).await
                                {
                                    warn!(id = %id, error = %e, "Failed to sync planned-time notification");
                                }
                                let _ = state.tx.send(TaskWsMessage::TaskUpdated { task });
                            }
                            Err(e) => warn!(id = %id, error = %e, "Failed to set planned time"),
                        }
                    }
                    Ok(None) => warn!(id = %id, "Set planned time failed — task not found"),
                    Err(e) => warn!(id = %id, error = %e, "Failed to fetch task"),
                }
            }

            TaskAction::ClearPlannedTime { id } => {
                match state.db.get_task(id).await {
                    Ok(Some(mut task)) => {
                        match state.db.set_task_planned_time(id, None).await {
                            Ok(()) => {
                                info!(id = %id, "Task unplanned via WS");
                                task.planned_time = None;
                                task.updated_at = chrono::Utc::now();
                                if let Err(e) = state.coordinator.planned_time_changed(&task).await
                                {
                                    warn!(id = %id, error = %e, "Failed to drop planned-time notification");
                                }
                                let _ = state.tx.send(TaskWsMessage::TaskUpdated { task });
                            }
                            Err(e) => warn!(id = %id, error = %e, "Failed to clear planned time"),
                        }
                    }
                    Ok(None) => warn!(id = %id, "Clear planned time failed — task not found"),
                    Err(e) => warn!(id = %id, error = %e, "Failed to fetch task"),
                }
            }

            TaskAction::Delete { id } => match state.coordinator.task_deleted(id).await {
                Ok(()) => {
                    info!(id = %id, "Task deleted via WS");
                    let _ = state.tx.send(TaskWsMessage::TaskDeleted { id });
                }
                Err(e) => warn!(id = %id, error = %e, "Failed to delete task"),
            },

            TaskAction::Remind { id, time, message } => {
                match state.db.get_task(id).await {
                    Ok(Some(task)) => {
                        let text =
                            message.unwrap_or_else(|| format!("Reminder: \"{}\"", task.name));
                        let notification =
                            Notification::new(task.id, time, NotificationKind::Reminder, text);
                        match state.db.insert_notification(&notification).await {
                            Ok(()) => {
                                let armed = state.scheduler.schedule(notification).await;
                                info!(id = %id, at = %time, armed, "Reminder created via WS");
                            }
                            Err(e) => warn!(id = %id, error = %e, "Failed to save reminder"),
                        }
                    }
                    Ok(None) => warn!(id = %id, "Remind failed — task not found"),
                    Err(e) => warn!(id = %id, error = %e, "Failed to fetch task for reminder"),
                }
            }
        },
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized task WS message");
        }
    }
}

// ── REST Endpoints ──────────────────────────────────────────────────────

/// Run the day planner now and return its outcome.
///
/// Each scheduled task gets its planned-time notification synced through
/// the coordinator and a `task_updated` broadcast, the same as a manual
/// planned-time change.
async fn run_planner(State(state): State<TaskState>) -> impl IntoResponse {
    match state.planner.plan_day(Utc::now()).await {
        Ok(outcome) => {
            for task in &outcome.scheduled {
                if let Err(e) = state.coordinator.planned_time_changed(task).await {
                    warn!(id = %task.id, error = %e, "Failed to sync planned-time notification");
                }
                let _ = state.tx.send(TaskWsMessage::TaskUpdated { task: task.clone() });
            }
            (StatusCode::OK, Json(serde_json::json!(outcome)))
        }
        Err(e) => {
            warn!(error = %e, "Day planning failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}
