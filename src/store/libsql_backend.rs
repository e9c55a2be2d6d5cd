//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. All timestamps are stored
//! as RFC 3339 TEXT so range filters can compare lexicographically.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::notify::model::{Notification, NotificationKind};
use crate::store::migrations;
use crate::store::traits::Database;
use crate::tasks::model::{Task, TaskPriority, TaskStatus};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Try SQLite datetime() output with fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    // Try SQLite datetime() output without fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Serialize a snake_case enum to its DB string.
fn enum_to_str<T: serde::Serialize>(value: &T, fallback: &'static str) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| fallback.to_string())
}

// ── Row mapping helpers ─────────────────────────────────────────────

/// Column list for task SELECT queries (11 columns).
const TASK_COLUMNS: &str = "id, name, description, duration_minutes, due_date, planned_time, project_id, status, priority, created_at, updated_at";

fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("task.id: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Query(format!("task.id parse: {e}")))?;

    let name: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("task.name: {e}")))?;

    let desc_raw: String = row.get(2).unwrap_or_default();
    let description = if desc_raw.is_empty() { None } else { Some(desc_raw) };

    let duration_raw: Option<i64> = row.get(3).ok();
    let duration_minutes = duration_raw.map(|m| m as u32);

    let due_date_str: Option<String> = row.get(4).ok();
    let due_date = due_date_str
        .filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok());

    let planned_str: Option<String> = row.get(5).ok();
    let planned_time = planned_str
        .filter(|s| !s.is_empty())
        .map(|s| parse_datetime(&s));

    let project_str: Option<String> = row.get(6).ok();
    let project_id = project_str
        .filter(|s| !s.is_empty())
        .and_then(|s| Uuid::parse_str(&s).ok());

    let status_str: String = row.get(7).unwrap_or_else(|_| "planning".to_string());
    let status: TaskStatus = serde_json::from_value(serde_json::Value::String(status_str))
        .unwrap_or(TaskStatus::Planning);

    let priority_str: String = row.get(8).unwrap_or_else(|_| "medium".to_string());
    let priority: TaskPriority = serde_json::from_value(serde_json::Value::String(priority_str))
        .unwrap_or(TaskPriority::Medium);

    let created_at_str: String = row.get(9).unwrap_or_default();
    let created_at = parse_datetime(&created_at_str);

    let updated_at_str: String = row.get(10).unwrap_or_default();
    let updated_at = parse_datetime(&updated_at_str);

    Ok(Task {
        id,
        name,
        description,
        duration_minutes,
        due_date,
        planned_time,
        project_id,
        status,
        priority,
        created_at,
        updated_at,
    })
}

/// Column list for notification SELECT queries (7 columns).
const NOTIFICATION_COLUMNS: &str = "id, task_id, time, kind, message, created_at, sent_at";

fn row_to_notification(row: &libsql::Row) -> Result<Notification, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("notification.id: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Query(format!("notification.id parse: {e}")))?;

    let task_id_str: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("notification.task_id: {e}")))?;
    let task_id = Uuid::parse_str(&task_id_str)
        .map_err(|e| DatabaseError::Query(format!("notification.task_id parse: {e}")))?;

    let time_str: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("notification.time: {e}")))?;
    let time = parse_datetime(&time_str);

    let kind_str: String = row.get(3).unwrap_or_else(|_| "reminder".to_string());
    let kind: NotificationKind = serde_json::from_value(serde_json::Value::String(kind_str))
        .unwrap_or(NotificationKind::Reminder);

    let message: String = row.get(4).unwrap_or_default();

    let created_at_str: String = row.get(5).unwrap_or_default();
    let created_at = parse_datetime(&created_at_str);

    let sent_at_str: Option<String> = row.get(6).ok();
    let sent_at = sent_at_str
        .filter(|s| !s.is_empty())
        .map(|s| parse_datetime(&s));

    Ok(Notification {
        id,
        task_id,
        time,
        kind,
        message,
        created_at,
        sent_at,
    })
}

// ── Database trait implementation ───────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn create_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let status_str = enum_to_str(&task.status, "planning");
        let priority_str = enum_to_str(&task.priority, "medium");

        conn.execute(
            "INSERT INTO tasks (id, name, description, duration_minutes, due_date, planned_time, project_id, status, priority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.id.to_string(),
                task.name.as_str(),
                task.description.as_deref().unwrap_or(""),
                task.duration_minutes.map(|m| m as i64),
                task.due_date.map(|d| d.to_string()),
                task.planned_time.map(|t| t.to_rfc3339()),
                task.project_id.map(|id| id.to_string()),
                status_str,
                priority_str,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("create_task: {e}")))?;
        debug!(id = %task.id, "Task created");
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_task(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_task row: {e}"))),
        }
    }

    async fn update_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let status_str = enum_to_str(&task.status, "planning");
        let priority_str = enum_to_str(&task.priority, "medium");

        conn.execute(
            "UPDATE tasks SET name = ?1, description = ?2, duration_minutes = ?3, due_date = ?4, planned_time = ?5, project_id = ?6, status = ?7, priority = ?8, updated_at = ?9 WHERE id = ?10",
            params![
                task.name.as_str(),
                task.description.as_deref().unwrap_or(""),
                task.duration_minutes.map(|m| m as i64),
                task.due_date.map(|d| d.to_string()),
                task.planned_time.map(|t| t.to_rfc3339()),
                task.project_id.map(|id| id.to_string()),
                status_str,
                priority_str,
                task.updated_at.to_rfc3339(),
                task.id.to_string(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("update_task: {e}")))?;
        Ok(())
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let status_str = enum_to_str(&status, "planning");
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status_str, now, id.to_string()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("update_task_status: {e}")))?;
        Ok(())
    }

    async fn set_task_planned_time(
        &self,
        id: Uuid,
        planned_time: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE tasks SET planned_time = ?1, updated_at = ?2 WHERE id = ?3",
            params![planned_time.map(|t| t.to_rfc3339()), now, id.to_string()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_task_planned_time: {e}")))?;
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_task: {e}")))?;
        Ok(count > 0)
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    async fn list_open_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE status != 'done' ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_open_tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    async fn list_tasks_due_on(&self, date: NaiveDate) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE due_date = ?1 ORDER BY created_at ASC"
                ),
                params![date.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks_due_on: {e}")))?;

        let mut tasks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    async fn list_tasks_planned_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE planned_time IS NOT NULL AND planned_time >= ?1 AND planned_time < ?2 \
                     ORDER BY planned_time ASC"
                ),
                params![start.to_rfc3339(), end.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks_planned_between: {e}")))?;

        let mut tasks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    // ── Notifications ───────────────────────────────────────────────

    async fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let kind_str = enum_to_str(&notification.kind, "reminder");

        conn.execute(
            "INSERT INTO notifications (id, task_id, time, kind, message, created_at, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                notification.id.to_string(),
                notification.task_id.to_string(),
                notification.time.to_rfc3339(),
                kind_str,
                notification.message.as_str(),
                notification.created_at.to_rfc3339(),
                notification.sent_at.map(|t| t.to_rfc3339()),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_notification: {e}")))?;
        debug!(id = %notification.id, task_id = %notification.task_id, "Notification created");
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_notification: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_notification(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_notification row: {e}"))),
        }
    }

    async fn update_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let kind_str = enum_to_str(&notification.kind, "reminder");

        // sent_at is not part of this statement; see mark_notification_sent.
        conn.execute(
            "UPDATE notifications SET task_id = ?1, time = ?2, kind = ?3, message = ?4 WHERE id = ?5",
            params![
                notification.task_id.to_string(),
                notification.time.to_rfc3339(),
                kind_str,
                notification.message.as_str(),
                notification.id.to_string(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("update_notification: {e}")))?;
        Ok(())
    }

    async fn delete_notification(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute(
                "DELETE FROM notifications WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_notification: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_notifications_for_task(
        &self,
        task_id: Uuid,
    ) -> Result<usize, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute(
                "DELETE FROM notifications WHERE task_id = ?1",
                params![task_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_notifications_for_task: {e}")))?;
        Ok(count as usize)
    }

    async fn list_notifications_for_task(
        &self,
        task_id: Uuid,
    ) -> Result<Vec<Notification>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE task_id = ?1 ORDER BY time ASC"
                ),
                params![task_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_notifications_for_task: {e}")))?;

        let mut notifications = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            notifications.push(row_to_notification(&row)?);
        }
        Ok(notifications)
    }

    async fn list_unsent_after(
        &self,
        after: DateTime<Utc>,
    ) -> Result<Vec<Notification>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
                     WHERE sent_at IS NULL AND time > ?1 ORDER BY time ASC"
                ),
                params![after.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_unsent_after: {e}")))?;

        let mut notifications = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            notifications.push(row_to_notification(&row)?);
        }
        Ok(notifications)
    }

    async fn mark_notification_sent(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute(
                "UPDATE notifications SET sent_at = ?1 WHERE id = ?2 AND sent_at IS NULL",
                params![at.to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_notification_sent: {e}")))?;
        Ok(count > 0)
    }
}
