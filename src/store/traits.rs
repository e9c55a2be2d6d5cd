//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::notify::model::Notification;
use crate::tasks::model::{Task, TaskStatus};

/// Backend-agnostic database trait covering tasks and notifications.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Insert a new task.
    async fn create_task(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Get a task by ID.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError>;

    /// Update all mutable fields of a task.
    async fn update_task(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Update a task's status only.
    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<(), DatabaseError>;

    /// Set or clear a task's planned time.
    async fn set_task_planned_time(
        &self,
        id: Uuid,
        planned_time: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    /// Delete a task. Returns true if a row was removed.
    async fn delete_task(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// All tasks, planning order (priority-agnostic, creation order).
    async fn list_tasks(&self) -> Result<Vec<Task>, DatabaseError>;

    /// All tasks that are not done (for UI sync).
    async fn list_open_tasks(&self) -> Result<Vec<Task>, DatabaseError>;

    /// Tasks whose due date is exactly the given day.
    async fn list_tasks_due_on(&self, date: NaiveDate) -> Result<Vec<Task>, DatabaseError>;

    /// Tasks whose planned time falls in `[start, end)`.
    async fn list_tasks_planned_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, DatabaseError>;

    // ── Notifications ───────────────────────────────────────────────

    /// Insert a new notification record.
    async fn insert_notification(&self, notification: &Notification)
    -> Result<(), DatabaseError>;

    /// Get a notification by ID.
    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, DatabaseError>;

    /// Update a notification's time, kind, and message.
    ///
    /// `sent_at` and `created_at` are deliberately not writable here; the
    /// sent marker only moves through [`mark_notification_sent`].
    ///
    /// [`mark_notification_sent`]: Database::mark_notification_sent
    async fn update_notification(&self, notification: &Notification)
    -> Result<(), DatabaseError>;

    /// Delete a notification. Returns true if a row was removed.
    async fn delete_notification(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Delete every notification belonging to a task. Returns the count.
    async fn delete_notifications_for_task(&self, task_id: Uuid)
    -> Result<usize, DatabaseError>;

    /// All notifications for a task, soonest first.
    async fn list_notifications_for_task(
        &self,
        task_id: Uuid,
    ) -> Result<Vec<Notification>, DatabaseError>;

    /// Unsent notifications with a fire time strictly after `after`,
    /// soonest first. The startup-recovery query.
    async fn list_unsent_after(
        &self,
        after: DateTime<Utc>,
    ) -> Result<Vec<Notification>, DatabaseError>;

    /// Set `sent_at` if and only if it is still NULL. Returns whether the
    /// row transitioned, so a concurrent second delivery reads false.
    async fn mark_notification_sent(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
}
