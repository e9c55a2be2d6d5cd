//! Notification data model — records, kinds, and WebSocket message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What triggered the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// One-off reminder the user asked for.
    Reminder,
    /// Fires on the task's due date.
    DueDate,
    /// Fires on a status change.
    StatusChange,
    /// Fires when the task's planned slot begins.
    PlannedTime,
}

/// A persisted notification. `sent_at` is the idempotency marker: set
/// exactly once on delivery, never reset by later edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unique ID.
    pub id: Uuid,
    /// The task this notification belongs to.
    pub task_id: Uuid,
    /// When the notification should fire.
    pub time: DateTime<Utc>,
    /// What triggered it.
    pub kind: NotificationKind,
    /// Text shown to the user.
    pub message: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the notification was delivered, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Create a new unsent notification.
    pub fn new(
        task_id: Uuid,
        time: DateTime<Utc>,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            time,
            kind,
            message: message.into(),
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    /// Whether this notification has already been delivered.
    pub fn is_sent(&self) -> bool {
        self.sent_at.is_some()
    }
}

/// Messages sent over the notification WebSocket (server → client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyWsMessage {
    /// Full sync of upcoming unsent notifications (sent on connect).
    UpcomingSync { notifications: Vec<Notification> },
    /// A timer was armed for this notification.
    Scheduled { notification: Notification },
    /// The notification fired and was shown to the user.
    Received { notification: Notification },
    /// The notification's timer was cancelled.
    Cancelled { id: Uuid },
}
