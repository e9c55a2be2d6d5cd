//! Notification sinks — where fired notifications are surfaced.

use async_trait::async_trait;
use tracing::info;

use crate::notify::model::Notification;
use crate::tasks::model::Task;

/// Where a delivered notification is shown to the user.
///
/// Delivery is fire-and-forget: a sink deals with its own failures and
/// never blocks the scheduler on them.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(&self, notification: &Notification, task: &Task);
}

/// Default sink — writes the notification to the structured log.
///
/// Useful headless and as the fallback when no platform sink is wired up;
/// WebSocket clients additionally receive a `received` event from the
/// scheduler's broadcast channel.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn show(&self, notification: &Notification, task: &Task) {
        info!(
            id = %notification.id,
            task = %task.name,
            kind = ?notification.kind,
            message = %notification.message,
            "Notification"
        );
    }
}
