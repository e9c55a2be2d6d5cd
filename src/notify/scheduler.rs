//! Notification scheduler — one in-memory timer per pending notification,
//! each delivered at most once per process.
//!
//! The timer map is rebuilt from the store on startup (`load_pending`) and
//! after sleep or clock changes (`reschedule_all`); timers themselves are
//! fixed-delay sleeps and never self-correct.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::notify::model::{Notification, NotifyWsMessage};
use crate::notify::sink::NotificationSink;
use crate::store::Database;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Longest single sleep a timer task takes; tokio rejects very long timers,
/// so the full delay runs in bounded chunks.
const MAX_SLEEP_CHUNK: Duration = Duration::from_secs(60 * 60 * 24);

/// Armed timer handle.
#[derive(Debug)]
struct ArmedTimer {
    handle: JoinHandle<()>,
    fire_at: DateTime<Utc>,
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Shown via the sink and marked sent.
    Delivered,
    /// The sent marker was already set (or the record is gone).
    SkippedAlreadySent,
    /// The owning task is done; completed tasks get no reminders.
    SkippedTaskDone,
    /// The owning task no longer exists or could not be loaded.
    SkippedTaskMissing,
}

/// Arms, cancels, and fires notification timers.
///
/// Cancellation safety: a woken timer first *claims* its own map entry
/// (removes it under the write lock) before delivering. `cancel` therefore
/// either aborts a still-sleeping timer or finds nothing — it can never
/// interrupt a delivery that already started, and a delivery that lost its
/// entry to `cancel` never starts.
pub struct NotificationScheduler {
    db: Arc<dyn Database>,
    sink: Arc<dyn NotificationSink>,
    tx: broadcast::Sender<NotifyWsMessage>,
    /// One live timer per notification id.
    timers: Arc<RwLock<HashMap<Uuid, ArmedTimer>>>,
    /// Ids this process has already shown. Written before the durable
    /// marker so a failed store write cannot cause a second show.
    delivered: Arc<Mutex<HashSet<Uuid>>>,
}

impl NotificationScheduler {
    /// Create a new scheduler.
    pub fn new(db: Arc<dyn Database>, sink: Arc<dyn NotificationSink>) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            db,
            sink,
            tx,
            timers: Arc::new(RwLock::new(HashMap::new())),
            delivered: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Subscribe to notification events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<NotifyWsMessage> {
        self.tx.subscribe()
    }

    /// Arm a timer for the notification, replacing any existing timer for
    /// the same id. Returns whether a timer was armed: already-sent and
    /// past-due notifications are dropped, never fired retroactively.
    pub async fn schedule(self: &Arc<Self>, notification: Notification) -> bool {
        let id = notification.id;

        if notification.is_sent() {
            self.cancel(id).await;
            debug!(id = %id, "Notification already sent, not arming");
            return false;
        }

        let now = Utc::now();
        if notification.time <= now {
            self.cancel(id).await;
            debug!(id = %id, time = %notification.time, "Fire time already passed, not arming");
            return false;
        }

        let fire_at = notification.time;
        let armed = notification.clone();
        let scheduler = Arc::clone(self);

        // Replace-then-insert happens under one write-lock acquisition so the
        // spawned task cannot observe the map before its own entry exists.
        {
            let mut timers = self.timers.write().await;
            if let Some(old) = timers.remove(&id) {
                if !old.handle.is_finished() {
                    old.handle.abort();
                }
            }

            let handle = tokio::spawn(async move {
                loop {
                    let now = Utc::now();
                    if notification.time <= now {
                        break;
                    }
                    let remaining = (notification.time - now).to_std().unwrap_or_default();
                    tokio::time::sleep(remaining.min(MAX_SLEEP_CHUNK)).await;
                }

                // Claim the map entry. If it is gone, the timer was
                // cancelled or replaced while this task slept.
                let claimed = scheduler.timers.write().await.remove(&id).is_some();
                if !claimed {
                    return;
                }
                scheduler.deliver(&notification).await;
            });

            timers.insert(id, ArmedTimer { handle, fire_at });
        }

        debug!(id = %id, fire_at = %fire_at, "Notification timer armed");
        let _ = self.tx.send(NotifyWsMessage::Scheduled { notification: armed });
        true
    }

    /// Cancel the timer for a notification, if one is armed.
    /// Idempotent: returns false when no timer exists.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let removed = {
            let mut timers = self.timers.write().await;
            timers.remove(&id)
        };

        match removed {
            Some(timer) => {
                if !timer.handle.is_finished() {
                    timer.handle.abort();
                }
                debug!(id = %id, "Notification timer cancelled");
                let _ = self.tx.send(NotifyWsMessage::Cancelled { id });
                true
            }
            None => false,
        }
    }

    /// Run the delivery decision ladder for a notification.
    ///
    /// Re-reads the freshest record and task state, shows the notification
    /// via the sink when it should fire, and sets the sent marker — in
    /// memory first, then durably. A failed store write is logged and
    /// tolerated: within this process the in-memory guard keeps delivery
    /// exactly-once, across a crash the notification may fire again.
    pub async fn deliver(&self, notification: &Notification) -> DeliveryOutcome {
        let id = notification.id;

        let current = match self.db.get_notification(id).await {
            Ok(Some(n)) => n,
            Ok(None) => {
                debug!(id = %id, "Notification record gone, nothing to deliver");
                return DeliveryOutcome::SkippedAlreadySent;
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Could not re-read notification, using armed copy");
                notification.clone()
            }
        };

        if current.is_sent() || self.delivered.lock().await.contains(&id) {
            debug!(id = %id, "Notification already sent, skipping");
            return DeliveryOutcome::SkippedAlreadySent;
        }

        let task = match self.db.get_task(current.task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!(id = %id, task_id = %current.task_id, "Task gone, skipping notification");
                return DeliveryOutcome::SkippedTaskMissing;
            }
            Err(e) => {
                warn!(
                    id = %id,
                    task_id = %current.task_id,
                    error = %e,
                    "Could not load task, skipping notification"
                );
                return DeliveryOutcome::SkippedTaskMissing;
            }
        };

        if task.status.is_done() {
            debug!(id = %id, task = %task.name, "Task already done, skipping notification");
            return DeliveryOutcome::SkippedTaskDone;
        }

        self.sink.show(&current, &task).await;
        self.delivered.lock().await.insert(id);

        let sent_at = Utc::now();
        let mut shown = current.clone();
        shown.sent_at = Some(sent_at);
        let _ = self.tx.send(NotifyWsMessage::Received { notification: shown });

        match self.db.mark_notification_sent(id, sent_at).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(id = %id, "Sent marker was already set");
            }
            Err(e) => {
                warn!(
                    id = %id,
                    error = %e,
                    "Failed to persist sent marker, notification may repeat after restart"
                );
            }
        }

        info!(id = %id, task = %task.name, kind = ?current.kind, "Notification delivered");
        DeliveryOutcome::Delivered
    }

    /// Arm timers for every unsent notification with a future fire time.
    /// Called once at startup; past unsent rows stay unsent and unarmed.
    pub async fn load_pending(self: &Arc<Self>) -> Result<usize, SchedulerError> {
        let pending = self.db.list_unsent_after(Utc::now()).await?;

        let mut armed = 0;
        for notification in pending {
            if self.schedule(notification).await {
                armed += 1;
            }
        }

        info!(count = armed, "Pending notifications armed");
        Ok(armed)
    }

    /// Drop every timer and rebuild the map from the store against the
    /// current clock. The single recovery primitive for system sleep and
    /// wall-clock jumps.
    pub async fn reschedule_all(self: &Arc<Self>) -> Result<usize, SchedulerError> {
        let drained: Vec<ArmedTimer> = {
            let mut timers = self.timers.write().await;
            timers.drain().map(|(_, timer)| timer).collect()
        };
        let dropped = drained.len();
        for timer in drained {
            if !timer.handle.is_finished() {
                timer.handle.abort();
            }
        }

        let armed = self.load_pending().await?;
        info!(dropped, armed, "Notification timers rebuilt");
        Ok(armed)
    }

    /// Abort every timer. Process teardown.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.write().await;
        for (_, timer) in timers.drain() {
            if !timer.handle.is_finished() {
                timer.handle.abort();
            }
        }
    }

    /// Number of currently armed timers.
    pub async fn armed_count(&self) -> usize {
        self.timers.read().await.len()
    }

    /// Whether a timer is armed for this notification.
    pub async fn is_armed(&self, id: Uuid) -> bool {
        self.timers.read().await.contains_key(&id)
    }

    /// Fire time of the armed timer for this notification, if any.
    pub async fn next_fire_time(&self, id: Uuid) -> Option<DateTime<Utc>> {
        self.timers.read().await.get(&id).map(|timer| timer.fire_at)
    }
}
