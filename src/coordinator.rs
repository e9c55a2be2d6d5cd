//! Scheduling coordinator — keeps notifications in step with task changes.
//!
//! Task mutations have notification side effects: deleting a task tears
//! its notifications down, completing one silences them without losing
//! the records, and a planned-time change maintains the task's single
//! planned-time notification. Every mutation path routes through here so
//! those rules hold no matter where the change came from.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::notify::model::{Notification, NotificationKind};
use crate::notify::scheduler::NotificationScheduler;
use crate::store::traits::Database;
use crate::tasks::model::{Task, TaskStatus};

pub struct Coordinator {
    db: Arc<dyn Database>,
    scheduler: Arc<NotificationScheduler>,
}

impl Coordinator {
    pub fn new(db: Arc<dyn Database>, scheduler: Arc<NotificationScheduler>) -> Self {
        Self { db, scheduler }
    }

    /// Tear down a task: cancel and delete all of its notifications, then
    /// remove the task row itself.
    pub async fn task_deleted(&self, task_id: Uuid) -> Result<(), DatabaseError> {
        let notifications = self.db.list_notifications_for_task(task_id).await?;
        for notification in &notifications {
            self.scheduler.cancel(notification.id).await;
        }
        let removed = self.db.delete_notifications_for_task(task_id).await?;

        if self.db.delete_task(task_id).await? {
            info!(id = %task_id, notifications = removed, "Deleted task");
        } else {
            debug!(id = %task_id, "Delete for unknown task");
        }
        Ok(())
    }

    /// React to a status transition.
    ///
    /// Completing a task silences its timers but keeps the records, so
    /// un-completing can bring them back. Leaving done re-arms whatever
    /// is still unsent and in the future.
    pub async fn task_status_changed(
        &self,
        task: &Task,
        previous: TaskStatus,
    ) -> Result<(), DatabaseError> {
        if task.status == previous {
            return Ok(());
        }

        if task.status.is_done() {
            let notifications = self.db.list_notifications_for_task(task.id).await?;
            let mut silenced = 0usize;
            for notification in &notifications {
                if self.scheduler.cancel(notification.id).await {
                    silenced += 1;
                }
            }
            debug!(id = %task.id, silenced, "Task completed, timers silenced");
        } else if previous.is_done() {
            let mut rearmed = 0usize;
            for notification in self.db.list_notifications_for_task(task.id).await? {
                if self.scheduler.schedule(notification).await {
                    rearmed += 1;
                }
            }
            debug!(id = %task.id, rearmed, "Task reopened, notifications re-armed");
        }
        Ok(())
    }

    /// Keep the task's single planned-time notification matching
    /// `task.planned_time`.
    ///
    /// Set or changed: update the soonest existing record (its sent
    /// marker is left alone) or insert a fresh one, and drop any surplus
    /// duplicates left behind by older versions. Cleared: cancel and
    /// delete. The timer is only armed while the task is not done.
    pub async fn planned_time_changed(&self, task: &Task) -> Result<(), DatabaseError> {
        let existing: Vec<Notification> = self
            .db
            .list_notifications_for_task(task.id)
            .await?
            .into_iter()
            .filter(|n| n.kind == NotificationKind::PlannedTime)
            .collect();

        let Some(at) = task.planned_time else {
            for notification in &existing {
                self.scheduler.cancel(notification.id).await;
                self.db.delete_notification(notification.id).await?;
            }
            if !existing.is_empty() {
                debug!(id = %task.id, "Planned-time notification removed");
            }
            return Ok(());
        };

        let message = format!("Time to start \"{}\"", task.name);
        let notification = match existing.first() {
            Some(current) => {
                let mut updated = current.clone();
                updated.time = at;
                updated.message = message;
                self.db.update_notification(&updated).await?;
                updated
            }
            None => {
                let created =
                    Notification::new(task.id, at, NotificationKind::PlannedTime, message);
                self.db.insert_notification(&created).await?;
                created
            }
        };
        for surplus in existing.iter().skip(1) {
            self.scheduler.cancel(surplus.id).await;
            self.db.delete_notification(surplus.id).await?;
        }

        if task.status.is_done() {
            self.scheduler.cancel(notification.id).await;
        } else {
            self.scheduler.schedule(notification).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::notify::sink::LogSink;
    use crate::store::libsql_backend::LibSqlBackend;
    use crate::tasks::model::Task;

    use super::*;

    async fn setup() -> (Arc<dyn Database>, Arc<NotificationScheduler>, Coordinator) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let scheduler = NotificationScheduler::new(db.clone(), Arc::new(LogSink));
        let coordinator = Coordinator::new(db.clone(), scheduler.clone());
        (db, scheduler, coordinator)
    }

    async fn seed_task(db: &Arc<dyn Database>, task: &Task) {
        db.create_task(task).await.unwrap();
    }

    fn reminder_in(task: &Task, minutes: i64) -> Notification {
        Notification::new(
            task.id,
            Utc::now() + Duration::minutes(minutes),
            NotificationKind::Reminder,
            "reminder",
        )
    }

    #[tokio::test]
    async fn deleting_a_task_cancels_and_removes_everything() {
        let (db, scheduler, coordinator) = setup().await;
        let task = Task::new("doomed");
        seed_task(&db, &task).await;

        for minutes in [5, 10] {
            let n = reminder_in(&task, minutes);
            db.insert_notification(&n).await.unwrap();
            assert!(scheduler.schedule(n).await);
        }
        assert_eq!(scheduler.armed_count().await, 2);

        coordinator.task_deleted(task.id).await.unwrap();

        assert_eq!(scheduler.armed_count().await, 0);
        assert!(db
            .list_notifications_for_task(task.id)
            .await
            .unwrap()
            .is_empty());
        assert!(db.get_task(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_an_unknown_task_is_a_noop() {
        let (_db, _scheduler, coordinator) = setup().await;
        coordinator.task_deleted(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn completing_silences_timers_but_keeps_records() {
        let (db, scheduler, coordinator) = setup().await;
        let task = Task::new("almost done");
        seed_task(&db, &task).await;

        let n = reminder_in(&task, 30);
        db.insert_notification(&n).await.unwrap();
        assert!(scheduler.schedule(n.clone()).await);

        let mut done = task.clone();
        done.status = TaskStatus::Done;
        coordinator
            .task_status_changed(&done, TaskStatus::Planning)
            .await
            .unwrap();

        assert!(!scheduler.is_armed(n.id).await);
        let records = db.list_notifications_for_task(task.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_sent());
    }

    #[tokio::test]
    async fn reopening_rearms_only_future_unsent() {
        let (db, scheduler, coordinator) = setup().await;
        let task = Task::new("back again").with_status(TaskStatus::Done);
        seed_task(&db, &task).await;

        let future = reminder_in(&task, 30);
        let past = reminder_in(&task, -30);
        let sent = reminder_in(&task, 60);
        for n in [&future, &past, &sent] {
            db.insert_notification(n).await.unwrap();
        }
        db.mark_notification_sent(sent.id, Utc::now()).await.unwrap();

        let mut reopened = task.clone();
        reopened.status = TaskStatus::Doing;
        coordinator
            .task_status_changed(&reopened, TaskStatus::Done)
            .await
            .unwrap();

        assert!(scheduler.is_armed(future.id).await);
        assert!(!scheduler.is_armed(past.id).await);
        assert!(!scheduler.is_armed(sent.id).await);
    }

    #[tokio::test]
    async fn unchanged_status_does_nothing() {
        let (db, scheduler, coordinator) = setup().await;
        let task = Task::new("steady");
        seed_task(&db, &task).await;

        let n = reminder_in(&task, 30);
        db.insert_notification(&n).await.unwrap();
        assert!(scheduler.schedule(n.clone()).await);

        coordinator
            .task_status_changed(&task, task.status)
            .await
            .unwrap();
        assert!(scheduler.is_armed(n.id).await);
    }

    #[tokio::test]
    async fn planned_time_set_maintains_one_notification() {
        let (db, scheduler, coordinator) = setup().await;
        let first_time = Utc::now() + Duration::minutes(45);
        let task = Task::new("planned").with_planned_time(first_time);
        seed_task(&db, &task).await;

        coordinator.planned_time_changed(&task).await.unwrap();

        let records = db.list_notifications_for_task(task.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, NotificationKind::PlannedTime);
        assert!(scheduler.is_armed(records[0].id).await);

        // Moving the planned time updates the same record in place.
        let later = Utc::now() + Duration::minutes(90);
        let moved = task.clone().with_planned_time(later);
        coordinator.planned_time_changed(&moved).await.unwrap();

        let records = db.list_notifications_for_task(task.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, scheduler.next_fire_time(records[0].id).await.unwrap());
        assert!(records[0].time > first_time);
    }

    #[tokio::test]
    async fn planned_time_cleared_removes_only_that_kind() {
        let (db, scheduler, coordinator) = setup().await;
        let task = Task::new("unpinned").with_planned_time(Utc::now() + Duration::minutes(45));
        seed_task(&db, &task).await;
        coordinator.planned_time_changed(&task).await.unwrap();

        let reminder = reminder_in(&task, 30);
        db.insert_notification(&reminder).await.unwrap();

        let mut cleared = task.clone();
        cleared.planned_time = None;
        coordinator.planned_time_changed(&cleared).await.unwrap();

        let records = db.list_notifications_for_task(task.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, NotificationKind::Reminder);
    }

    #[tokio::test]
    async fn surplus_planned_time_duplicates_fold_into_one() {
        let (db, _scheduler, coordinator) = setup().await;
        let planned = Utc::now() + Duration::hours(3);
        let task = Task::new("deduped").with_planned_time(planned);
        seed_task(&db, &task).await;

        let older = Notification::new(
            task.id,
            Utc::now() + Duration::hours(1),
            NotificationKind::PlannedTime,
            "dup one",
        );
        let newer = Notification::new(
            task.id,
            Utc::now() + Duration::hours(2),
            NotificationKind::PlannedTime,
            "dup two",
        );
        db.insert_notification(&older).await.unwrap();
        db.insert_notification(&newer).await.unwrap();

        coordinator.planned_time_changed(&task).await.unwrap();

        let records = db.list_notifications_for_task(task.id).await.unwrap();
        assert_eq!(records.len(), 1);
        // The soonest record survived and now carries the planned time.
        assert_eq!(records[0].id, older.id);
        assert_eq!(records[0].time, planned);
    }

    #[tokio::test]
    async fn planned_time_on_done_task_is_not_armed() {
        let (db, scheduler, coordinator) = setup().await;
        let task = Task::new("done but planned")
            .with_status(TaskStatus::Done)
            .with_planned_time(Utc::now() + Duration::minutes(45));
        seed_task(&db, &task).await;

        coordinator.planned_time_changed(&task).await.unwrap();

        let records = db.list_notifications_for_task(task.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!scheduler.is_armed(records[0].id).await);
    }
}
