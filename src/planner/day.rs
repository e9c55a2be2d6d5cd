//! Day planner — fits due tasks into today's free working hours.
//!
//! Two-pass first-fit heuristic: pass 1 walks a forward-only cursor in
//! priority order, pass 2 retries the leftovers against every remaining
//! gap. Deliberately a heuristic, not an optimal packer.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PlannerConfig;
use crate::error::PlannerError;
use crate::planner::slots::{gaps, merge_slots, Slot};
use crate::store::traits::Database;
use crate::tasks::model::Task;

/// Result of a day-planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    /// Tasks that received a planned time, soonest first.
    pub scheduled: Vec<Task>,
    /// Candidates that did not fit or whose commit failed.
    pub unscheduled: Vec<Task>,
    /// Human-readable summary for the UI.
    pub message: String,
}

/// First-fit planner over the task store.
pub struct DayPlanner {
    db: Arc<dyn Database>,
    config: PlannerConfig,
}

impl DayPlanner {
    pub fn new(db: Arc<dyn Database>, config: PlannerConfig) -> Self {
        Self { db, config }
    }

    /// Plan the day around `now`: pick candidates due today, fit them
    /// into the free working hours, and persist each placement.
    ///
    /// A failed placement write demotes that task to `unscheduled`; the
    /// run itself only fails when the store cannot be read at all.
    pub async fn plan_day(&self, now: DateTime<Utc>) -> Result<PlanOutcome, PlannerError> {
        if self.config.work_start >= self.config.work_end {
            return Err(PlannerError::InvalidWindow(format!(
                "work start {} is not before work end {}",
                self.config.work_start, self.config.work_end
            )));
        }

        let today = now.date_naive();
        let candidates: Vec<Task> = self
            .db
            .list_tasks_due_on(today)
            .await?
            .into_iter()
            .filter(|t| t.status.is_plannable())
            .filter(|t| t.planned_time.is_none_or(|at| at < now))
            .collect();

        if candidates.is_empty() {
            debug!("No candidate tasks for today");
            return Ok(PlanOutcome {
                scheduled: Vec::new(),
                unscheduled: Vec::new(),
                message: "No tasks due today need scheduling.".to_string(),
            });
        }

        let Some(window) = planning_window(now, &self.config) else {
            info!(candidates = candidates.len(), "Working day is over, nothing to plan into");
            return Ok(PlanOutcome {
                scheduled: Vec::new(),
                unscheduled: candidates,
                message: "The working day is already over; nothing was scheduled.".to_string(),
            });
        };

        // Everything else planned today blocks its slot, candidates with a
        // stale planned time do not (they are being re-planned).
        let day_start = today.and_time(NaiveTime::MIN).and_utc();
        let candidate_ids: HashSet<Uuid> = candidates.iter().map(|t| t.id).collect();
        let busy: Vec<Slot> = self
            .db
            .list_tasks_planned_between(day_start, day_start + Duration::days(1))
            .await?
            .into_iter()
            .filter(|t| !candidate_ids.contains(&t.id))
            .filter_map(|t| {
                t.planned_time.map(|at| {
                    Slot::from_start(at, t.duration_or(self.config.default_duration_minutes))
                })
            })
            .collect();

        let total = candidates.len();
        let (placements, unplaced) = compute_plan(window, &self.config, candidates, busy);

        let mut scheduled = Vec::with_capacity(placements.len());
        let mut unscheduled = unplaced;
        for (mut task, start) in placements {
            match self.db.set_task_planned_time(task.id, Some(start)).await {
                Ok(()) => {
                    task.planned_time = Some(start);
                    scheduled.push(task);
                }
                Err(e) => {
                    warn!(
                        id = %task.id,
                        error = %e,
                        "Failed to save planned time, task stays unscheduled"
                    );
                    unscheduled.push(task);
                }
            }
        }
        scheduled.sort_by_key(|t| t.planned_time);

        info!(
            scheduled = scheduled.len(),
            unscheduled = unscheduled.len(),
            "Planned the day"
        );
        let message = plan_message(scheduled.len(), total);
        Ok(PlanOutcome {
            scheduled,
            unscheduled,
            message,
        })
    }
}

/// The plannable part of today, or `None` once the day is over.
///
/// Planning before the working day starts uses the full day; planning
/// mid-day starts at `now + buffer` so the first placement still gets
/// its transition room.
fn planning_window(now: DateTime<Utc>, config: &PlannerConfig) -> Option<Slot> {
    let today = now.date_naive();
    let work_start = today.and_time(config.work_start).and_utc();
    let work_end = today.and_time(config.work_end).and_utc();

    let planning_start = if now <= work_start {
        work_start
    } else {
        now + Duration::minutes(i64::from(config.buffer_minutes))
    };

    (planning_start < work_end).then(|| Slot::new(planning_start, work_end))
}

/// Mutable occupancy state threaded through both placement passes.
struct PlanBoard {
    window: Slot,
    buffer_minutes: u32,
    occupied: Vec<Slot>,
}

impl PlanBoard {
    fn new(window: Slot, buffer_minutes: u32, busy: Vec<Slot>) -> Self {
        let clamped = busy.iter().filter_map(|s| s.clamp_to(&window)).collect();
        Self {
            window,
            buffer_minutes,
            occupied: merge_slots(clamped),
        }
    }

    /// Earliest admissible start for a task of `minutes`, no earlier than
    /// `not_before` when given (the pass-1 cursor). A gap that follows an
    /// occupied slot reserves the buffer before the start.
    fn find_fit(&self, minutes: u32, not_before: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        let duration = Duration::minutes(i64::from(minutes));
        let buffer = Duration::minutes(i64::from(self.buffer_minutes));

        for gap in gaps(&self.window, &self.occupied) {
            if not_before.is_some_and(|cursor| gap.slot.start < cursor) {
                continue;
            }
            let earliest = if gap.after_occupied {
                gap.slot.start + buffer
            } else {
                gap.slot.start
            };
            if earliest + duration <= gap.slot.end {
                return Some(earliest);
            }
        }
        None
    }

    fn commit(&mut self, slot: Slot) {
        self.occupied.push(slot);
        self.occupied = merge_slots(std::mem::take(&mut self.occupied));
    }
}

/// Pure placement core: order candidates, then run both passes.
///
/// Returns placements in the order they were committed plus the tasks
/// that found no slot.
fn compute_plan(
    window: Slot,
    config: &PlannerConfig,
    mut candidates: Vec<Task>,
    busy: Vec<Slot>,
) -> (Vec<(Task, DateTime<Utc>)>, Vec<Task>) {
    candidates.sort_by_key(|t| {
        (
            t.priority.sort_index(),
            t.duration_or(config.default_duration_minutes),
            t.created_at,
        )
    });

    let mut board = PlanBoard::new(window, config.buffer_minutes, busy);
    let mut placements = Vec::new();
    let mut leftover = Vec::new();

    // Pass 1: forward-only cursor, first fit per task.
    let mut cursor = window.start;
    for task in candidates {
        let minutes = task.duration_or(config.default_duration_minutes);
        match board.find_fit(minutes, Some(cursor)) {
            Some(start) => {
                let slot = Slot::from_start(start, minutes);
                cursor = slot.end;
                board.commit(slot);
                debug!(id = %task.id, start = %start, minutes, "Placed in pass 1");
                placements.push((task, start));
            }
            None => leftover.push(task),
        }
    }

    // Pass 2: leftovers may still fit in gaps the cursor walked past.
    let mut unplaced = Vec::new();
    for task in leftover {
        let minutes = task.duration_or(config.default_duration_minutes);
        match board.find_fit(minutes, None) {
            Some(start) => {
                board.commit(Slot::from_start(start, minutes));
                debug!(id = %task.id, start = %start, minutes, "Placed in pass 2");
                placements.push((task, start));
            }
            None => unplaced.push(task),
        }
    }

    (placements, unplaced)
}

fn plan_message(scheduled: usize, total: usize) -> String {
    match (scheduled, total) {
        (0, _) => "No free time left today; nothing was scheduled.".to_string(),
        (1, 1) => "Scheduled 1 task for today.".to_string(),
        (s, t) if s == t => format!("Scheduled {s} tasks for today."),
        (s, t) => format!("Scheduled {s} of {t} tasks; not enough free time for the rest."),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::store::libsql_backend::LibSqlBackend;
    use crate::tasks::model::{TaskPriority, TaskStatus};

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).single().unwrap()
    }

    fn test_config() -> PlannerConfig {
        PlannerConfig {
            work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            work_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            buffer_minutes: 10,
            default_duration_minutes: 30,
        }
    }

    async fn setup() -> (Arc<dyn Database>, DayPlanner) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let planner = DayPlanner::new(db.clone(), test_config());
        (db, planner)
    }

    #[test]
    fn window_starts_at_work_start_before_the_day() {
        let config = test_config();
        let w = planning_window(at(7, 30), &config).unwrap();
        assert_eq!(w.start, at(9, 0));
        assert_eq!(w.end, at(17, 0));
    }

    #[test]
    fn window_starts_at_now_plus_buffer_mid_day() {
        let config = test_config();
        let w = planning_window(at(13, 0), &config).unwrap();
        assert_eq!(w.start, at(13, 10));
    }

    #[test]
    fn no_window_once_the_day_is_over() {
        let config = test_config();
        assert!(planning_window(at(17, 0), &config).is_none());
        // 16:55 + 10 min buffer lands past the end of the day.
        assert!(planning_window(at(16, 55), &config).is_none());
    }

    #[test]
    fn places_high_priority_then_shorter_first() {
        let config = test_config();
        let t1 = Task::new("write report")
            .with_duration(30)
            .with_priority(TaskPriority::High);
        let t2 = Task::new("review backlog")
            .with_duration(60)
            .with_priority(TaskPriority::Low);
        let t3 = Task::new("send invoice")
            .with_duration(15)
            .with_priority(TaskPriority::High);

        let window = Slot::new(at(9, 0), at(17, 0));
        let (placements, unplaced) = compute_plan(
            window,
            &config,
            vec![t1.clone(), t2.clone(), t3.clone()],
            Vec::new(),
        );

        assert!(unplaced.is_empty());
        assert_eq!(placements.len(), 3);
        assert_eq!(placements[0].0.id, t3.id);
        assert_eq!(placements[0].1, at(9, 0));
        assert_eq!(placements[1].0.id, t1.id);
        assert_eq!(placements[1].1, at(9, 25));
        assert_eq!(placements[2].0.id, t2.id);
        assert_eq!(placements[2].1, at(10, 5));
    }

    #[test]
    fn pass_one_prefers_the_first_valid_gap() {
        let mut config = test_config();
        config.buffer_minutes = 5;

        let window = planning_window(at(9, 50), &config).unwrap();
        assert_eq!(window.start, at(9, 55));

        let task = Task::new("prep demo").with_duration(40);
        let busy = vec![Slot::new(at(11, 0), at(11, 30))];
        let (placements, unplaced) = compute_plan(window, &config, vec![task], busy);

        assert!(unplaced.is_empty());
        // Before the busy slot, not 11:35 after it.
        assert_eq!(placements[0].1, at(9, 55));
    }

    #[test]
    fn pass_two_fills_gaps_the_cursor_walked_past() {
        let config = test_config();
        let window = Slot::new(at(9, 0), at(12, 0));
        let big = Task::new("deep work")
            .with_duration(100)
            .with_priority(TaskPriority::High);
        let small = Task::new("expense report")
            .with_duration(20)
            .with_priority(TaskPriority::Low);
        let busy = vec![Slot::new(at(9, 30), at(10, 0))];

        let (placements, unplaced) =
            compute_plan(window, &config, vec![big.clone(), small.clone()], busy);

        assert!(unplaced.is_empty());
        let start_of = |id: Uuid| {
            placements
                .iter()
                .find(|(t, _)| t.id == id)
                .map(|(_, s)| *s)
        };
        // The big task skipped the leading gap; the small one came back for it.
        assert_eq!(start_of(big.id), Some(at(10, 10)));
        assert_eq!(start_of(small.id), Some(at(9, 0)));
    }

    #[test]
    fn layout_never_overlaps_and_keeps_the_buffer() {
        let config = test_config();
        let window = Slot::new(at(9, 0), at(17, 0));
        let busy = vec![
            Slot::new(at(10, 0), at(10, 45)),
            Slot::new(at(13, 0), at(14, 0)),
        ];
        let candidates = vec![
            Task::new("a").with_duration(90),
            Task::new("b").with_duration(25).with_priority(TaskPriority::High),
            Task::new("c"),
            Task::new("d").with_duration(240).with_priority(TaskPriority::Low),
            Task::new("e").with_duration(15).with_priority(TaskPriority::High),
        ];

        let (placements, unplaced) = compute_plan(window, &config, candidates, busy.clone());
        assert_eq!(placements.len(), 4);
        assert_eq!(unplaced.len(), 1);
        assert_eq!(unplaced[0].name, "d");

        let placed: Vec<Slot> = placements
            .iter()
            .map(|(t, s)| Slot::from_start(*s, t.duration_or(30)))
            .collect();
        let mut all = busy;
        all.extend(placed.iter().copied());

        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
        for p in &placed {
            assert!(p.start >= window.start && p.end <= window.end);
            let prev_end = all.iter().filter(|o| o.end <= p.start).map(|o| o.end).max();
            if let Some(end) = prev_end {
                assert!(
                    p.start - end >= Duration::minutes(10),
                    "placement at {} too close to {}",
                    p.start,
                    end
                );
            }
        }
    }

    #[tokio::test]
    async fn plan_day_commits_planned_times() {
        let (db, planner) = setup().await;
        let now = at(9, 0);
        let today = now.date_naive();

        let first = Task::new("write report")
            .with_duration(30)
            .with_priority(TaskPriority::High)
            .with_due_date(today);
        let second = Task::new("inbox zero")
            .with_duration(60)
            .with_priority(TaskPriority::Low)
            .with_due_date(today);
        db.create_task(&first).await.unwrap();
        db.create_task(&second).await.unwrap();

        let outcome = planner.plan_day(now).await.unwrap();
        assert_eq!(outcome.scheduled.len(), 2);
        assert!(outcome.unscheduled.is_empty());
        assert_eq!(outcome.message, "Scheduled 2 tasks for today.");

        let stored = db.get_task(first.id).await.unwrap().unwrap();
        assert_eq!(stored.planned_time, Some(at(9, 0)));
        let stored = db.get_task(second.id).await.unwrap().unwrap();
        assert_eq!(stored.planned_time, Some(at(9, 40)));
    }

    #[tokio::test]
    async fn plan_day_skips_done_doing_and_future_planned() {
        let (db, planner) = setup().await;
        let now = at(9, 0);
        let today = now.date_naive();

        let plannable = Task::new("plannable").with_due_date(today).with_duration(30);
        let doing = Task::new("in progress")
            .with_due_date(today)
            .with_status(TaskStatus::Doing);
        let done = Task::new("finished")
            .with_due_date(today)
            .with_status(TaskStatus::Done);
        let pinned = Task::new("standup")
            .with_due_date(today)
            .with_duration(30)
            .with_planned_time(at(10, 0));
        for task in [&plannable, &doing, &done, &pinned] {
            db.create_task(task).await.unwrap();
        }

        let outcome = planner.plan_day(now).await.unwrap();
        let ids: Vec<Uuid> = outcome.scheduled.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![plannable.id]);

        // The already-planned task keeps its slot.
        let stored = db.get_task(pinned.id).await.unwrap().unwrap();
        assert_eq!(stored.planned_time, Some(at(10, 0)));
    }

    #[tokio::test]
    async fn plan_day_schedules_around_other_planned_tasks() {
        let (db, planner) = setup().await;
        let now = at(9, 0);
        let today = now.date_naive();

        let meeting = Task::new("kickoff")
            .with_due_date(today)
            .with_duration(30)
            .with_planned_time(at(10, 0));
        let focus = Task::new("design doc").with_due_date(today).with_duration(120);
        db.create_task(&meeting).await.unwrap();
        db.create_task(&focus).await.unwrap();

        let outcome = planner.plan_day(now).await.unwrap();
        assert_eq!(outcome.scheduled.len(), 1);
        // 120 minutes does not fit before the 10:00 meeting; next start
        // after it is 10:30 + buffer.
        assert_eq!(outcome.scheduled[0].planned_time, Some(at(10, 40)));
    }

    #[tokio::test]
    async fn plan_day_with_nothing_due_reports_cleanly() {
        let (_db, planner) = setup().await;
        let outcome = planner.plan_day(at(9, 0)).await.unwrap();
        assert!(outcome.scheduled.is_empty());
        assert!(outcome.unscheduled.is_empty());
        assert_eq!(outcome.message, "No tasks due today need scheduling.");
    }

    #[tokio::test]
    async fn plan_day_after_hours_leaves_everything_unscheduled() {
        let (db, planner) = setup().await;
        let now = at(18, 0);
        let task = Task::new("too late").with_due_date(now.date_naive());
        db.create_task(&task).await.unwrap();

        let outcome = planner.plan_day(now).await.unwrap();
        assert!(outcome.scheduled.is_empty());
        assert_eq!(outcome.unscheduled.len(), 1);
        assert_eq!(
            db.get_task(task.id).await.unwrap().unwrap().planned_time,
            None
        );
    }

    #[tokio::test]
    async fn plan_day_replans_missed_planned_times() {
        let (db, planner) = setup().await;
        let now = at(13, 0);
        let missed = Task::new("missed it")
            .with_due_date(now.date_naive())
            .with_duration(30)
            .with_planned_time(at(8, 0));
        db.create_task(&missed).await.unwrap();

        let outcome = planner.plan_day(now).await.unwrap();
        assert_eq!(outcome.scheduled.len(), 1);
        assert_eq!(outcome.scheduled[0].planned_time, Some(at(13, 10)));
    }

    #[tokio::test]
    async fn plan_day_reports_partial_fits() {
        let (db, planner) = setup().await;
        let now = at(15, 0);
        let today = now.date_naive();

        let fits = Task::new("quick fix")
            .with_due_date(today)
            .with_duration(60)
            .with_priority(TaskPriority::High);
        let too_big = Task::new("rewrite everything")
            .with_due_date(today)
            .with_duration(300);
        db.create_task(&fits).await.unwrap();
        db.create_task(&too_big).await.unwrap();

        let outcome = planner.plan_day(now).await.unwrap();
        assert_eq!(outcome.scheduled.len(), 1);
        assert_eq!(outcome.unscheduled.len(), 1);
        assert_eq!(outcome.unscheduled[0].id, too_big.id);
        assert_eq!(
            outcome.message,
            "Scheduled 1 of 2 tasks; not enough free time for the rest."
        );
    }

    #[tokio::test]
    async fn degenerate_working_hours_error() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mut config = test_config();
        config.work_end = config.work_start;
        let planner = DayPlanner::new(db, config);

        let result = planner.plan_day(at(9, 0)).await;
        assert!(matches!(result, Err(PlannerError::InvalidWindow(_))));
    }
}
