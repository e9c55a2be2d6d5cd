//! Task data model — items, enums, and WebSocket message types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Planning,
    Doing,
    Done,
}

impl TaskStatus {
    /// Completed tasks get no reminders and are never auto-planned.
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }

    /// Only tasks still in planning are candidates for the day planner.
    pub fn is_plannable(&self) -> bool {
        matches!(self, TaskStatus::Planning)
    }
}

/// Task priority. Ordering is used by the day planner (high first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    /// Sort key for planning: lower index is planned earlier.
    pub fn sort_index(&self) -> u8 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Medium => 1,
            TaskPriority::Low => 2,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

/// A single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique ID.
    pub id: Uuid,
    /// Short name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Estimated duration in minutes. Scheduling assumes a default when
    /// absent but never writes that default back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Calendar date the task is due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// When the task is slotted to be worked on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_time: Option<DateTime<Utc>>,
    /// Optional owning project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Planning priority.
    pub priority: TaskPriority,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task with sensible defaults.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            duration_minutes: None,
            due_date: None,
            planned_time: None,
            project_id: None,
            status: TaskStatus::Planning,
            priority: TaskPriority::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Builder: set estimated duration in minutes.
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    /// Builder: set due date.
    pub fn with_due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Builder: set planned time.
    pub fn with_planned_time(mut self, at: DateTime<Utc>) -> Self {
        self.planned_time = Some(at);
        self
    }

    /// Builder: set priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: set owning project.
    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Duration used for scheduling arithmetic; the stored value stays
    /// untouched when absent.
    pub fn duration_or(&self, default_minutes: u32) -> u32 {
        self.duration_minutes.unwrap_or(default_minutes)
    }
}

/// Actions a client can send over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TaskAction {
    /// Create a new task.
    Create {
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        duration_minutes: Option<u32>,
        #[serde(default)]
        due_date: Option<NaiveDate>,
        #[serde(default)]
        planned_time: Option<DateTime<Utc>>,
        #[serde(default)]
        priority: Option<TaskPriority>,
        #[serde(default)]
        project_id: Option<Uuid>,
    },
    /// Update fields on a task. Absent fields stay unchanged.
    Update {
        id: Uuid,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        duration_minutes: Option<u32>,
        #[serde(default)]
        due_date: Option<NaiveDate>,
        #[serde(default)]
        status: Option<TaskStatus>,
        #[serde(default)]
        priority: Option<TaskPriority>,
    },
    /// Mark a task as done.
    Complete { id: Uuid },
    /// Slot the task at a concrete time.
    SetPlannedTime { id: Uuid, planned_time: DateTime<Utc> },
    /// Remove the task's planned time.
    ClearPlannedTime { id: Uuid },
    /// Delete a task.
    Delete { id: Uuid },
    /// Ask for a one-off reminder at a given time.
    Remind {
        id: Uuid,
        time: DateTime<Utc>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Messages sent over the WebSocket (server → client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskWsMessage {
    /// Full sync of non-done tasks (sent on connect).
    TasksSync { tasks: Vec<Task> },
    /// A new task was created.
    TaskCreated { task: Task },
    /// A task was updated.
    TaskUpdated { task: Task },
    /// A task was deleted.
    TaskDeleted { id: Uuid },
}
