//! Task domain — data model plus the WebSocket and planning API.

pub mod model;
pub mod ws;

pub use model::{Task, TaskPriority, TaskStatus};
pub use ws::{TaskState, task_routes};
