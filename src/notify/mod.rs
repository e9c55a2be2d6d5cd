//! Notifications — data model, timer scheduler, delivery sink, and WS surface.

pub mod clock;
pub mod model;
pub mod scheduler;
pub mod sink;
pub mod ws;

pub use model::{Notification, NotificationKind};
pub use scheduler::NotificationScheduler;
pub use sink::NotificationSink;
