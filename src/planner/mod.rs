//! Day planning — first-fit placement of due tasks into working hours.

pub mod day;
pub mod slots;

pub use day::{DayPlanner, PlanOutcome};
pub use slots::Slot;
