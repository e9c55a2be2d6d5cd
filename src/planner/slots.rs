//! Interval arithmetic for the day planner.
//!
//! All intervals are half-open `[start, end)` so back-to-back slots touch
//! without overlapping.

use chrono::{DateTime, Duration, Utc};

/// A half-open interval on the day's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Slot {
    /// Build a slot; `end` is clamped up to `start` so a slot is never
    /// negative-length.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Slot starting at `start` and lasting `minutes`.
    pub fn from_start(start: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(i64::from(minutes)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Half-open overlap test: `[1,2)` and `[2,3)` do not overlap.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The part of this slot inside `window`, if any remains.
    pub fn clamp_to(&self, window: &Slot) -> Option<Slot> {
        let start = self.start.max(window.start);
        let end = self.end.min(window.end);
        (start < end).then_some(Slot { start, end })
    }
}

/// A free interval between occupied slots.
///
/// `after_occupied` records whether an occupied slot ends exactly where
/// this gap begins; the planner's buffer applies only to those gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub slot: Slot,
    pub after_occupied: bool,
}

/// Merge arbitrary slots into a sorted list of disjoint ones.
///
/// Empty slots are dropped; touching slots join into one.
pub fn merge_slots(mut slots: Vec<Slot>) -> Vec<Slot> {
    slots.retain(|s| !s.is_empty());
    slots.sort_by_key(|s| s.start);

    let mut merged: Vec<Slot> = Vec::with_capacity(slots.len());
    for slot in slots {
        match merged.last_mut() {
            Some(last) if slot.start <= last.end => {
                last.end = last.end.max(slot.end);
            }
            _ => merged.push(slot),
        }
    }
    merged
}

/// Free gaps of `window` not covered by `occupied`.
///
/// `occupied` must be sorted and disjoint (see [`merge_slots`]); slots
/// outside the window are ignored. Gaps come back in time order.
pub fn gaps(window: &Slot, occupied: &[Slot]) -> Vec<Gap> {
    let mut out = Vec::new();
    let mut cursor = window.start;
    let mut after_occupied = false;

    for slot in occupied {
        let Some(inside) = slot.clamp_to(window) else {
            continue;
        };
        if inside.start > cursor {
            out.push(Gap {
                slot: Slot::new(cursor, inside.start),
                after_occupied,
            });
        }
        cursor = cursor.max(inside.end);
        after_occupied = true;
    }

    if cursor < window.end {
        out.push(Gap {
            slot: Slot::new(cursor, window.end),
            after_occupied,
        });
    }
    out
}
