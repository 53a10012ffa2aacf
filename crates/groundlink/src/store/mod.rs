//! Unit Stores
//!
//! In-memory state for the dashboard: the entity store (units by id) and
//! the schedule cache (activity lists by unit id). Both are plain data with
//! no I/O; only the reconciler mutates them.

mod entity;
mod schedule;

pub use entity::{Churn, EntityStore, Upsert};
pub use schedule::{ScheduleCache, ScheduleOrdering};

use chrono::{DateTime, Utc};
use groundlink_types::{FieldUnit, ScheduleActivity};

/// Read-only view over both stores, handed to render adapters
#[derive(Debug, Clone, Copy)]
pub struct StoreView<'a> {
    pub entities: &'a EntityStore,
    pub schedules: &'a ScheduleCache,
}

impl<'a> StoreView<'a> {
    pub fn unit(&self, id: &str) -> Option<&'a FieldUnit> {
        self.entities.get(id)
    }

    pub fn schedule(&self, id: &str) -> &'a [ScheduleActivity] {
        self.schedules.get(id)
    }

    /// The pass a unit is scheduled to be working at `at`
    pub fn pass_at(&self, id: &str, at: DateTime<Utc>) -> Option<&'a ScheduleActivity> {
        self.schedule(id).iter().find(|activity| activity.covers(at))
    }
}
