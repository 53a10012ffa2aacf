//! Schedule Cache
//!
//! Activity lists keyed by unit id. Every update replaces a unit's whole
//! list; the backend never sends partial schedule deltas.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use groundlink_types::ScheduleActivity;
use serde::{Deserialize, Serialize};

/// How a delivered list is ordered before it is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleOrdering {
    /// Keep delivery order as-is
    Source,
    /// Stable sort by start instant; equal starts keep delivery order
    #[default]
    StartTime,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleCache {
    schedules: HashMap<String, Vec<ScheduleActivity>>,
    ordering: ScheduleOrdering,
}

impl ScheduleCache {
    pub fn new(ordering: ScheduleOrdering) -> Self {
        Self {
            schedules: HashMap::new(),
            ordering,
        }
    }

    /// Replace one unit's full schedule
    pub fn set_all(&mut self, id: impl Into<String>, mut activities: Vec<ScheduleActivity>) {
        if self.ordering == ScheduleOrdering::StartTime {
            activities.sort_by_key(|activity| activity.start_time);
        }
        self.schedules.insert(id.into(), activities);
    }

    /// `set_all` for every entry; ids not in the map are left alone
    pub fn set_many(&mut self, schedules: BTreeMap<String, Vec<ScheduleActivity>>) {
        for (id, activities) in schedules {
            self.set_all(id, activities);
        }
    }

    /// Cached list for a unit; empty when none is cached
    pub fn get(&self, id: &str) -> &[ScheduleActivity] {
        self.schedules.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether an entry (possibly empty) exists for `id`
    pub fn contains(&self, id: &str) -> bool {
        self.schedules.contains_key(id)
    }

    /// Remove entries for ids outside `valid_ids`, returning what was removed
    pub fn prune<S>(&mut self, valid_ids: &HashSet<S>) -> Vec<String>
    where
        S: Borrow<str> + Hash + Eq,
    {
        let stale: Vec<String> = self
            .schedules
            .keys()
            .filter(|id| !valid_ids.contains(id.as_str()))
            .cloned()
            .collect();

        for id in &stale {
            self.schedules.remove(id);
        }
        stale
    }

    /// Remove the entry for one id
    pub fn prune_one(&mut self, id: &str) -> bool {
        self.schedules.remove(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.schedules.keys().map(String::as_str)
    }

    /// Every cached schedule, ordered by unit id
    pub fn to_map(&self) -> BTreeMap<String, Vec<ScheduleActivity>> {
        self.schedules
            .iter()
            .map(|(id, activities)| (id.clone(), activities.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }
}
