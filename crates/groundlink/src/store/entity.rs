//! Entity Store
//!
//! Field units keyed by id. Iteration follows the order of the last full
//! replace; units first seen through a patch are appended.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use groundlink_types::{FieldUnit, UnitPatch};

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Key-set difference produced by a full replace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Churn {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub kept: BTreeSet<String>,
}

/// In-memory map from unit id to its last-known attributes
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    units: HashMap<String, FieldUnit>,
    order: Vec<String>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sparse-merge a patch into its unit, creating the unit with defaults
    /// if it has never been seen.
    pub fn upsert(&mut self, patch: &UnitPatch, seen_at: DateTime<Utc>) -> Upsert {
        if let Some(unit) = self.units.get_mut(&patch.id) {
            patch.apply(unit);
            unit.last_seen = Some(seen_at);
            return Upsert::Updated;
        }

        let mut unit = FieldUnit::new(patch.id.clone());
        patch.apply(&mut unit);
        unit.last_seen = Some(seen_at);

        self.order.push(patch.id.clone());
        self.units.insert(patch.id.clone(), unit);
        Upsert::Created
    }

    /// Swap in a complete new unit set in one step.
    ///
    /// Ids missing from `units` are dropped. For duplicate ids the first
    /// occurrence fixes the position and the last one the attributes.
    pub fn replace_all(&mut self, units: Vec<FieldUnit>) -> Churn {
        let mut next = HashMap::with_capacity(units.len());
        let mut order = Vec::with_capacity(units.len());

        for unit in units {
            if !next.contains_key(&unit.id) {
                order.push(unit.id.clone());
            }
            next.insert(unit.id.clone(), unit);
        }

        let mut churn = Churn::default();
        for id in &order {
            if self.units.contains_key(id) {
                churn.kept.insert(id.clone());
            } else {
                churn.added.insert(id.clone());
            }
        }
        churn.removed = self
            .units
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();

        self.units = next;
        self.order = order;
        churn
    }

    /// Drop a single unit
    pub fn remove(&mut self, id: &str) -> Option<FieldUnit> {
        let unit = self.units.remove(id)?;
        self.order.retain(|known| known != id);
        Some(unit)
    }

    pub fn get(&self, id: &str) -> Option<&FieldUnit> {
        self.units.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    /// Units in display order
    pub fn list(&self) -> impl Iterator<Item = &FieldUnit> + '_ {
        self.order.iter().filter_map(|id| self.units.get(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Ids of units last seen strictly before `cutoff`
    pub fn seen_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.list()
            .filter(|unit| unit.last_seen.is_some_and(|seen| seen < cutoff))
            .map(|unit| unit.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use groundlink_types::{Location, UnitState};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn unit(id: &str, state: UnitState) -> FieldUnit {
        let mut unit = FieldUnit::new(id);
        unit.state = state;
        unit
    }

    #[test]
    fn test_upsert_creates_with_defaults() {
        let mut store = EntityStore::new();
        let outcome = store.upsert(&UnitPatch::new("FU1").with_location(10.0, 20.0), t(0));

        assert_eq!(outcome, Upsert::Created);
        let fu1 = store.get("FU1").unwrap();
        assert_eq!(fu1.state, UnitState::Unknown);
        assert_eq!(fu1.location, Some(Location::new(10.0, 20.0)));
        assert_eq!(fu1.last_seen, Some(t(0)));
        assert!(fu1.sensor_reading.is_none());
    }

    #[test]
    fn test_upsert_merges_sparse() {
        let mut store = EntityStore::new();
        store.upsert(&UnitPatch::new("FU1").with_state(UnitState::Idle), t(0));
        let outcome = store.upsert(&UnitPatch::new("FU1").with_satellite("NOAA 18"), t(5));

        assert_eq!(outcome, Upsert::Updated);
        let fu1 = store.get("FU1").unwrap();
        assert_eq!(fu1.state, UnitState::Idle);
        assert_eq!(fu1.tracked_satellite.as_deref(), Some("NOAA 18"));
        assert_eq!(fu1.last_seen, Some(t(5)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_all_churn() {
        let mut store = EntityStore::new();
        store.replace_all(vec![unit("FU1", UnitState::Idle), unit("FU2", UnitState::Idle)]);

        let churn = store.replace_all(vec![
            unit("FU3", UnitState::Tracking),
            unit("FU2", UnitState::Disabled),
        ]);

        assert_eq!(churn.added, BTreeSet::from(["FU3".to_string()]));
        assert_eq!(churn.removed, BTreeSet::from(["FU1".to_string()]));
        assert_eq!(churn.kept, BTreeSet::from(["FU2".to_string()]));
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["FU3", "FU2"]);
        assert_eq!(store.get("FU2").unwrap().state, UnitState::Disabled);
        assert!(!store.contains("FU1"));
    }

    #[test]
    fn test_replace_all_duplicates() {
        let mut store = EntityStore::new();
        store.replace_all(vec![
            unit("A", UnitState::Idle),
            unit("B", UnitState::Idle),
            unit("A", UnitState::Tracking),
        ]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(store.get("A").unwrap().state, UnitState::Tracking);
    }

    #[test]
    fn test_replace_with_empty_set() {
        let mut store = EntityStore::new();
        store.upsert(&UnitPatch::new("FU1"), t(0));

        let churn = store.replace_all(Vec::new());
        assert_eq!(churn.removed.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_patch_created_units_are_appended() {
        let mut store = EntityStore::new();
        store.replace_all(vec![unit("B", UnitState::Idle), unit("A", UnitState::Idle)]);
        store.upsert(&UnitPatch::new("C"), t(0));

        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_remove() {
        let mut store = EntityStore::new();
        store.upsert(&UnitPatch::new("FU1"), t(0));
        store.upsert(&UnitPatch::new("FU2"), t(0));

        assert!(store.remove("FU1").is_some());
        assert!(store.remove("FU1").is_none());
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["FU2"]);
    }

    #[test]
    fn test_seen_before() {
        let mut store = EntityStore::new();
        store.upsert(&UnitPatch::new("old"), t(0));
        store.upsert(&UnitPatch::new("fresh"), t(100));

        assert_eq!(store.seen_before(t(50)), vec!["old".to_string()]);
        assert!(store.seen_before(t(0)).is_empty());
    }
}
