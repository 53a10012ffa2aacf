//! Reconciler
//!
//! Single writer for the entity store and schedule cache. Each event is
//! decoded, validated and applied to completion before the next one is
//! looked at, so events for the same unit never interleave.
//!
//! Merge policy by event kind:
//! - registry replace: full replace of the unit set, then schedule prune
//! - patch: sparse upsert of one unit
//! - schedule update: whole-list replace for each unit in the map
//! - removal: drop one unit and its schedule
//!
//! Malformed events are logged and dropped; nothing escapes `ingest`.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use groundlink_types::{
    ChangeDescriptor, Envelope, FieldUnit, InboundEvent, ScheduleActivity, UnitPatch,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::routes::TopicRoutes;
use crate::store::{EntityStore, ScheduleCache, ScheduleOrdering, StoreView, Upsert};

/// Running event counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerStats {
    /// Events applied to the stores
    pub applied: u64,
    /// Malformed frames or payloads that were dropped
    pub dropped: u64,
    /// Frames on topics with no route
    pub ignored: u64,
    /// Registry replaces applied (subset of `applied`)
    pub registry_replaces: u64,
}

pub struct Reconciler {
    entities: EntityStore,
    schedules: ScheduleCache,
    routes: TopicRoutes,
    stats: ReconcilerStats,
}

impl Reconciler {
    pub fn new(routes: TopicRoutes, ordering: ScheduleOrdering) -> Self {
        Self {
            entities: EntityStore::new(),
            schedules: ScheduleCache::new(ordering),
            routes,
            stats: ReconcilerStats::default(),
        }
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn schedules(&self) -> &ScheduleCache {
        &self.schedules
    }

    pub fn view(&self) -> StoreView<'_> {
        StoreView {
            entities: &self.entities,
            schedules: &self.schedules,
        }
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// Decode a JSON text frame and apply it
    pub fn ingest_frame(&mut self, text: &str) -> ChangeDescriptor {
        match Envelope::from_json(text) {
            Ok(envelope) => self.ingest(&envelope),
            Err(e) => {
                self.stats.dropped += 1;
                warn!(error = %e, "Dropping malformed frame");
                ChangeDescriptor::new()
            }
        }
    }

    /// Route, decode and apply one envelope.
    ///
    /// Returns an empty descriptor when the frame is ignored or dropped; the
    /// stores are untouched in that case.
    pub fn ingest(&mut self, envelope: &Envelope) -> ChangeDescriptor {
        let Some(kind) = self.routes.route(&envelope.topic) else {
            self.stats.ignored += 1;
            debug!(topic = %envelope.topic, "Ignoring frame on unrouted topic");
            return ChangeDescriptor::new();
        };

        match InboundEvent::decode(kind, &envelope.data) {
            Ok(event) => self.apply(event, envelope.received_at),
            Err(e) => {
                self.stats.dropped += 1;
                warn!(
                    topic = %envelope.topic,
                    kind = %kind,
                    error = %e,
                    "Dropping malformed event"
                );
                ChangeDescriptor::new()
            }
        }
    }

    /// Apply an already validated event
    pub fn apply(&mut self, event: InboundEvent, received_at: DateTime<Utc>) -> ChangeDescriptor {
        let kind = event.kind();
        let changes = match event {
            InboundEvent::RegistryReplace(entries) => self.replace_registry(entries, received_at),
            InboundEvent::Patch(patch) => self.patch_unit(patch, received_at),
            InboundEvent::ScheduleUpdate(schedules) => self.update_schedules(schedules),
            InboundEvent::Removal(id) => self.remove_unit(id),
        };
        self.stats.applied += 1;

        debug!(
            kind = %kind,
            added = changes.added_ids.len(),
            removed = changes.removed_ids.len(),
            updated = changes.updated_ids.len(),
            schedules = changes.schedule_changed_ids.len(),
            "Applied event"
        );
        changes
    }

    /// Remove units whose last event is older than `max_age`.
    ///
    /// Nothing expires when the cutoff falls outside the representable range.
    pub fn expire_stale(&mut self, now: DateTime<Utc>, max_age: Duration) -> ChangeDescriptor {
        let mut changes = ChangeDescriptor::new();
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            debug!(?max_age, "Stale cutoff out of range, nothing to expire");
            return changes;
        };

        for id in self.entities.seen_before(cutoff) {
            info!(unit = %id, "Expiring unit with no recent reports");
            changes.merge(self.remove_unit(id));
        }
        changes
    }

    fn replace_registry(&mut self, entries: Vec<UnitPatch>, at: DateTime<Utc>) -> ChangeDescriptor {
        let mut units: Vec<FieldUnit> = Vec::with_capacity(entries.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        // Entries overlay the unit's previous attributes so live fields the
        // registry does not carry survive the replace.
        for entry in entries {
            if let Some(&index) = positions.get(&entry.id) {
                entry.apply(&mut units[index]);
                continue;
            }

            let mut unit = self
                .entities
                .get(&entry.id)
                .cloned()
                .unwrap_or_else(|| FieldUnit::new(entry.id.clone()));
            entry.apply(&mut unit);
            unit.last_seen = Some(at);

            positions.insert(entry.id.clone(), units.len());
            units.push(unit);
        }

        let churn = self.entities.replace_all(units);

        let valid: HashSet<&str> = self.entities.ids().collect();
        let pruned = self.schedules.prune(&valid);
        if !pruned.is_empty() {
            debug!(count = pruned.len(), "Pruned schedules of departed units");
        }

        self.stats.registry_replaces += 1;
        info!(
            units = self.entities.len(),
            added = churn.added.len(),
            removed = churn.removed.len(),
            "Registry replaced"
        );

        ChangeDescriptor {
            added_ids: churn.added,
            removed_ids: churn.removed,
            updated_ids: churn.kept,
            schedule_changed_ids: BTreeSet::new(),
        }
    }

    fn patch_unit(&mut self, patch: UnitPatch, at: DateTime<Utc>) -> ChangeDescriptor {
        let mut changes = ChangeDescriptor::new();

        if self.entities.upsert(&patch, at) == Upsert::Created {
            debug!(unit = %patch.id, "Created unit from patch");
            changes.added_ids.insert(patch.id.clone());
        }
        changes.updated_ids.insert(patch.id);
        changes
    }

    fn update_schedules(
        &mut self,
        schedules: std::collections::BTreeMap<String, Vec<ScheduleActivity>>,
    ) -> ChangeDescriptor {
        let ids: BTreeSet<String> = schedules.keys().cloned().collect();

        for id in ids.iter().filter(|id| !self.entities.contains(id)) {
            debug!(unit = %id, "Caching schedule for a unit not in the registry");
        }
        self.schedules.set_many(schedules);

        ChangeDescriptor {
            schedule_changed_ids: ids,
            ..Default::default()
        }
    }

    fn remove_unit(&mut self, id: String) -> ChangeDescriptor {
        let mut changes = ChangeDescriptor::new();

        let existed = self.entities.remove(&id).is_some();
        self.schedules.prune_one(&id);

        if existed {
            changes.removed_ids.insert(id);
        } else {
            debug!(unit = %id, "Removal for unknown unit");
        }
        changes
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(TopicRoutes::default(), ScheduleOrdering::default())
    }
}
