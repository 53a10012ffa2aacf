//! Change Descriptors
//!
//! The summary the reconciler hands to render adapters after each event.
//! It is complete on its own: an adapter never has to diff the stores.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Which units were added, removed, updated or had their schedule replaced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChangeDescriptor {
    pub added_ids: BTreeSet<String>,
    pub removed_ids: BTreeSet<String>,
    pub updated_ids: BTreeSet<String>,
    pub schedule_changed_ids: BTreeSet<String>,
}

/// A single operation a render adapter performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "op", content = "id", rename_all = "snake_case")]
pub enum RenderOp {
    /// Build the visual element for a new unit
    Create(String),
    /// Tear down the element of a unit that left the registry
    Remove(String),
    /// Refresh the live-data block in place
    RefreshLive(String),
    /// Re-render the schedule block
    RenderSchedule(String),
}

impl ChangeDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added_ids.is_empty()
            && self.removed_ids.is_empty()
            && self.updated_ids.is_empty()
            && self.schedule_changed_ids.is_empty()
    }

    /// Fold a later descriptor into this one.
    ///
    /// A later removal cancels earlier additions, updates and schedule
    /// changes for the same id; a unit both added and removed leaves no
    /// trace. A unit removed and then added again keeps both, so it is
    /// torn down and rebuilt.
    pub fn merge(&mut self, other: ChangeDescriptor) {
        for id in other.removed_ids {
            self.updated_ids.remove(&id);
            self.schedule_changed_ids.remove(&id);
            if !self.added_ids.remove(&id) {
                self.removed_ids.insert(id);
            }
        }
        self.added_ids.extend(other.added_ids);
        self.updated_ids.extend(other.updated_ids);
        self.schedule_changed_ids.extend(other.schedule_changed_ids);
    }

    /// Every id mentioned by the descriptor
    pub fn touched_ids(&self) -> BTreeSet<&str> {
        self.added_ids
            .iter()
            .chain(&self.removed_ids)
            .chain(&self.updated_ids)
            .chain(&self.schedule_changed_ids)
            .map(String::as_str)
            .collect()
    }

    /// Expand into the minimal ordered list of render operations.
    ///
    /// Removals come first, then creations, then in-place refreshes. A new
    /// element is built from current data, so added ids get no separate
    /// refresh, and removed ids get no schedule render.
    pub fn render_ops(&self) -> Vec<RenderOp> {
        let mut ops = Vec::new();

        ops.extend(self.removed_ids.iter().cloned().map(RenderOp::Remove));
        ops.extend(self.added_ids.iter().cloned().map(RenderOp::Create));
        ops.extend(
            self.updated_ids
                .difference(&self.added_ids)
                .cloned()
                .map(RenderOp::RefreshLive),
        );
        ops.extend(
            self.schedule_changed_ids
                .difference(&self.removed_ids)
                .cloned()
                .map(RenderOp::RenderSchedule),
        );

        ops
    }
}

/// Push-channel connectivity as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connected,
    #[default]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_ops_order_and_dedup() {
        let changes = ChangeDescriptor {
            added_ids: ids(&["FU3"]),
            removed_ids: ids(&["FU1"]),
            updated_ids: ids(&["FU2", "FU3"]),
            schedule_changed_ids: ids(&["FU1", "FU2"]),
        };

        assert_eq!(
            changes.render_ops(),
            vec![
                RenderOp::Remove("FU1".into()),
                RenderOp::Create("FU3".into()),
                RenderOp::RefreshLive("FU2".into()),
                RenderOp::RenderSchedule("FU2".into()),
            ]
        );
    }

    #[test]
    fn test_empty() {
        assert!(ChangeDescriptor::new().is_empty());
        assert!(ChangeDescriptor::new().render_ops().is_empty());
    }

    #[test]
    fn test_merge_unions_sets() {
        let mut changes = ChangeDescriptor {
            added_ids: ids(&["A"]),
            updated_ids: ids(&["A", "B"]),
            ..Default::default()
        };
        changes.merge(ChangeDescriptor {
            updated_ids: ids(&["C"]),
            schedule_changed_ids: ids(&["B"]),
            ..Default::default()
        });

        assert_eq!(changes.added_ids, ids(&["A"]));
        assert_eq!(changes.updated_ids, ids(&["A", "B", "C"]));
        assert_eq!(changes.schedule_changed_ids, ids(&["B"]));
        assert!(changes.removed_ids.is_empty());
    }

    #[test]
    fn test_merge_removal_cancels_earlier_changes() {
        let mut changes = ChangeDescriptor {
            added_ids: ids(&["A"]),
            updated_ids: ids(&["A", "B"]),
            schedule_changed_ids: ids(&["B"]),
            ..Default::default()
        };
        changes.merge(ChangeDescriptor {
            removed_ids: ids(&["A", "B"]),
            ..Default::default()
        });

        // A never reached an adapter, B has to be torn down
        assert!(changes.added_ids.is_empty());
        assert_eq!(changes.removed_ids, ids(&["B"]));
        assert!(changes.updated_ids.is_empty());
        assert!(changes.schedule_changed_ids.is_empty());
        assert_eq!(changes.render_ops(), vec![RenderOp::Remove("B".into())]);
    }

    #[test]
    fn test_merge_remove_then_add_rebuilds() {
        let mut changes = ChangeDescriptor {
            removed_ids: ids(&["A"]),
            ..Default::default()
        };
        changes.merge(ChangeDescriptor {
            added_ids: ids(&["A"]),
            updated_ids: ids(&["A"]),
            ..Default::default()
        });

        assert_eq!(
            changes.render_ops(),
            vec![RenderOp::Remove("A".into()), RenderOp::Create("A".into())]
        );
    }

    #[test]
    fn test_touched_ids() {
        let changes = ChangeDescriptor {
            added_ids: ids(&["B"]),
            schedule_changed_ids: ids(&["A", "B"]),
            ..Default::default()
        };
        assert_eq!(changes.touched_ids().into_iter().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_render_op_serde() {
        let json = serde_json::to_string(&RenderOp::RefreshLive("FU1".into())).unwrap();
        assert_eq!(json, r#"{"op":"refresh_live","id":"FU1"}"#);
    }
}
