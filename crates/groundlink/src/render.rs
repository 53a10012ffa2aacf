//! Render Adapters
//!
//! The boundary between the reconciler and whatever draws the dashboard.
//! Adapters receive the change descriptor of each applied event together
//! with a read-only view of the stores; they never mutate state.

use chrono::Utc;
use groundlink_types::{ChangeDescriptor, LinkStatus, RenderOp};
use tracing::{debug, info};

use crate::store::StoreView;

/// Consumer of change descriptors
pub trait RenderAdapter: Send {
    /// Apply one descriptor. Called only for non-empty descriptors.
    fn render(&mut self, changes: &ChangeDescriptor, view: &StoreView<'_>);

    /// Push-channel connectivity changed
    fn link_changed(&mut self, _status: LinkStatus) {}
}

/// Adapter that logs every render operation
#[derive(Debug, Default)]
pub struct TracingRenderer {
    rendered: u64,
}

impl TracingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of descriptors rendered so far
    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl RenderAdapter for TracingRenderer {
    fn render(&mut self, changes: &ChangeDescriptor, view: &StoreView<'_>) {
        self.rendered += 1;
        debug!(units = changes.touched_ids().len(), "Rendering changes");

        let now = Utc::now();
        for op in changes.render_ops() {
            match &op {
                RenderOp::Create(id) | RenderOp::RefreshLive(id) => {
                    let unit = view.unit(id);
                    let state = unit.map(|unit| unit.state.as_str());
                    let tracking = unit.is_some_and(|unit| unit.is_tracking());
                    debug!(op = ?op, state, tracking, "Render");
                }
                RenderOp::Remove(_) => debug!(op = ?op, "Render"),
                RenderOp::RenderSchedule(id) => {
                    let in_pass = view.pass_at(id, now).map(|pass| pass.satellite.as_str());
                    debug!(op = ?op, activities = view.schedule(id).len(), in_pass, "Render");
                }
            }
        }
    }

    fn link_changed(&mut self, status: LinkStatus) {
        info!(?status, "Push channel link changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityStore, ScheduleCache};
    use groundlink_types::{ScheduleActivity, parse_timestamp};

    #[test]
    fn test_tracing_renderer_counts() {
        let entities = EntityStore::new();
        let schedules = ScheduleCache::default();
        let view = StoreView {
            entities: &entities,
            schedules: &schedules,
        };

        let mut renderer = TracingRenderer::new();
        let mut changes = ChangeDescriptor::new();
        changes.removed_ids.insert("FU1".to_string());
        changes.schedule_changed_ids.insert("FU2".to_string());

        renderer.render(&changes, &view);
        renderer.link_changed(LinkStatus::Connected);
        assert_eq!(renderer.rendered(), 1);
    }

    #[test]
    fn test_pass_at() {
        let start = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let end = parse_timestamp("2024-01-01T00:10:00Z").unwrap();
        let entities = EntityStore::new();
        let mut schedules = ScheduleCache::default();
        schedules.set_all(
            "FU1",
            vec![ScheduleActivity::new("FU1", start, end, "NOAA 19").unwrap()],
        );
        let view = StoreView {
            entities: &entities,
            schedules: &schedules,
        };

        let during = start.with_timezone(&Utc) + chrono::Duration::minutes(5);
        assert_eq!(view.pass_at("FU1", during).unwrap().satellite, "NOAA 19");
        assert!(view.pass_at("FU1", end.with_timezone(&Utc)).is_none());
        assert!(view.pass_at("FU2", during).is_none());
    }
}
