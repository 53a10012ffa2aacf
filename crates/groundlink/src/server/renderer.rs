//! WebSocket Render Adapter
//!
//! Turns change descriptors into `Change` pushes for subscribed clients.
//! New units are sent whole, updated units only carry their live-data
//! block, and schedule changes resend the unit's full list.

use groundlink_types::{ChangeDescriptor, LinkStatus, RenderOp};
use serde_json::Value;

use super::protocol::{ChangeType, ServerMessage};
use super::state::AppState;
use crate::render::RenderAdapter;
use crate::store::StoreView;

pub struct ServerRenderer {
    state: AppState,
}

impl ServerRenderer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

/// Path and push message for one render operation
pub fn change_message(op: &RenderOp, view: &StoreView<'_>) -> Option<(String, ServerMessage)> {
    let (path, change_type, data) = match op {
        RenderOp::Create(id) => (
            format!("/units/{id}"),
            ChangeType::Created,
            Some(serde_json::to_value(view.unit(id)?).ok()?),
        ),
        RenderOp::Remove(id) => (format!("/units/{id}"), ChangeType::Deleted, None),
        RenderOp::RefreshLive(id) => (
            format!("/units/{id}"),
            ChangeType::Updated,
            Some(serde_json::to_value(view.unit(id)?.live_data()).ok()?),
        ),
        RenderOp::RenderSchedule(id) => (
            format!("/schedules/{id}"),
            ChangeType::Updated,
            Some(serde_json::to_value(view.schedule(id)).unwrap_or(Value::Null)),
        ),
    };
    let message = ServerMessage::change(path.clone(), change_type, data);
    Some((path, message))
}

impl RenderAdapter for ServerRenderer {
    fn render(&mut self, changes: &ChangeDescriptor, view: &StoreView<'_>) {
        for op in changes.render_ops() {
            match change_message(&op, view) {
                Some((path, message)) => self.state.broadcast(&path, message),
                None => tracing::debug!(?op, "Nothing to push for render op"),
            }
        }
    }

    fn link_changed(&mut self, status: LinkStatus) {
        self.state.broadcast_all(ServerMessage::Link { status });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Reconciler;
    use chrono::Utc;
    use groundlink_types::{InboundEvent, UnitPatch, UnitState};

    #[test]
    fn test_change_messages() {
        let mut reconciler = Reconciler::default();
        reconciler.apply(
            InboundEvent::Patch(
                UnitPatch::new("FU1")
                    .with_state(UnitState::Tracking)
                    .with_satellite("NOAA 19"),
            ),
            Utc::now(),
        );
        let view = reconciler.view();

        let (_, created) = change_message(&RenderOp::Create("FU1".into()), &view).unwrap();
        let ServerMessage::Change { path, change_type, data } = created else {
            panic!("expected change");
        };
        assert_eq!(path, "/units/FU1");
        assert_eq!(change_type, ChangeType::Created);
        assert_eq!(data.unwrap()["id"], "FU1");

        let (_, refreshed) = change_message(&RenderOp::RefreshLive("FU1".into()), &view).unwrap();
        let ServerMessage::Change { change_type, data, .. } = refreshed else {
            panic!("expected change");
        };
        assert_eq!(change_type, ChangeType::Updated);
        let data = data.unwrap();
        assert!(data.get("id").is_none());
        assert_eq!(data["tracked_satellite"], "NOAA 19");

        let (_, schedule) = change_message(&RenderOp::RenderSchedule("FU1".into()), &view).unwrap();
        let ServerMessage::Change { path, data, .. } = schedule else {
            panic!("expected change");
        };
        assert_eq!(path, "/schedules/FU1");
        assert_eq!(data.unwrap(), serde_json::json!([]));

        assert!(change_message(&RenderOp::RefreshLive("FU9".into()), &view).is_none());
    }
}
