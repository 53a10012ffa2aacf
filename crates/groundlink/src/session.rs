//! Dashboard Session
//!
//! Owns the reconciler and is the only writer of the stores. Inputs arrive
//! over an mpsc channel and are processed strictly one at a time, so each
//! event is applied to completion before the next is looked at. Readers get
//! immutable snapshots through a watch channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use groundlink_types::{ChangeDescriptor, Envelope, FieldUnit, LinkStatus, ScheduleActivity};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::reconcile::{Reconciler, ReconcilerStats};
use crate::render::RenderAdapter;

/// Input channel capacity
const INPUT_BUFFER: usize = 256;

/// Something for the session to process
#[derive(Debug)]
pub enum SessionInput {
    /// Raw JSON envelope as received on the push channel
    Frame(String),
    /// Already parsed envelope
    Event(Envelope),
    /// Push channel came up or went down
    Link(LinkStatus),
    /// Stop the session loop
    Shutdown,
}

/// Periodic removal of units that stopped reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleSweep {
    pub max_age: Duration,
    pub interval: StdDuration,
}

impl StaleSweep {
    /// Sweep settings from config; `None` when the sweep is disabled
    pub fn from_config(config: &RegistryConfig) -> Option<Self> {
        if config.stale_after_secs == 0 || config.sweep_interval_secs == 0 {
            return None;
        }
        Some(Self {
            max_age: Duration::try_seconds(i64::try_from(config.stale_after_secs).ok()?)?,
            interval: StdDuration::from_secs(config.sweep_interval_secs),
        })
    }
}

/// Immutable copy of the dashboard state
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    /// Units in display order
    pub units: Vec<FieldUnit>,
    pub schedules: BTreeMap<String, Vec<ScheduleActivity>>,
    pub link: LinkStatus,
    /// Link dropped and no registry replace has arrived since
    pub awaiting_resync: bool,
    pub stats: ReconcilerStats,
    /// Number of non-empty change descriptors applied
    pub revision: u64,
    /// Number of inputs processed
    pub processed: u64,
}

impl Snapshot {
    pub fn unit(&self, id: &str) -> Option<&FieldUnit> {
        self.units.iter().find(|unit| unit.id == id)
    }

    /// Cached schedule for a unit; empty when none is cached
    pub fn schedule(&self, id: &str) -> &[ScheduleActivity] {
        self.schedules.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Cloneable handle for feeding and reading a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inputs: mpsc::Sender<SessionInput>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
}

impl SessionHandle {
    async fn send(&self, input: SessionInput) -> Result<()> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Queue a raw JSON frame
    pub async fn send_frame(&self, frame: impl Into<String>) -> Result<()> {
        self.send(SessionInput::Frame(frame.into())).await
    }

    /// Queue a parsed envelope
    pub async fn send_event(&self, envelope: Envelope) -> Result<()> {
        self.send(SessionInput::Event(envelope)).await
    }

    /// Report a push channel status change
    pub async fn set_link(&self, status: LinkStatus) -> Result<()> {
        self.send(SessionInput::Link(status)).await
    }

    /// Ask the session loop to stop
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionInput::Shutdown).await
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.clone()
    }
}

pub struct Session {
    reconciler: Reconciler,
    adapters: Vec<Box<dyn RenderAdapter>>,
    inputs: mpsc::Receiver<SessionInput>,
    snapshots: watch::Sender<Arc<Snapshot>>,
    sweep: Option<StaleSweep>,
    link: LinkStatus,
    awaiting_resync: bool,
    revision: u64,
    processed: u64,
}

impl Session {
    /// Create a session and the handle used to drive it
    pub fn new(reconciler: Reconciler, sweep: Option<StaleSweep>) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::default()));

        let session = Self {
            reconciler,
            adapters: Vec::new(),
            inputs: input_rx,
            snapshots: snapshot_tx,
            sweep,
            link: LinkStatus::Disconnected,
            awaiting_resync: false,
            revision: 0,
            processed: 0,
        };
        let handle = SessionHandle {
            inputs: input_tx,
            snapshots: snapshot_rx,
        };
        (session, handle)
    }

    /// Register a render adapter
    pub fn with_adapter(mut self, adapter: impl RenderAdapter + 'static) -> Self {
        self.adapters.push(Box::new(adapter));
        self
    }

    /// Process inputs until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!(adapters = self.adapters.len(), sweep = self.sweep.is_some(), "Session started");

        let mut sweep_timer = self.sweep.map(|sweep| {
            let mut timer = tokio::time::interval(sweep.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });

        loop {
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(SessionInput::Shutdown) | None => break,
                    Some(input) => self.process(input),
                },
                _ = next_tick(&mut sweep_timer) => self.sweep_stale(Utc::now()),
            }
        }

        info!(revision = self.revision, "Session stopped");
    }

    fn process(&mut self, input: SessionInput) {
        let replaces_before = self.reconciler.stats().registry_replaces;

        match input {
            SessionInput::Frame(text) => {
                let changes = self.reconciler.ingest_frame(&text);
                self.commit(changes);
            }
            SessionInput::Event(envelope) => {
                let changes = self.reconciler.ingest(&envelope);
                self.commit(changes);
            }
            SessionInput::Link(status) => self.set_link(status),
            SessionInput::Shutdown => {}
        }

        if self.awaiting_resync && self.reconciler.stats().registry_replaces > replaces_before {
            info!("Registry resynchronised after reconnect");
            self.awaiting_resync = false;
        }

        self.processed += 1;
        self.publish();
    }

    fn sweep_stale(&mut self, now: DateTime<Utc>) {
        let Some(sweep) = self.sweep else {
            return;
        };
        let changes = self.reconciler.expire_stale(now, sweep.max_age);
        if !changes.is_empty() {
            self.commit(changes);
            self.publish();
        }
    }

    fn commit(&mut self, changes: ChangeDescriptor) {
        if changes.is_empty() {
            return;
        }
        self.revision += 1;

        let view = self.reconciler.view();
        for adapter in &mut self.adapters {
            adapter.render(&changes, &view);
        }
    }

    fn set_link(&mut self, status: LinkStatus) {
        if status == self.link {
            return;
        }

        if self.link == LinkStatus::Connected && status == LinkStatus::Disconnected {
            warn!(
                units = self.reconciler.entities().len(),
                "Push channel lost, keeping last known state"
            );
            self.awaiting_resync = true;
        } else {
            debug!(?status, "Push channel status");
        }

        self.link = status;
        for adapter in &mut self.adapters {
            adapter.link_changed(status);
        }
    }

    fn publish(&self) {
        let snapshot = Snapshot {
            units: self.reconciler.entities().list().cloned().collect(),
            schedules: self.reconciler.schedules().to_map(),
            link: self.link,
            awaiting_resync: self.awaiting_resync,
            stats: self.reconciler.stats(),
            revision: self.revision,
            processed: self.processed,
        };
        self.snapshots.send_replace(Arc::new(snapshot));
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use groundlink_types::UnitState;
    use serde_json::json;

    use crate::store::StoreView;

    /// Records every descriptor it is handed
    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<ChangeDescriptor>>>,
        links: Arc<Mutex<Vec<LinkStatus>>>,
    }

    impl RenderAdapter for Recorder {
        fn render(&mut self, changes: &ChangeDescriptor, _view: &StoreView<'_>) {
            self.seen.lock().unwrap().push(changes.clone());
        }

        fn link_changed(&mut self, status: LinkStatus) {
            self.links.lock().unwrap().push(status);
        }
    }

    fn spawn_session(sweep: Option<StaleSweep>) -> (SessionHandle, Recorder) {
        let recorder = Recorder::default();
        let (session, handle) = Session::new(Reconciler::default(), sweep);
        tokio::spawn(session.with_adapter(recorder.clone()).run());
        (handle, recorder)
    }

    async fn settle(handle: &SessionHandle, processed: u64) -> Arc<Snapshot> {
        let mut rx = handle.subscribe();
        rx.wait_for(|snapshot| snapshot.processed >= processed)
            .await
            .unwrap()
            .clone()
    }

    fn registry(ids: &[&str]) -> String {
        let clients: Vec<_> = ids.iter().map(|id| json!({"fu_id": id, "state": "IDLE"})).collect();
        json!({"topic": "registry/replace", "data": clients}).to_string()
    }

    #[tokio::test]
    async fn test_frames_reach_stores_and_adapters() {
        let (handle, recorder) = spawn_session(None);

        handle.send_frame(registry(&["FU1"])).await.unwrap();
        handle
            .send_event(Envelope::new(
                "unit/patch",
                json!({"fu_id": "FU1", "location": {"latitude": 10, "longitude": 20}}),
            ))
            .await
            .unwrap();
        handle.send_frame("not json").await.unwrap();

        let snapshot = settle(&handle, 3).await;
        let fu1 = snapshot.unit("FU1").unwrap();
        assert_eq!(fu1.state, UnitState::Idle);
        assert_eq!(fu1.location.unwrap().latitude, 10.0);
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.stats.dropped, 1);

        // empty descriptors are never rendered
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_state_until_resync() {
        let (handle, recorder) = spawn_session(None);

        handle.set_link(LinkStatus::Connected).await.unwrap();
        handle.send_frame(registry(&["FU1", "FU2"])).await.unwrap();
        handle.set_link(LinkStatus::Disconnected).await.unwrap();

        let snapshot = settle(&handle, 3).await;
        assert_eq!(snapshot.link, LinkStatus::Disconnected);
        assert!(snapshot.awaiting_resync);
        assert_eq!(snapshot.units.len(), 2);

        handle.set_link(LinkStatus::Connected).await.unwrap();
        handle
            .send_frame(json!({"topic": "unit/patch", "data": {"fu_id": "FU1"}}).to_string())
            .await
            .unwrap();
        let snapshot = settle(&handle, 5).await;
        assert!(snapshot.awaiting_resync);

        handle.send_frame(registry(&["FU2"])).await.unwrap();
        let snapshot = settle(&handle, 6).await;
        assert!(!snapshot.awaiting_resync);
        assert!(snapshot.unit("FU1").is_none());

        assert_eq!(
            *recorder.links.lock().unwrap(),
            vec![
                LinkStatus::Connected,
                LinkStatus::Disconnected,
                LinkStatus::Connected
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (session, handle) = Session::new(Reconciler::default(), None);
        let task = tokio::spawn(session.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(
            handle.send_frame("{}").await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_stale_sweep_removes_silent_units() {
        let sweep = StaleSweep {
            max_age: Duration::seconds(60),
            interval: StdDuration::from_millis(10),
        };
        let (handle, recorder) = spawn_session(Some(sweep));

        let old = Utc::now() - Duration::seconds(600);
        handle
            .send_event(Envelope::new("unit/patch", json!({"fu_id": "old"})).at(old))
            .await
            .unwrap();
        handle
            .send_event(Envelope::new("unit/patch", json!({"fu_id": "fresh"})))
            .await
            .unwrap();

        let mut rx = handle.subscribe();
        let snapshot = rx
            .wait_for(|snapshot| snapshot.processed >= 2 && snapshot.unit("old").is_none())
            .await
            .unwrap()
            .clone();

        assert!(snapshot.unit("fresh").is_some());
        assert!(
            recorder
                .seen
                .lock()
                .unwrap()
                .iter()
                .any(|changes| changes.removed_ids.contains("old"))
        );
    }

    #[test]
    fn test_sweep_from_config() {
        assert_eq!(StaleSweep::from_config(&RegistryConfig::default()), None);

        let sweep = StaleSweep::from_config(&RegistryConfig {
            stale_after_secs: 300,
            sweep_interval_secs: 30,
        })
        .unwrap();
        assert_eq!(sweep.max_age, Duration::seconds(300));
        assert_eq!(sweep.interval, StdDuration::from_secs(30));

        // beyond what a duration can hold
        let oversized = StaleSweep::from_config(&RegistryConfig {
            stale_after_secs: 10_000_000_000_000_000,
            sweep_interval_secs: 30,
        });
        assert_eq!(oversized, None);
    }
}
