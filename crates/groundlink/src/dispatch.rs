//! Command Dispatcher
//!
//! One-way delivery of operator commands to field units. A command is
//! validated, wrapped in a [`CommandMessage`] and handed to the sink exactly
//! once. Nothing waits for an acknowledgement; the unit's reaction arrives
//! later as an ordinary inbound event.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use groundlink_types::{Angle, Command, CommandMessage};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outbound queue capacity
const COMMAND_BUFFER: usize = 64;

/// Errors raised while dispatching a command
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Command has no unit id")]
    MissingUnitId,

    #[error("Invalid {axis} angle: {value}")]
    InvalidAngle { axis: &'static str, value: String },

    #[error("{axis} {value} outside [{min}, {max}]")]
    OutOfRange {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Command channel closed")]
    SinkClosed,

    #[error("Command queue full")]
    QueueFull,

    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A command ready for the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundCommand {
    pub id: Uuid,
    pub topic: String,
    pub message: CommandMessage,
    pub issued_at: DateTime<Utc>,
}

impl OutboundCommand {
    /// Wire form: `{"topic": ..., "data": <CommandMessage>}`
    pub fn to_frame(&self) -> Result<String, DispatchError> {
        Ok(serde_json::to_string(&serde_json::json!({
            "topic": self.topic,
            "data": self.message,
        }))?)
    }
}

/// Destination of outbound commands
pub trait CommandSink: Send + Sync {
    fn send(&self, command: OutboundCommand) -> Result<(), DispatchError>;
}

/// Sink that forwards to a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<OutboundCommand>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn channel() -> (Self, mpsc::Receiver<OutboundCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        (Self { tx }, rx)
    }
}

impl CommandSink for ChannelSink {
    fn send(&self, command: OutboundCommand) -> Result<(), DispatchError> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(command) => {
                warn!(id = %command.id, "Command queue full, dropping command");
                DispatchError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => DispatchError::SinkClosed,
        })
    }
}

/// Validates and sends unit commands
#[derive(Clone)]
pub struct CommandDispatcher {
    sink: Arc<dyn CommandSink>,
    topic: String,
}

impl CommandDispatcher {
    pub fn new(sink: Arc<dyn CommandSink>, topic: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Send `command` to unit `fu_id`, returning the id it was issued under
    pub fn dispatch(&self, fu_id: &str, command: Command) -> Result<Uuid, DispatchError> {
        let fu_id = fu_id.trim();
        if fu_id.is_empty() {
            return Err(DispatchError::MissingUnitId);
        }

        let command = validate(command)?;
        let outbound = OutboundCommand {
            id: Uuid::new_v4(),
            topic: self.topic.clone(),
            message: CommandMessage {
                fu_id: fu_id.to_string(),
                command,
            },
            issued_at: Utc::now(),
        };
        let id = outbound.id;
        let name = outbound.message.command.name();

        self.sink.send(outbound)?;
        info!(%id, unit = %fu_id, command = name, "Command dispatched");
        Ok(id)
    }
}

/// Check angles and normalise them to plain degrees
fn validate(command: Command) -> Result<Command, DispatchError> {
    match command {
        Command::ManualPoint { az, el } => {
            let az = checked_angle("azimuth", &az, 0.0, 360.0)?;
            let el = checked_angle("elevation", &el, -90.0, 90.0)?;
            Ok(Command::manual_point(az, el))
        }
        other => Ok(other),
    }
}

fn checked_angle(axis: &'static str, angle: &Angle, min: f64, max: f64) -> Result<f64, DispatchError> {
    let value = angle.degrees().ok_or_else(|| DispatchError::InvalidAngle {
        axis,
        value: match angle {
            Angle::Degrees(value) => value.to_string(),
            Angle::Text(text) => text.clone(),
        },
    })?;

    if !(min..=max).contains(&value) {
        return Err(DispatchError::OutOfRange {
            axis,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// Drain outbound commands into the log and, optionally, a JSON-lines file
pub async fn drain_commands(
    mut rx: mpsc::Receiver<OutboundCommand>,
    output: Option<&Path>,
) -> std::io::Result<u64> {
    let mut file = match output {
        Some(path) => Some(
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?,
        ),
        None => None,
    };

    let mut sent = 0u64;
    while let Some(command) = rx.recv().await {
        let frame = match command.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(id = %command.id, error = %e, "Failed to encode command");
                continue;
            }
        };

        debug!(id = %command.id, topic = %command.topic, %frame, "Outbound command");
        if let Some(file) = file.as_mut() {
            file.write_all(frame.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        sent += 1;
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<OutboundCommand>>,
    }

    impl CommandSink for Capture {
        fn send(&self, command: OutboundCommand) -> Result<(), DispatchError> {
            self.sent.lock().unwrap().push(command);
            Ok(())
        }
    }

    fn dispatcher() -> (CommandDispatcher, Arc<Capture>) {
        let capture = Arc::new(Capture::default());
        (CommandDispatcher::new(capture.clone(), "fu_command"), capture)
    }

    #[test]
    fn test_manual_point_sent_once_with_normalised_angles() {
        let (dispatcher, capture) = dispatcher();

        let id = assert_ok!(dispatcher.dispatch("FU1", Command::manual_point(120.5, " 30 ")));

        let sent = capture.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, id);
        assert_eq!(sent[0].message.fu_id, "FU1");
        assert_eq!(sent[0].message.command, Command::manual_point(120.5, 30.0));
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&sent[0].to_frame().unwrap()).unwrap(),
            json!({
                "topic": "fu_command",
                "data": {"fu_id": "FU1", "command": {"type": "manual_point", "az": 120.5, "el": 30.0}}
            })
        );
    }

    #[test]
    fn test_rejects_bad_input_without_sending() {
        let (dispatcher, capture) = dispatcher();

        assert!(matches!(
            dispatcher.dispatch("  ", Command::TelemetryRequest),
            Err(DispatchError::MissingUnitId)
        ));
        assert!(matches!(
            dispatcher.dispatch("FU1", Command::manual_point("north", 10.0)),
            Err(DispatchError::InvalidAngle { axis: "azimuth", .. })
        ));
        assert!(matches!(
            dispatcher.dispatch("FU1", Command::manual_point(10.0, 95.0)),
            Err(DispatchError::OutOfRange { axis: "elevation", .. })
        ));
        assert_err!(dispatcher.dispatch("FU1", Command::manual_point(360.5, 0.0)));
        assert_err!(dispatcher.dispatch("FU1", Command::manual_point(f64::NAN, 0.0)));

        assert!(capture.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_boundary_angles_accepted() {
        let (dispatcher, capture) = dispatcher();
        assert_ok!(dispatcher.dispatch("FU1", Command::manual_point(0.0, -90.0)));
        assert_ok!(dispatcher.dispatch("FU1", Command::manual_point(360.0, 90.0)));
        assert_ok!(dispatcher.dispatch("FU1", Command::Disable));
        assert_eq!(capture.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_channel_sink_and_drain() {
        let (sink, rx) = ChannelSink::channel();
        let dispatcher = CommandDispatcher::new(Arc::new(sink), "fu_command");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.jsonl");

        assert_ok!(dispatcher.dispatch("FU1", Command::TelemetryRequest));
        assert_ok!(dispatcher.dispatch("FU2", Command::Disable));
        drop(dispatcher);

        let sent = drain_commands(rx, Some(&path)).await.unwrap();
        assert_eq!(sent, 2);

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("telemetry_request"));
        assert!(lines[1].contains("\"fu_id\":\"FU2\""));
    }

    #[test]
    fn test_closed_channel() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        let dispatcher = CommandDispatcher::new(Arc::new(sink), "fu_command");
        assert!(matches!(
            dispatcher.dispatch("FU1", Command::Disable),
            Err(DispatchError::SinkClosed)
        ));
    }

    #[test]
    fn test_full_queue_is_not_closed() {
        let (sink, mut rx) = ChannelSink::channel();
        let dispatcher = CommandDispatcher::new(Arc::new(sink), "fu_command");

        for _ in 0..COMMAND_BUFFER {
            assert_ok!(dispatcher.dispatch("FU1", Command::TelemetryRequest));
        }
        assert!(matches!(
            dispatcher.dispatch("FU1", Command::TelemetryRequest),
            Err(DispatchError::QueueFull)
        ));

        // room again once the drain catches up
        assert_ok!(rx.try_recv());
        assert_ok!(dispatcher.dispatch("FU1", Command::TelemetryRequest));
    }
}
