//! WebSocket Connection Handler
//!
//! Handles individual WebSocket connections and message processing.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use groundlink_types::Command;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::protocol::{ClientMessage, ErrorCode, ServerMessage};
use super::state::AppState;
use crate::catalog::{LookupError, SatelliteDirectory};
use crate::dispatch::DispatchError;
use crate::session::Snapshot;

/// A path that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub code: ErrorCode,
    pub message: String,
}

impl PathError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::NotFound,
            message: message.into(),
        }
    }
}

/// Handle a WebSocket connection
pub async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create channel for sending messages to this client
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    // Register client and get session ID
    let session_id = state.register_client(tx);

    // Greet, then report the current link status
    let greeting = [
        ServerMessage::connected(session_id.to_string()),
        ServerMessage::Link {
            status: state.session().snapshot().link,
        },
    ];
    for msg in &greeting {
        if let Ok(json) = serde_json::to_string(msg) {
            let _ = ws_sender.send(Message::Text(json)).await;
        }
    }

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Process incoming messages
    let state_clone = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_client_message(&state_clone, session_id, &text);
                }
                Message::Close(_) => break,
                Message::Ping(_) => {
                    // Pong is handled automatically by axum
                    tracing::trace!(%session_id, "Received ping");
                }
                _ => {}
            }
        }
    });

    join_first(send_task, recv_task).await;

    // Cleanup
    state.remove_client(session_id);
}

/// Wait for either task to complete, then abort the other
async fn join_first(mut a: JoinHandle<()>, mut b: JoinHandle<()>) {
    tokio::select! {
        _ = &mut a => b.abort(),
        _ = &mut b => a.abort(),
    }
}

/// Handle a client message
fn handle_client_message(state: &AppState, session_id: Uuid, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(%session_id, "Failed to parse client message: {}", e);
            send_error(state, session_id, None, ErrorCode::InvalidRequest, "Invalid JSON");
            return;
        }
    };

    match msg {
        ClientMessage::Subscribe { id, paths } => handle_subscribe(state, session_id, &id, paths),
        ClientMessage::Unsubscribe { id, paths } => {
            handle_unsubscribe(state, session_id, &id, paths)
        }
        ClientMessage::Get { id, path } => handle_get(state, session_id, &id, &path),
        ClientMessage::Command { id, fu_id, command } => {
            handle_command(state, session_id, &id, &fu_id, command)
        }
        ClientMessage::Ping { id } => state.send_to_client(session_id, ServerMessage::pong(id)),
    }
}

/// Handle subscribe request, replying with the current data for each path
fn handle_subscribe(state: &AppState, session_id: Uuid, id: &str, paths: Vec<String>) {
    state.subscribe(session_id, &paths);

    let snapshot = state.session().snapshot();
    let mut initial_data = serde_json::Map::new();

    for path in &paths {
        let base = path
            .strip_suffix("/**")
            .or_else(|| path.strip_suffix("/*"))
            .unwrap_or(path);
        if base.contains(['*', '?']) {
            continue;
        }
        if let Ok(data) = resolve_path(&snapshot, state.satellites(), base) {
            initial_data.insert(base.to_string(), data);
        }
    }

    let response = ServerMessage::success(
        id,
        Some(json!({
            "subscribed": paths,
            "data": initial_data
        })),
    );
    state.send_to_client(session_id, response);
}

/// Handle unsubscribe request
fn handle_unsubscribe(state: &AppState, session_id: Uuid, id: &str, paths: Vec<String>) {
    state.unsubscribe(session_id, &paths);

    let remaining: Vec<String> = state.get_subscriptions(session_id).into_iter().collect();
    let response = ServerMessage::success(
        id,
        Some(json!({ "unsubscribed": paths, "remaining": remaining })),
    );
    state.send_to_client(session_id, response);
}

/// Handle get request
fn handle_get(state: &AppState, session_id: Uuid, id: &str, path: &str) {
    let snapshot = state.session().snapshot();

    match resolve_path(&snapshot, state.satellites(), path) {
        Ok(data) => state.send_to_client(session_id, ServerMessage::success(id, Some(data))),
        Err(e) => send_error(state, session_id, Some(id), e.code, e.message),
    }
}

/// Handle a unit command
fn handle_command(state: &AppState, session_id: Uuid, id: &str, fu_id: &str, command: Command) {
    match state.dispatcher().dispatch(fu_id, command) {
        Ok(command_id) => {
            let data = json!({ "command_id": command_id, "fu_id": fu_id });
            state.send_to_client(session_id, ServerMessage::success(id, Some(data)));
        }
        Err(e) => {
            let code = match e {
                DispatchError::SinkClosed | DispatchError::QueueFull | DispatchError::Encode(_) => {
                    ErrorCode::InternalError
                }
                _ => ErrorCode::InvalidRequest,
            };
            send_error(state, session_id, Some(id), code, e.to_string());
        }
    }
}

/// Resolve a read path against a snapshot.
///
/// Paths: `/units`, `/units/{id}`, `/schedules`, `/schedules/{id}`,
/// `/status`, `/satellites`, `/satellites/{key}`, `/tle/{name}`.
pub fn resolve_path(
    snapshot: &Snapshot,
    satellites: &dyn SatelliteDirectory,
    path: &str,
) -> Result<Value, PathError> {
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').skip(1).collect();

    match segments.as_slice() {
        ["units"] => Ok(to_value(&snapshot.units)),
        ["units", unit_id] => snapshot
            .unit(unit_id)
            .map(to_value)
            .ok_or_else(|| PathError::not_found(format!("Unit not found: {unit_id}"))),
        ["schedules"] => Ok(to_value(&snapshot.schedules)),
        ["schedules", unit_id] => Ok(to_value(snapshot.schedule(unit_id))),
        ["status"] => Ok(json!({
            "link": snapshot.link,
            "awaiting_resync": snapshot.awaiting_resync,
            "revision": snapshot.revision,
            "units": snapshot.units.len(),
            "stats": snapshot.stats,
        })),
        ["satellites"] => Ok(json!(satellites.names())),
        ["satellites", key] => satellites
            .satellite_name(key)
            .map(|name| json!({ "key": key, "name": name }))
            .map_err(PathError::from),
        ["tle", name] => resolve_tle(satellites, name),
        _ => Err(PathError {
            code: ErrorCode::InvalidPath,
            message: format!("Path not found: {path}"),
        }),
    }
}

/// Two-line elements for a satellite display name
pub fn resolve_tle(satellites: &dyn SatelliteDirectory, name: &str) -> Result<Value, PathError> {
    let record = satellites.tle_by_name(name)?;
    Ok(json!({
        "name": name,
        "norad_id": record.norad_id(),
        "line1": record.line1,
        "line2": record.line2,
    }))
}

impl From<LookupError> for PathError {
    fn from(e: LookupError) -> Self {
        let code = match e {
            LookupError::NotFound(_) => ErrorCode::NotFound,
            LookupError::EmptyKey => ErrorCode::InvalidRequest,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Send an error to a specific client
fn send_error(
    state: &AppState,
    session_id: Uuid,
    id: Option<&str>,
    code: ErrorCode,
    message: impl Into<String>,
) {
    state.send_to_client(session_id, ServerMessage::error(id, code, message));
}
