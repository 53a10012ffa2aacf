//! WebSocket Protocol Messages
//!
//! Defines the message types exchanged between dashboard clients and the
//! server.

use groundlink_types::{Command, LinkStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Subscribe to paths for real-time updates
    Subscribe {
        /// Request ID for correlation
        id: String,
        /// Paths to subscribe to (supports wildcards)
        paths: Vec<String>,
    },

    /// Unsubscribe from paths
    Unsubscribe { id: String, paths: Vec<String> },

    /// Get data at a path
    Get { id: String, path: String },

    /// Issue a command to a field unit
    Command {
        id: String,
        fu_id: String,
        command: Command,
    },

    /// Ping for keep-alive
    Ping { id: String },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent on initial connection
    Connected {
        session_id: String,
        server_version: String,
    },

    /// Response to a client request
    Response {
        id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Push notification for subscribed paths
    Change {
        path: String,
        change_type: ChangeType,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    /// Push channel status, sent to every client
    Link { status: LinkStatus },

    /// Error message
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: ErrorCode,
        message: String,
    },

    /// Pong response to ping
    Pong { id: String },
}

/// Type of change for push notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

/// Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    InvalidPath,
    NotFound,
    InternalError,
}

impl ServerMessage {
    /// Create a success response
    pub fn success(id: impl Into<String>, data: Option<Value>) -> Self {
        Self::Response {
            id: id.into(),
            success: true,
            data,
            error: None,
        }
    }

    /// Create a change notification
    pub fn change(path: impl Into<String>, change_type: ChangeType, data: Option<Value>) -> Self {
        Self::Change {
            path: path.into(),
            change_type,
            data,
        }
    }

    /// Create an error message
    pub fn error(id: Option<&str>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            id: id.map(String::from),
            code,
            message: message.into(),
        }
    }

    /// Create a connected message
    pub fn connected(session_id: impl Into<String>) -> Self {
        Self::Connected {
            session_id: session_id.into(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Create a pong message
    pub fn pong(id: impl Into<String>) -> Self {
        Self::Pong { id: id.into() }
    }
}
