//! Server Application State
//!
//! Shared state accessible by all WebSocket handlers.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;
use wildmatch::WildMatch;

use crate::catalog::SatelliteDirectory;
use crate::dispatch::CommandDispatcher;
use crate::session::SessionHandle;

use super::protocol::ServerMessage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Dashboard session (read side)
    session: SessionHandle,

    /// Outbound unit commands
    dispatcher: CommandDispatcher,

    /// Satellite name lookup
    satellites: Arc<dyn SatelliteDirectory>,

    /// Connected clients
    clients: DashMap<Uuid, ClientState>,
}

/// Per-client state
#[derive(Debug, Clone)]
pub struct ClientState {
    /// Client session ID
    pub session_id: Uuid,

    /// Subscribed paths (with potential wildcards)
    pub subscriptions: HashSet<String>,

    /// Channel to send messages to this client
    pub tx: mpsc::Sender<ServerMessage>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        session: SessionHandle,
        dispatcher: CommandDispatcher,
        satellites: Arc<dyn SatelliteDirectory>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                session,
                dispatcher,
                satellites,
                clients: DashMap::new(),
            }),
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.inner.session
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.inner.dispatcher
    }

    pub fn satellites(&self) -> &dyn SatelliteDirectory {
        self.inner.satellites.as_ref()
    }

    /// Register a new client connection
    pub fn register_client(&self, tx: mpsc::Sender<ServerMessage>) -> Uuid {
        let session_id = Uuid::new_v4();
        let client = ClientState {
            session_id,
            subscriptions: HashSet::new(),
            tx,
        };

        self.inner.clients.insert(session_id, client);
        tracing::info!(%session_id, "Client connected");

        session_id
    }

    /// Remove a client connection
    pub fn remove_client(&self, session_id: Uuid) {
        self.inner.clients.remove(&session_id);
        tracing::info!(%session_id, "Client disconnected");
    }

    /// Add subscriptions for a client
    pub fn subscribe(&self, session_id: Uuid, paths: &[String]) {
        if let Some(mut client) = self.inner.clients.get_mut(&session_id) {
            for path in paths {
                tracing::debug!(%session_id, %path, "Subscribed");
                client.subscriptions.insert(path.clone());
            }
        }
    }

    /// Remove subscriptions for a client
    pub fn unsubscribe(&self, session_id: Uuid, paths: &[String]) {
        if let Some(mut client) = self.inner.clients.get_mut(&session_id) {
            for path in paths {
                client.subscriptions.remove(path);
            }
        }
    }

    /// Get subscriptions for a client
    pub fn get_subscriptions(&self, session_id: Uuid) -> HashSet<String> {
        self.inner
            .clients
            .get(&session_id)
            .map(|c| c.subscriptions.clone())
            .unwrap_or_default()
    }

    /// Send a message to all clients subscribed to a path
    pub fn broadcast(&self, path: &str, message: ServerMessage) {
        for client in self.inner.clients.iter() {
            if !Self::matches_any_subscription(&client.subscriptions, path) {
                continue;
            }
            if let Err(e) = client.tx.try_send(message.clone()) {
                tracing::warn!(session_id = %client.session_id, %path, "Failed to send change: {}", e);
            }
        }
    }

    /// Send a message to every connected client
    pub fn broadcast_all(&self, message: ServerMessage) {
        for client in self.inner.clients.iter() {
            if let Err(e) = client.tx.try_send(message.clone()) {
                tracing::warn!(session_id = %client.session_id, "Failed to send message: {}", e);
            }
        }
    }

    /// Check if a path matches any subscription pattern.
    ///
    /// `/units/*` matches one level below `/units`, `/units/**` any depth,
    /// other patterns go through wildmatch.
    pub(crate) fn matches_any_subscription(subscriptions: &HashSet<String>, path: &str) -> bool {
        subscriptions.iter().any(|pattern| {
            if pattern == path {
                return true;
            }

            if let Some(prefix) = pattern.strip_suffix("/**") {
                return match path.strip_prefix(prefix) {
                    Some(rest) => rest.is_empty() || rest.starts_with('/'),
                    None => false,
                };
            }

            if let Some(prefix) = pattern.strip_suffix("/*") {
                return match path.strip_prefix(prefix) {
                    Some("") => true,
                    Some(rest) => rest
                        .strip_prefix('/')
                        .is_some_and(|segment| !segment.contains('/')),
                    None => false,
                };
            }

            WildMatch::new(pattern).matches(path)
        })
    }

    /// Get the number of connected clients
    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    /// Send a message to a specific client
    pub fn send_to_client(&self, session_id: Uuid, message: ServerMessage) {
        if let Some(client) = self.inner.clients.get(&session_id) {
            let _ = client.tx.try_send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_subscriptions(patterns: &[&str]) -> HashSet<String> {
        patterns.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        let subs = create_subscriptions(&["/units/FU1"]);
        assert!(AppState::matches_any_subscription(&subs, "/units/FU1"));
        assert!(!AppState::matches_any_subscription(&subs, "/units/FU2"));
    }

    #[test]
    fn test_single_wildcard() {
        let subs = create_subscriptions(&["/units/*"]);
        assert!(AppState::matches_any_subscription(&subs, "/units/FU1"));
        assert!(AppState::matches_any_subscription(&subs, "/units"));
        assert!(!AppState::matches_any_subscription(&subs, "/units/FU1/live"));
        assert!(!AppState::matches_any_subscription(&subs, "/schedules/FU1"));
    }

    #[test]
    fn test_recursive_wildcard() {
        let subs = create_subscriptions(&["/units/**"]);
        assert!(AppState::matches_any_subscription(&subs, "/units/FU1"));
        assert!(AppState::matches_any_subscription(&subs, "/units/FU1/live"));
        assert!(AppState::matches_any_subscription(&subs, "/units"));
        assert!(!AppState::matches_any_subscription(&subs, "/schedules/FU1"));
        assert!(!AppState::matches_any_subscription(&subs, "/unitsX/FU1"));
    }

    #[test]
    fn test_multiple_subscriptions() {
        let subs = create_subscriptions(&["/units/*", "/schedules/FU?"]);
        assert!(AppState::matches_any_subscription(&subs, "/units/FU1"));
        assert!(AppState::matches_any_subscription(&subs, "/schedules/FU2"));
        assert!(!AppState::matches_any_subscription(&subs, "/schedules/FU10"));
        assert!(!AppState::matches_any_subscription(&subs, "/status"));
    }
}
