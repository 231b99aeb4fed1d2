//! Session tracking for authenticated connections
//!
//! This module owns the binding between live connections and the players they
//! are logged in as:
//! - Connection handles that queue outbound messages for a socket writer task
//! - Binding and unbinding of sessions as players log in and disconnect
//! - Enforcement of one live session per account (displacement)
//! - Roster queries used by broadcasting and regeneration
//!
//! All mutation goes through [`SessionRegistry::bind`] and
//! [`SessionRegistry::unbind`]; the maps are never exposed.

use log::{debug, info};
use shared::{PlayerId, ServerMessage};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};

pub type ConnectionId = u64;

/// Reason sent to a connection that is displaced by a newer login.
pub const DISPLACED_REASON: &str = "Logged in from another location";

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Items queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close,
}

/// Cheap, cloneable handle to one open connection
///
/// The handle never touches the socket directly. Messages are queued on an
/// unbounded channel drained by the connection's writer task, so sending is
/// synchronous and never blocks the caller on a slow peer.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Process-unique connection identifier
    pub id: ConnectionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Creates a handle with a fresh id and returns the receiving end of its queue.
    pub fn new(addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, addr, tx }, rx)
    }

    /// Queues a message. Returns false when the connection is already gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(Outbound::Message(message)).is_ok()
    }

    /// Asks the writer task to send a close frame and stop.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// A live binding between a connection and an authenticated player
#[derive(Debug, Clone)]
pub struct Session {
    pub connection: ConnectionHandle,
    pub player_id: PlayerId,
    pub username: String,
}

/// What changed when a session was bound
#[derive(Debug, Default)]
pub struct BindOutcome {
    /// Older session of the same account, already notified and closed
    pub displaced: Option<Session>,
    /// Account this connection was bound to before, if it switched accounts
    pub replaced: Option<Session>,
    /// The connection was already bound to this same account
    pub rebound: bool,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<ConnectionId, Session>,
    by_username: HashMap<String, ConnectionId>,
}

/// Tracks which connection each online player is using
///
/// The registry guarantees at most one live session per username. Binding a
/// second connection for an account displaces the first one inside the same
/// critical section, so there is no instant at which both are bound.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `connection` to a player, displacing any other connection of the same account
    ///
    /// The displaced connection receives a `disconnected` message and is
    /// closed before the new binding is installed. If `connection` was bound
    /// to a different account, that binding is released first.
    pub async fn bind(
        &self,
        connection: ConnectionHandle,
        player_id: PlayerId,
        username: &str,
    ) -> BindOutcome {
        let mut inner = self.inner.write().await;
        let mut outcome = BindOutcome::default();

        if let Some(existing_id) = inner.by_username.get(username).copied() {
            if existing_id != connection.id {
                if let Some(old) = inner.sessions.remove(&existing_id) {
                    info!(
                        "Displacing connection {} of {} in favour of {}",
                        old.connection.id, username, connection.id
                    );
                    old.connection.send(ServerMessage::Disconnected {
                        reason: DISPLACED_REASON.to_string(),
                    });
                    old.connection.close();
                    outcome.displaced = Some(old);
                }
            }
        }

        if let Some(previous) = inner.sessions.remove(&connection.id) {
            if previous.username != username {
                inner.by_username.remove(&previous.username);
                outcome.replaced = Some(previous);
            } else {
                outcome.rebound = true;
            }
        }

        inner
            .by_username
            .insert(username.to_string(), connection.id);
        inner.sessions.insert(
            connection.id,
            Session {
                connection,
                player_id,
                username: username.to_string(),
            },
        );

        outcome
    }

    /// Releases the session of `connection_id`, returning it if one was bound.
    pub async fn unbind(&self, connection_id: ConnectionId) -> Option<Session> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.remove(&connection_id)?;
        if inner.by_username.get(&session.username) == Some(&connection_id) {
            inner.by_username.remove(&session.username);
        }
        debug!(
            "Released session of {} on connection {}",
            session.username, connection_id
        );
        Some(session)
    }

    pub async fn find_connection_by_username(&self, username: &str) -> Option<ConnectionHandle> {
        self.find_session_by_username(username)
            .await
            .map(|session| session.connection)
    }

    pub async fn find_session_by_username(&self, username: &str) -> Option<Session> {
        let inner = self.inner.read().await;
        inner
            .by_username
            .get(username)
            .and_then(|id| inner.sessions.get(id))
            .cloned()
    }

    pub async fn session(&self, connection_id: ConnectionId) -> Option<Session> {
        self.inner.read().await.sessions.get(&connection_id).cloned()
    }

    pub async fn list_live_player_ids(&self) -> HashSet<PlayerId> {
        self.inner
            .read()
            .await
            .sessions
            .values()
            .map(|session| session.player_id)
            .collect()
    }

    /// Whether `player_id` currently has a live session on any connection.
    pub async fn is_live(&self, player_id: PlayerId) -> bool {
        self.inner
            .read()
            .await
            .sessions
            .values()
            .any(|session| session.player_id == player_id)
    }

    /// Snapshot of all live sessions.
    pub async fn live_sessions(&self) -> Vec<Session> {
        self.inner.read().await.sessions.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
