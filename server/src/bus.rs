//! Fan-out of protocol messages to live sessions.

use crate::session::{ConnectionHandle, ConnectionId, SessionRegistry};
use log::debug;
use shared::{PlayerId, ServerMessage};
use std::sync::Arc;

#[derive(Clone)]
pub struct BroadcastBus {
    registry: Arc<SessionRegistry>,
}

impl BroadcastBus {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Delivers to one connection. A closed connection drops the message silently.
    pub fn send(&self, connection: &ConnectionHandle, message: ServerMessage) {
        if !connection.send(message) {
            debug!("Dropped message for closed connection {}", connection.id);
        }
    }

    /// Delivers to every live session, optionally skipping one connection.
    /// Returns the number of sessions the message was queued for.
    pub async fn broadcast(&self, message: ServerMessage, except: Option<ConnectionId>) -> usize {
        let mut delivered = 0;
        for session in self.registry.live_sessions().await {
            if Some(session.connection.id) == except {
                continue;
            }
            if session.connection.send(message.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Delivers to whichever connection `player_id` is currently using, if any.
    pub async fn send_to_player(&self, player_id: PlayerId, message: ServerMessage) -> bool {
        let sessions = self.registry.live_sessions().await;
        match sessions.iter().find(|session| session.player_id == player_id) {
            Some(session) => session.connection.send(message),
            None => false,
        }
    }
}
