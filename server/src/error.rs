//! Error types surfaced by the server core.

use shared::PlayerId;
use thiserror::Error;

/// Failure to produce a decoded map. Never partially populated.
#[derive(Debug, Error)]
pub enum MapLoadError {
    #[error("failed to read map {map_id}: {source}")]
    Io {
        map_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("map {map_id} is too short: expected {expected} bytes, found {actual}")]
    TooShort {
        map_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid map identifier: {0:?}")]
    InvalidId(String),
}

/// Errors raised by a player state gateway implementation.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("player {0} not found")]
    NotFound(PlayerId),

    #[error("username {0:?} is already taken")]
    UsernameTaken(String),

    #[error("persistence backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Map(#[from] MapLoadError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
