//! # World Server Library
//!
//! This library provides the authoritative core of a persistent multiplayer
//! world server. Clients connect over websockets, authenticate, walk around a
//! tile map, chat, and receive vitals updates, while the server owns every
//! piece of player state.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Handles the lifecycle of authenticated connections:
//! - Login and signup against the player store
//! - One live session per account, with older connections displaced
//! - Join and leave announcements to everyone online
//!
//! ### Authoritative Actions
//! Movement and chat requests are validated here. A move costs stamina and may
//! never leave the map; chat passes a content filter before it is broadcast,
//! and admins may refresh another player's vitals through a chat command.
//!
//! ### Regeneration
//! Stamina, life and magic regenerate on independent timers. Every change to a
//! single player's state happens inside that player's exclusive section, so a
//! move racing a regeneration tick can never lose an update.
//!
//! ## Module Organization
//!
//! - `network`: websocket accept loop and per-connection receive loop
//! - `game`: the shared [`game::World`] context, login, signup and disconnect
//! - `session`: connection handles and the session registry
//! - `bus`: targeted sends and broadcasts over live sessions
//! - `movement`, `chat`, `regen`: the gameplay operations
//! - `map`: binary map decoding and the map cache
//! - `gateway`: persistence boundary and the in-memory player store
//! - `locks`: per-player mutual exclusion
//! - `credentials`, `config`, `error`: supporting pieces
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::game::World;
//! use server::gateway::InMemoryPlayerStore;
//! use server::network::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = World::new(ServerConfig::default(), Arc::new(InMemoryPlayerStore::new()));
//!
//!     // Accepts connections and runs regeneration until the future is dropped
//!     Server::bind(world).await?.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod chat;
pub mod config;
pub mod credentials;
pub mod error;
pub mod game;
pub mod gateway;
pub mod locks;
pub mod map;
pub mod movement;
pub mod network;
pub mod regen;
pub mod session;
