//! Shared world context and session establishment (login, signup, disconnect).

use crate::bus::BroadcastBus;
use crate::chat::ContentFilter;
use crate::config::{SeedAccount, ServerConfig};
use crate::credentials::{hash_password, verify_password};
use crate::error::{GatewayError, Result};
use crate::gateway::{PlayerGateway, PlayerPatch};
use crate::locks::PlayerLocks;
use crate::map::MapRepository;
use crate::session::{ConnectionHandle, ConnectionId, SessionRegistry};
use log::{info, warn};
use shared::{Player, Role, ServerMessage};
use std::sync::Arc;

pub const INVALID_CREDENTIALS: &str = "Invalid username or password";
pub const USERNAME_TAKEN: &str = "Username already exists";
pub const MISSING_CREDENTIALS: &str = "Username and password are required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Login,
    Signup,
}

/// Everything a connection task or background process needs, cheap to clone.
#[derive(Clone)]
pub struct World {
    pub config: Arc<ServerConfig>,
    pub gateway: Arc<dyn PlayerGateway>,
    pub maps: Arc<MapRepository>,
    pub registry: Arc<SessionRegistry>,
    pub bus: BroadcastBus,
    pub locks: Arc<PlayerLocks>,
    pub chat_filter: Arc<ContentFilter>,
}

impl World {
    pub fn new(config: ServerConfig, gateway: Arc<dyn PlayerGateway>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            maps: Arc::new(MapRepository::new(config.maps_dir.clone())),
            config: Arc::new(config),
            gateway,
            bus: BroadcastBus::new(Arc::clone(&registry)),
            registry,
            locks: Arc::new(PlayerLocks::new()),
            chat_filter: Arc::new(ContentFilter::standard()),
        }
    }

    pub fn with_chat_filter(mut self, filter: ContentFilter) -> Self {
        self.chat_filter = Arc::new(filter);
        self
    }

    /// Authenticates and binds `connection`. Returns false on bad credentials,
    /// after replying with `login_error`; the connection stays usable.
    pub async fn login(
        &self,
        connection: &ConnectionHandle,
        username: &str,
        password: &str,
    ) -> Result<bool> {
        let username = username.trim();
        let player = match self.gateway.get_by_username(username).await? {
            Some(player) if verify_password(password, &player.password_hash) => player,
            _ => {
                warn!("Failed login for {:?} from {}", username, connection.addr);
                self.bus.send(
                    connection,
                    ServerMessage::LoginError {
                        message: INVALID_CREDENTIALS.to_string(),
                    },
                );
                return Ok(false);
            }
        };

        self.establish(connection, player, Entry::Login).await?;
        Ok(true)
    }

    /// Creates an account and binds `connection` to it. Returns false when the
    /// request was refused with `signup_error`.
    pub async fn signup(
        &self,
        connection: &ConnectionHandle,
        username: &str,
        password: &str,
    ) -> Result<bool> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Ok(self.refuse_signup(connection, MISSING_CREDENTIALS));
        }
        if self.gateway.get_by_username(username).await?.is_some() {
            return Ok(self.refuse_signup(connection, USERNAME_TAKEN));
        }

        let player = match self.gateway.create(username, &hash_password(password)).await {
            Ok(player) => player,
            // Lost a race against a concurrent signup for the same name.
            Err(GatewayError::UsernameTaken(_)) => {
                return Ok(self.refuse_signup(connection, USERNAME_TAKEN))
            }
            Err(e) => return Err(e.into()),
        };

        info!("Created account {} (id {})", player.username, player.id);
        self.establish(connection, player, Entry::Signup).await?;
        Ok(true)
    }

    fn refuse_signup(&self, connection: &ConnectionHandle, message: &str) -> bool {
        self.bus.send(
            connection,
            ServerMessage::SignupError {
                message: message.to_string(),
            },
        );
        false
    }

    async fn establish(
        &self,
        connection: &ConnectionHandle,
        player: Player,
        entry: Entry,
    ) -> Result<()> {
        // Load the map first so a broken map never leaves a half-established session.
        let map = self
            .maps
            .load(
                &player.map_id,
                self.config.floor_count,
                self.config.item_count,
            )
            .await?;

        // The roster is fetched before binding: a failure here must leave the
        // connection exactly as it was.
        let mut live = self.registry.list_live_player_ids().await;
        if let Some(current) = self.registry.session(connection.id).await {
            if current.player_id != player.id {
                live.remove(&current.player_id);
            }
        }
        live.insert(player.id);
        let players = self.gateway.list_online(&live).await?;

        let outcome = self
            .registry
            .bind(connection.clone(), player.id, &player.username)
            .await;
        if let Some(previous) = outcome.replaced {
            self.bus
                .broadcast(ServerMessage::PlayerLeft { id: previous.player_id }, None)
                .await;
        }

        let map = map.to_view();
        let joined = player.online_view();

        info!(
            "{} logged in on connection {} ({} online)",
            player.username,
            connection.id,
            players.len()
        );

        let reply = match entry {
            Entry::Login => ServerMessage::LoginSuccess {
                player,
                players,
                map,
            },
            Entry::Signup => ServerMessage::SignupSuccess {
                player,
                players,
                map,
            },
        };
        self.bus.send(connection, reply);

        // A displaced or re-bound account never left, so the others already know it.
        if outcome.displaced.is_none() && !outcome.rebound {
            self.bus
                .broadcast(ServerMessage::PlayerJoined { player: joined }, Some(connection.id))
                .await;
        }
        Ok(())
    }

    /// Releases whatever session `connection_id` held and announces the departure.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        if let Some(session) = self.registry.unbind(connection_id).await {
            info!("{} disconnected", session.username);
            self.locks.release(session.player_id);
            self.bus
                .broadcast(ServerMessage::PlayerLeft { id: session.player_id }, None)
                .await;
        }
    }

    /// Creates the seed accounts that do not exist yet. Returns how many were created.
    pub async fn seed_accounts(&self, accounts: &[SeedAccount]) -> Result<usize> {
        let mut created = 0;
        for account in accounts {
            if self.gateway.get_by_username(&account.username).await?.is_some() {
                continue;
            }
            let player = self
                .gateway
                .create(&account.username, &hash_password(&account.password))
                .await?;
            if account.role != Role::Player {
                let patch = PlayerPatch {
                    role: Some(account.role),
                    ..Default::default()
                };
                self.gateway.update_fields(player.id, &patch).await?;
            }
            created += 1;
        }
        Ok(created)
    }
}
