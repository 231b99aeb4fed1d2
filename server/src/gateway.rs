//! Player state gateway: the only path through which player records are read
//! or written.
//!
//! The backing store is an external collaborator. [`PlayerGateway`] is the
//! seam for it; [`InMemoryPlayerStore`] backs the binary and the tests.

use crate::error::GatewayError;
use async_trait::async_trait;
use shared::{OnlinePlayer, Player, PlayerId, Role};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Typed partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerPatch {
    pub stamina: Option<i32>,
    pub max_stamina: Option<i32>,
    pub life: Option<i32>,
    pub max_life: Option<i32>,
    pub magic: Option<i32>,
    pub max_magic: Option<i32>,
    pub gold: Option<i64>,
    pub map_id: Option<String>,
    pub role: Option<Role>,
}

impl PlayerPatch {
    pub fn is_empty(&self) -> bool {
        *self == PlayerPatch::default()
    }

    pub fn apply(&self, player: &mut Player) {
        if let Some(stamina) = self.stamina {
            player.stamina = stamina;
        }
        if let Some(max_stamina) = self.max_stamina {
            player.max_stamina = max_stamina;
        }
        if let Some(life) = self.life {
            player.life = life;
        }
        if let Some(max_life) = self.max_life {
            player.max_life = max_life;
        }
        if let Some(magic) = self.magic {
            player.magic = magic;
        }
        if let Some(max_magic) = self.max_magic {
            player.max_magic = max_magic;
        }
        if let Some(gold) = self.gold {
            player.gold = gold;
        }
        if let Some(map_id) = &self.map_id {
            player.map_id = map_id.clone();
        }
        if let Some(role) = self.role {
            player.role = role;
        }
    }
}

#[async_trait]
pub trait PlayerGateway: Send + Sync {
    async fn get_by_username(&self, username: &str) -> GatewayResult<Option<Player>>;

    async fn get_by_id(&self, id: PlayerId) -> GatewayResult<Option<Player>>;

    /// Creates a player with the signup defaults. Fails if the username is taken.
    async fn create(&self, username: &str, password_hash: &str) -> GatewayResult<Player>;

    /// Persists a move: position and stamina in one write.
    async fn update_position(
        &self,
        id: PlayerId,
        x: i32,
        y: i32,
        stamina: i32,
    ) -> GatewayResult<()>;

    async fn update_fields(&self, id: PlayerId, patch: &PlayerPatch) -> GatewayResult<()>;

    /// Roster entries for the given ids; unknown ids are skipped.
    async fn list_online(&self, ids: &HashSet<PlayerId>) -> GatewayResult<Vec<OnlinePlayer>>;
}

#[derive(Default)]
struct StoreInner {
    players: HashMap<PlayerId, Player>,
    by_username: HashMap<String, PlayerId>,
    next_id: PlayerId,
}

/// Process-local player store.
#[derive(Default)]
pub struct InMemoryPlayerStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.players.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PlayerGateway for InMemoryPlayerStore {
    async fn get_by_username(&self, username: &str) -> GatewayResult<Option<Player>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_username
            .get(username)
            .and_then(|id| inner.players.get(id))
            .cloned())
    }

    async fn get_by_id(&self, id: PlayerId) -> GatewayResult<Option<Player>> {
        Ok(self.inner.read().await.players.get(&id).cloned())
    }

    async fn create(&self, username: &str, password_hash: &str) -> GatewayResult<Player> {
        let mut inner = self.inner.write().await;
        if inner.by_username.contains_key(username) {
            return Err(GatewayError::UsernameTaken(username.to_string()));
        }

        inner.next_id += 1;
        let player = Player::new(inner.next_id, username, password_hash);
        inner.by_username.insert(username.to_string(), player.id);
        inner.players.insert(player.id, player.clone());
        Ok(player)
    }

    async fn update_position(
        &self,
        id: PlayerId,
        x: i32,
        y: i32,
        stamina: i32,
    ) -> GatewayResult<()> {
        let mut inner = self.inner.write().await;
        let player = inner
            .players
            .get_mut(&id)
            .ok_or(GatewayError::NotFound(id))?;
        player.pos_x = x;
        player.pos_y = y;
        player.stamina = stamina;
        Ok(())
    }

    async fn update_fields(&self, id: PlayerId, patch: &PlayerPatch) -> GatewayResult<()> {
        let mut inner = self.inner.write().await;
        let player = inner
            .players
            .get_mut(&id)
            .ok_or(GatewayError::NotFound(id))?;
        patch.apply(player);
        Ok(())
    }

    async fn list_online(&self, ids: &HashSet<PlayerId>) -> GatewayResult<Vec<OnlinePlayer>> {
        let inner = self.inner.read().await;
        let mut online: Vec<OnlinePlayer> = ids
            .iter()
            .filter_map(|id| inner.players.get(id))
            .map(Player::online_view)
            .collect();
        online.sort_by_key(|player| player.id);
        Ok(online)
    }
}
