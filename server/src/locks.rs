//! Per-player exclusive sections.
//!
//! Every read-compute-write on a player's position or vitals runs while
//! holding that player's guard, whether it comes from a connection, a
//! regeneration tick or an admin command. Different players never contend.

use shared::PlayerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub type PlayerGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct PlayerLocks {
    locks: Mutex<HashMap<PlayerId, Arc<AsyncMutex<()>>>>,
}

impl PlayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `player_id`.
    pub async fn lock(&self, player_id: PlayerId) -> PlayerGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(player_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the entry for `player_id` if nobody holds or waits on it.
    pub fn release(&self, player_id: PlayerId) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(&player_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&player_id);
            }
        }
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
