//! Background regeneration of stamina, life and magic
//!
//! Each vital has its own cadence and runs as an independent task. A tick
//! visits every live session, and only players below their maximum are
//! written to and told about it, so a full roster costs no I/O at all.

use crate::error::GatewayError;
use crate::game::World;
use crate::gateway::PlayerPatch;
use log::{debug, warn};
use shared::{Player, PlayerId, ServerMessage, VitalsUpdate};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vital {
    Stamina,
    Life,
    Magic,
}

impl Vital {
    pub const ALL: [Vital; 3] = [Vital::Stamina, Vital::Life, Vital::Magic];

    /// Tick period, in configured time units.
    pub fn period_units(self) -> u32 {
        match self {
            Vital::Stamina => 3,
            Vital::Life => 5,
            Vital::Magic => 30,
        }
    }

    /// Amount restored per tick for a player whose maximum is `max`.
    pub fn increment(self, max: i32) -> i32 {
        match self {
            // floor(10%) and floor(5%), never less than one point
            Vital::Stamina => (max / 10).max(1),
            Vital::Life => (max / 20).max(1),
            Vital::Magic => 5,
        }
    }

    /// Current and maximum value of this vital.
    pub fn read(self, player: &Player) -> (i32, i32) {
        match self {
            Vital::Stamina => (player.stamina, player.max_stamina),
            Vital::Life => (player.life, player.max_life),
            Vital::Magic => (player.magic, player.max_magic),
        }
    }

    pub fn patch(self, value: i32) -> PlayerPatch {
        let mut patch = PlayerPatch::default();
        match self {
            Vital::Stamina => patch.stamina = Some(value),
            Vital::Life => patch.life = Some(value),
            Vital::Magic => patch.magic = Some(value),
        }
        patch
    }

    pub fn update(self, value: i32) -> VitalsUpdate {
        let mut update = VitalsUpdate::default();
        match self {
            Vital::Stamina => update.stamina = Some(value),
            Vital::Life => update.life = Some(value),
            Vital::Magic => update.magic = Some(value),
        }
        update
    }
}

/// Value after one tick, clamped to `[0, max]`.
pub fn regenerate(vital: Vital, current: i32, max: i32) -> i32 {
    current
        .saturating_add(vital.increment(max))
        .min(max)
        .max(0)
}

#[derive(Debug)]
pub struct TickReport {
    pub vital: Vital,
    pub visited: usize,
    pub updated: usize,
    pub failures: Vec<(PlayerId, GatewayError)>,
}

/// Runs one tick of `vital` over every live session.
///
/// A persistence failure for one player is reported and does not stop the
/// rest of the roster from regenerating.
pub async fn run_tick(world: &World, vital: Vital) -> TickReport {
    let sessions = world.registry.live_sessions().await;
    let mut report = TickReport {
        vital,
        visited: sessions.len(),
        updated: 0,
        failures: Vec::new(),
    };

    for session in sessions {
        let player_id = session.player_id;
        if !world.registry.is_live(player_id).await {
            continue;
        }

        match tick_player(world, vital, player_id).await {
            Ok(true) => report.updated += 1,
            Ok(false) => {}
            Err(e) => report.failures.push((player_id, e)),
        }

        // Disconnect may have released the lock entry while this tick held it.
        if !world.registry.is_live(player_id).await {
            world.locks.release(player_id);
        }
    }

    report
}

/// Regenerates one player under their lock. Returns whether anything changed.
async fn tick_player(world: &World, vital: Vital, player_id: PlayerId) -> Result<bool, GatewayError> {
    let _guard = world.locks.lock(player_id).await;

    let Some(player) = world.gateway.get_by_id(player_id).await? else {
        return Ok(false);
    };

    let (current, max) = vital.read(&player);
    let next = regenerate(vital, current, max);
    if next == current {
        return Ok(false);
    }

    world
        .gateway
        .update_fields(player_id, &vital.patch(next))
        .await?;
    world
        .bus
        .send_to_player(player_id, ServerMessage::Vitals(vital.update(next)))
        .await;
    Ok(true)
}

/// Owns the three regeneration tasks; dropping it stops them.
pub struct RegenScheduler {
    handles: Vec<JoinHandle<()>>,
}

impl RegenScheduler {
    /// Starts one task per vital. Fails if the configured time unit is unusable.
    pub fn spawn(world: World) -> crate::error::Result<Self> {
        world.config.validate()?;
        let handles = Vital::ALL
            .into_iter()
            .map(|vital| {
                let world = world.clone();
                tokio::spawn(async move { run_schedule(world, vital).await })
            })
            .collect();
        Ok(Self { handles })
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for RegenScheduler {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn run_schedule(world: World, vital: Vital) {
    let period = world.config.time_unit * vital.period_units();
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    timer.tick().await;

    loop {
        timer.tick().await;

        let report = run_tick(&world, vital).await;
        for (player_id, error) in &report.failures {
            warn!(
                "{:?} regeneration failed for player {}: {}",
                vital, player_id, error
            );
        }
        if report.updated > 0 {
            debug!(
                "{:?} tick: {}/{} sessions regenerated",
                vital, report.updated, report.visited
            );
        }
    }
}
