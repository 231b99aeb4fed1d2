//! Movement validation: one tile per request, paid for with stamina.

use crate::error::GatewayError;
use crate::game::World;
use log::debug;
use shared::{in_bounds, Player, PlayerId, ServerMessage, VitalsUpdate};

pub const MOVE_STAMINA_COST: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    UnknownPlayer,
    Exhausted,
    OutOfBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResult {
    Moved { x: i32, y: i32, stamina: i32 },
    Rejected(MoveRejection),
}

/// Works out the outcome of a move without touching any state.
///
/// Deltas come from the client and are reduced to their sign, so a request
/// can never cover more than one tile per axis.
pub fn plan_move(player: &Player, dx: i32, dy: i32) -> MoveResult {
    if player.stamina <= 0 {
        return MoveResult::Rejected(MoveRejection::Exhausted);
    }

    let x = player.pos_x + dx.signum();
    let y = player.pos_y + dy.signum();
    if !in_bounds(x, y) {
        return MoveResult::Rejected(MoveRejection::OutOfBounds);
    }

    MoveResult::Moved {
        x,
        y,
        stamina: (player.stamina - MOVE_STAMINA_COST).max(0),
    }
}

/// Applies a move for `player_id` and publishes it
///
/// Runs inside the player's exclusive section: the read, the write, and the
/// outgoing messages are ordered with respect to regeneration ticks and admin
/// refreshes of the same player. Rejections are silent.
pub async fn apply_move(
    world: &World,
    player_id: PlayerId,
    dx: i32,
    dy: i32,
) -> Result<MoveResult, GatewayError> {
    let _guard = world.locks.lock(player_id).await;

    let result = match world.gateway.get_by_id(player_id).await? {
        Some(player) => plan_move(&player, dx, dy),
        None => MoveResult::Rejected(MoveRejection::UnknownPlayer),
    };

    match result {
        MoveResult::Moved { x, y, stamina } => {
            world
                .gateway
                .update_position(player_id, x, y, stamina)
                .await?;
            world
                .bus
                .broadcast(ServerMessage::PlayerMoved { id: player_id, x, y }, None)
                .await;
            world
                .bus
                .send_to_player(
                    player_id,
                    ServerMessage::Vitals(VitalsUpdate {
                        stamina: Some(stamina),
                        ..Default::default()
                    }),
                )
                .await;
        }
        MoveResult::Rejected(reason) => {
            debug!("Move by player {} rejected: {:?}", player_id, reason);
        }
    }

    Ok(result)
}
