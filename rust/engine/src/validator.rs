//! Legal-move enumeration.
//!
//! Everything here is a pure function of the round's current state. Calling
//! [`valid_moves`] twice with no mutation in between yields identical results, and an
//! empty result means the player has to draw (or pass when the boneyard is empty).

use serde::{Deserialize, Serialize};

use crate::config::DoubleRule;
use crate::errors::GameError;
use crate::round::RoundEngine;
use crate::tile::{Orientation, Tile};
use crate::train::{Train, TrainRef};

/// One legal placement: which tile, on which train, laid which way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidMove {
    pub tile: Tile,
    pub train: TrainRef,
    pub orientation: Orientation,
}

/// Every legal placement for `player`, ordered by hand position then train
/// (personal trains in seat order, Mexican train last).
pub fn valid_moves(round: &RoundEngine, player: &str) -> Vec<ValidMove> {
    let Some(hand) = round.hand(player) else {
        return Vec::new();
    };
    let candidates: Vec<Tile> = match round.pending_drawn_tile(player) {
        Some(drawn) => vec![drawn],
        None => hand.tiles().to_vec(),
    };
    enumerate(round, player, &candidates)
}

/// Legal placements of one specific tile. Empty if the tile is not in the player's hand.
pub fn valid_moves_for_tile(round: &RoundEngine, player: &str, tile: Tile) -> Vec<ValidMove> {
    let Some(hand) = round.hand(player) else {
        return Vec::new();
    };
    let Some(held) = hand.iter().find(|t| **t == tile).copied() else {
        return Vec::new();
    };
    if let Some(drawn) = round.pending_drawn_tile(player) {
        if drawn != held {
            return Vec::new();
        }
    }
    enumerate(round, player, &[held])
}

pub fn has_valid_move(round: &RoundEngine, player: &str) -> bool {
    !valid_moves(round, player).is_empty()
}

/// Resolves a requested placement to the legal move it denotes, or `IllegalMove`.
///
/// A requested orientation must put the matching end first; doubles accept either.
pub fn find_move(
    round: &RoundEngine,
    player: &str,
    tile: Tile,
    train: &TrainRef,
    orientation: Option<Orientation>,
) -> Result<ValidMove, GameError> {
    let mv = valid_moves_for_tile(round, player, tile)
        .into_iter()
        .find(|m| &m.train == train)
        .ok_or_else(|| GameError::IllegalMove(format!("{tile} cannot be played on {train}")))?;
    match orientation {
        Some(o) if !mv.tile.is_double() && o != mv.orientation => Err(GameError::IllegalMove(
            format!("{tile} must be laid {:?} on {train}", mv.orientation),
        )),
        _ => Ok(mv),
    }
}

fn enumerate(round: &RoundEngine, player: &str, candidates: &[Tile]) -> Vec<ValidMove> {
    let targets: Vec<&Train> = round
        .trains()
        .filter(|t| t.is_playable_by(t.is_owned_by(player)))
        .collect();

    let blocking: Vec<&Train> = targets
        .iter()
        .copied()
        .filter(|t| t.needs_double_satisfaction())
        .filter(|t| match round.double_rule() {
            DoubleRule::Scoped => t.is_owned_by(player) || t.is_mexican(),
            DoubleRule::Global => true,
        })
        .collect();
    let scope = if blocking.is_empty() { targets } else { blocking };

    let mut moves = Vec::new();
    for tile in candidates {
        for train in &scope {
            if !train.can_accept(*tile, train.is_owned_by(player)) {
                continue;
            }
            if let Some(orientation) = tile.orientation_for(train.required_value()) {
                moves.push(ValidMove {
                    tile: *tile,
                    train: train.reference(),
                    orientation,
                });
            }
        }
    }
    moves
}
