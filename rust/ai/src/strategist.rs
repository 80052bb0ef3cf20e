//! Levels 4 and 5: score every legal move with a look at the chain left behind.

use mextrain_engine::hand::Hand;
use mextrain_engine::round::RoundEngine;
use mextrain_engine::tile::Tile;
use mextrain_engine::train::TrainRef;
use mextrain_engine::validator::ValidMove;

use crate::greedy::orphan_double;
use crate::{holding, AIPolicy, AiAction};

/// Upper bound on search steps for one chain evaluation.
const SEARCH_BUDGET: usize = 20_000;

/// Length of the longest chain buildable from `tiles` starting at pip `start`.
pub fn longest_chain(tiles: &[Tile], start: u8) -> usize {
    let mut used = vec![false; tiles.len()];
    let mut budget = SEARCH_BUDGET;
    extend(tiles, start, &mut used, &mut budget)
}

fn extend(tiles: &[Tile], end: u8, used: &mut [bool], budget: &mut usize) -> usize {
    let mut best = 0;
    for i in 0..tiles.len() {
        if used[i] {
            continue;
        }
        let Some(next) = tiles[i].other_end(end) else {
            continue;
        };
        if *budget == 0 {
            break;
        }
        *budget -= 1;
        used[i] = true;
        best = best.max(1 + extend(tiles, next, used, budget));
        used[i] = false;
    }
    best
}

/// Pip the move leaves exposed on its train.
fn exposed_end(mv: &ValidMove) -> u8 {
    mv.tile.oriented(mv.orientation).right
}

fn is_own(mv: &ValidMove, player: &str) -> bool {
    matches!(&mv.train, TrainRef::Personal(owner) if owner == player)
}

fn chain_score(round: &RoundEngine, player: &str, mv: &ValidMove, hand: &Hand) -> i64 {
    let remaining: Vec<Tile> = hand.iter().copied().filter(|t| *t != mv.tile).collect();
    let own_end = if is_own(mv, player) {
        exposed_end(mv)
    } else {
        round
            .train(&TrainRef::Personal(player.to_string()))
            .map(|t| t.required_value())
            .unwrap_or(round.engine_value())
    };
    let chain = longest_chain(&remaining, own_end) as i64;

    let mut values = vec![mv.tile.left, mv.tile.right];
    values.dedup();
    let lonely = values
        .iter()
        .filter(|v| holding(hand, **v, mv.tile) == 0)
        .count() as i64;

    2 * mv.tile.pip_sum() as i64 + 5 * chain + 3 * lonely
}

/// Highest-scoring move, ties to the earliest. `Draw` when there is nothing to play.
fn best_by<F>(moves: &[ValidMove], score: F) -> AiAction
where
    F: Fn(&ValidMove) -> i64,
{
    match moves.iter().rev().max_by_key(|m| score(m)) {
        Some(best) => AiAction::Play(best.clone()),
        None => AiAction::Draw,
    }
}

/// Weighs pips, lonely values and the longest chain left for its own train.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainStrategist;

impl AIPolicy for ChainStrategist {
    fn choose(&self, round: &RoundEngine, player: &str, moves: &[ValidMove], hand: &Hand) -> AiAction {
        best_by(moves, |m| chain_score(round, player, m, hand))
    }

    fn name(&self) -> &str {
        "chain_strategist"
    }

    fn skill_level(&self) -> u8 {
        4
    }
}

/// Chain planning plus defense: shuts its own open train, avoids doubles it cannot
/// answer, and on shared trains exposes values it holds itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocomotiveLegend;

impl LocomotiveLegend {
    fn score(round: &RoundEngine, player: &str, mv: &ValidMove, hand: &Hand) -> i64 {
        let mut score = chain_score(round, player, mv, hand);
        if orphan_double(mv, hand) {
            score -= 10;
        }
        if is_own(mv, player) {
            score += 3;
            let open = round
                .train(&mv.train)
                .map(|t| t.is_open())
                .unwrap_or(false);
            if open {
                score += 5;
            }
        } else {
            score += 2 * holding(hand, exposed_end(mv), mv.tile) as i64;
        }
        score
    }
}

impl AIPolicy for LocomotiveLegend {
    fn choose(&self, round: &RoundEngine, player: &str, moves: &[ValidMove], hand: &Hand) -> AiAction {
        best_by(moves, |m| Self::score(round, player, m, hand))
    }

    fn name(&self) -> &str {
        "locomotive_legend"
    }

    fn skill_level(&self) -> u8 {
        5
    }
}
