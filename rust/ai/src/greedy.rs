//! Levels 2 and 3: one-ply greedy choices.

use mextrain_engine::hand::Hand;
use mextrain_engine::round::RoundEngine;
use mextrain_engine::train::TrainRef;
use mextrain_engine::validator::ValidMove;

use crate::{holding, AIPolicy, AiAction};

/// Dumps the heaviest playable tile first.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreightHauler;

impl AIPolicy for FreightHauler {
    fn choose(&self, _: &RoundEngine, _: &str, moves: &[ValidMove], _: &Hand) -> AiAction {
        // max_by_key keeps the last maximum; iterate reversed so ties go to the first move
        match moves.iter().rev().max_by_key(|m| m.tile.pip_sum()) {
            Some(best) => AiAction::Play(best.clone()),
            None => AiAction::Draw,
        }
    }

    fn name(&self) -> &str {
        "freight_hauler"
    }

    fn skill_level(&self) -> u8 {
        2
    }
}

/// Prefers its own train, then the Mexican train, then other open trains. Holds back
/// doubles it has no follow-up for.
#[derive(Debug, Clone, Copy, Default)]
pub struct Switchman;

pub(crate) fn train_rank(train: &TrainRef, player: &str) -> u8 {
    match train {
        TrainRef::Personal(owner) if owner == player => 3,
        TrainRef::Mexican => 2,
        TrainRef::Personal(_) => 1,
    }
}

/// A double is worth playing only if another held tile can answer it.
pub(crate) fn orphan_double(mv: &ValidMove, hand: &Hand) -> bool {
    mv.tile.is_double() && holding(hand, mv.tile.left, mv.tile) == 0
}

impl AIPolicy for Switchman {
    fn choose(&self, _: &RoundEngine, player: &str, moves: &[ValidMove], hand: &Hand) -> AiAction {
        let keep_doubles: Vec<&ValidMove> =
            moves.iter().filter(|m| !orphan_double(m, hand)).collect();
        let pool: Vec<&ValidMove> = if keep_doubles.is_empty() {
            moves.iter().collect()
        } else {
            keep_doubles
        };
        match pool
            .iter()
            .rev()
            .max_by_key(|m| (train_rank(&m.train, player), m.tile.pip_sum()))
        {
            Some(best) => AiAction::Play((*best).clone()),
            None => AiAction::Draw,
        }
    }

    fn name(&self) -> &str {
        "switchman"
    }

    fn skill_level(&self) -> u8 {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mextrain_engine::config::DoubleRule;
    use mextrain_engine::tile::Tile;
    use mextrain_engine::validator::valid_moves;

    fn pick(policy: &dyn AIPolicy, round: &RoundEngine) -> ValidMove {
        let moves = valid_moves(round, "bot");
        match policy.choose(round, "bot", &moves, round.hand("bot").unwrap()) {
            AiAction::Play(mv) => mv,
            other => panic!("expected a play, got {other:?}"),
        }
    }

    #[test]
    fn freight_hauler_dumps_heaviest_tile() {
        let round = RoundEngine::from_deal(
            6,
            vec![
                ("bot".into(), vec![Tile::new(6, 1), Tile::new(6, 5), Tile::new(6, 3)]),
                ("you".into(), vec![Tile::new(0, 1)]),
            ],
            vec![Tile::new(4, 4)],
            DoubleRule::Scoped,
        )
        .unwrap();
        assert_eq!(pick(&FreightHauler, &round).tile, Tile::new(6, 5));
    }

    #[test]
    fn switchman_prefers_own_train_and_keeps_orphan_doubles() {
        let mut round = RoundEngine::from_deal(
            6,
            vec![
                (
                    "bot".into(),
                    vec![Tile::new(6, 1), Tile::new(1, 1), Tile::new(2, 3), Tile::new(6, 4)],
                ),
                ("you".into(), vec![Tile::new(6, 0), Tile::new(0, 2)]),
            ],
            vec![Tile::new(5, 5)],
            DoubleRule::Scoped,
        )
        .unwrap();
        // move the turn along so bot faces two trains with different ends
        round.play("bot", Tile::new(6, 1), &TrainRef::Mexican, None).unwrap();
        round.play("you", Tile::new(6, 0), &TrainRef::Personal("you".into()), None).unwrap();

        // Mexican needs 1: only [1|1] fits there, and nothing else answers it
        let mv = pick(&Switchman, &round);
        assert_eq!(mv.tile, Tile::new(6, 4));
        assert_eq!(mv.train, TrainRef::Personal("bot".into()));
    }
}
