//! Level 1: picks uniformly among the legal moves.

use std::sync::Mutex;

use mextrain_engine::hand::Hand;
use mextrain_engine::round::RoundEngine;
use mextrain_engine::validator::ValidMove;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{AIPolicy, AiAction};

/// Plays any legal tile at random and only draws when it has to.
#[derive(Debug)]
pub struct SleepyCaboose {
    rng: Mutex<ChaCha20Rng>,
}

impl SleepyCaboose {
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }
}

impl AIPolicy for SleepyCaboose {
    fn choose(&self, _: &RoundEngine, _: &str, moves: &[ValidMove], _: &Hand) -> AiAction {
        if moves.is_empty() {
            return AiAction::Draw;
        }
        let idx = match self.rng.lock() {
            Ok(mut rng) => rng.random_range(0..moves.len()),
            // a poisoned generator still yields a legal move
            Err(_) => 0,
        };
        AiAction::Play(moves[idx].clone())
    }

    fn name(&self) -> &str {
        "sleepy_caboose"
    }

    fn skill_level(&self) -> u8 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mextrain_engine::config::DoubleRule;
    use mextrain_engine::tile::Tile;

    #[test]
    fn same_seed_same_choices() {
        let round = RoundEngine::from_deal(
            6,
            vec![
                (
                    "bot".into(),
                    vec![Tile::new(6, 1), Tile::new(6, 2), Tile::new(6, 3)],
                ),
                ("you".into(), vec![Tile::new(0, 1)]),
            ],
            vec![Tile::new(4, 4)],
            DoubleRule::Scoped,
        )
        .unwrap();
        let moves = mextrain_engine::validator::valid_moves(&round, "bot");
        let hand = round.hand("bot").unwrap();
        let a = SleepyCaboose::new(Some(11));
        let b = SleepyCaboose::new(Some(11));
        for _ in 0..10 {
            let pa = a.choose(&round, "bot", &moves, hand);
            assert_eq!(pa, b.choose(&round, "bot", &moves, hand));
            assert!(matches!(pa, AiAction::Play(mv) if moves.contains(&mv)));
        }
    }
}
