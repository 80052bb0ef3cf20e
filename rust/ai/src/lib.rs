//! # mextrain-ai: AI Players for Mexican Train
//!
//! Computer opponents at five skill levels behind one [`AIPolicy`] trait. A policy only
//! ever picks from the validator's legal moves; [`decide`] re-checks the pick before it
//! reaches the engine.
//!
//! ## Core Components
//!
//! - [`AIPolicy`] - Trait every skill level implements
//! - [`random`] - Level 1, uniformly random legal moves
//! - [`greedy`] - Levels 2 and 3, pip dumping and train preference
//! - [`strategist`] - Levels 4 and 5, chain planning and defensive play
//! - [`create_ai`] / [`create_ai_by_name`] - Factories
//! - [`play_turn`] - Runs a whole AI turn against a round
//!
//! ## Quick Start
//!
//! ```rust
//! use mextrain_ai::{create_ai, play_turn};
//! use mextrain_engine::config::MatchConfig;
//! use mextrain_engine::round::RoundEngine;
//!
//! let cfg = MatchConfig::default();
//! let mut round = RoundEngine::new(vec!["bot".into(), "you".into()], 12, &cfg, Some(7)).unwrap();
//! round.start_round().unwrap();
//!
//! let ai = create_ai(3, Some(7));
//! let actions = play_turn(ai.as_ref(), &mut round, "bot").unwrap();
//! assert!(!actions.is_empty());
//! assert_eq!(round.current_player(), "you");
//! ```

use mextrain_engine::errors::GameError;
use mextrain_engine::hand::Hand;
use mextrain_engine::round::RoundEngine;
use mextrain_engine::validator::{valid_moves, ValidMove};
use serde::{Deserialize, Serialize};

pub mod greedy;
pub mod random;
pub mod strategist;

pub const MIN_SKILL_LEVEL: u8 = 1;
pub const MAX_SKILL_LEVEL: u8 = 5;

/// Names of the skill levels, index 0 is level 1.
pub const POLICY_NAMES: [&str; 5] = [
    "sleepy_caboose",
    "freight_hauler",
    "switchman",
    "chain_strategist",
    "locomotive_legend",
];

/// One decision for the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AiAction {
    Play(ValidMove),
    Draw,
    Pass,
}

/// Decision strategy for a computer-controlled seat.
///
/// `moves` is the validator's output for `player` at this instant. [`decide`] never
/// passes an empty slice, but policies answer `Draw` to one rather than panicking.
///
/// # Example Implementation
///
/// ```rust
/// use mextrain_ai::{AIPolicy, AiAction};
/// use mextrain_engine::hand::Hand;
/// use mextrain_engine::round::RoundEngine;
/// use mextrain_engine::validator::ValidMove;
///
/// struct FirstMove;
///
/// impl AIPolicy for FirstMove {
///     fn choose(&self, _: &RoundEngine, _: &str, moves: &[ValidMove], _: &Hand) -> AiAction {
///         moves.first().cloned().map_or(AiAction::Draw, AiAction::Play)
///     }
///     fn name(&self) -> &str {
///         "first_move"
///     }
///     fn skill_level(&self) -> u8 {
///         0
///     }
/// }
/// ```
pub trait AIPolicy: Send + Sync {
    fn choose(&self, round: &RoundEngine, player: &str, moves: &[ValidMove], hand: &Hand)
        -> AiAction;

    fn name(&self) -> &str;

    fn skill_level(&self) -> u8;
}

/// Builds the policy for `level`, clamped into 1..=5. `seed` only affects level 1.
pub fn create_ai(level: u8, seed: Option<u64>) -> Box<dyn AIPolicy> {
    match level.clamp(MIN_SKILL_LEVEL, MAX_SKILL_LEVEL) {
        1 => Box::new(random::SleepyCaboose::new(seed)),
        2 => Box::new(greedy::FreightHauler),
        3 => Box::new(greedy::Switchman),
        4 => Box::new(strategist::ChainStrategist),
        _ => Box::new(strategist::LocomotiveLegend),
    }
}

/// Looks a policy up by its name, returning `None` for unknown names.
///
/// ```rust
/// use mextrain_ai::create_ai_by_name;
///
/// assert_eq!(create_ai_by_name("switchman", None).unwrap().skill_level(), 3);
/// assert!(create_ai_by_name("baseline", None).is_none());
/// ```
pub fn create_ai_by_name(name: &str, seed: Option<u64>) -> Option<Box<dyn AIPolicy>> {
    let level = POLICY_NAMES.iter().position(|n| *n == name)? as u8 + 1;
    Some(create_ai(level, seed))
}

/// Asks `policy` for a decision and checks it against the current legal moves.
///
/// Forced cases never reach the policy: with no legal move the answer is `Draw`, or
/// `Pass` when drawing is not possible. A pick that is not among the legal moves falls
/// back the same way.
pub fn decide(policy: &dyn AIPolicy, round: &RoundEngine, player: &str) -> AiAction {
    let moves = valid_moves(round, player);
    let Some(hand) = round.hand(player) else {
        return AiAction::Pass;
    };
    if moves.is_empty() {
        return fallback(round, player);
    }
    match policy.choose(round, player, &moves, hand) {
        AiAction::Play(mv) if moves.contains(&mv) => AiAction::Play(mv),
        AiAction::Pass if can_pass(round, player) => AiAction::Pass,
        _ => fallback(round, player),
    }
}

fn can_pass(round: &RoundEngine, player: &str) -> bool {
    round.pending_drawn_tile(player).is_some() || round.boneyard_count() == 0
}

fn fallback(round: &RoundEngine, player: &str) -> AiAction {
    if can_pass(round, player) {
        AiAction::Pass
    } else {
        AiAction::Draw
    }
}

/// Applies one decision to the round. A draw from an empty boneyard counts as done,
/// since the engine has already passed the turn.
pub fn apply(round: &mut RoundEngine, player: &str, action: &AiAction) -> Result<(), GameError> {
    match action {
        AiAction::Play(mv) => round.play(player, mv.tile, &mv.train, Some(mv.orientation)),
        AiAction::Draw => match round.draw(player) {
            Ok(_) | Err(GameError::EmptyBoneyard) => Ok(()),
            Err(e) => Err(e),
        },
        AiAction::Pass => round.pass(player),
    }
}

/// Plays `player`'s whole turn: decide, apply, and decide once more if a draw left a
/// playable tile in hand. Returns the actions taken in order.
pub fn play_turn(
    policy: &dyn AIPolicy,
    round: &mut RoundEngine,
    player: &str,
) -> Result<Vec<AiAction>, GameError> {
    let turn = round.turn_number();
    let mut taken = Vec::with_capacity(2);
    while round.turn_number() == turn && !round.is_over() && taken.len() < 2 {
        let action = decide(policy, round, player);
        apply(round, player, &action)?;
        taken.push(action);
    }
    Ok(taken)
}

/// How many tiles in `hand`, other than `except`, carry `value`.
pub(crate) fn holding(hand: &Hand, value: u8, except: mextrain_engine::tile::Tile) -> usize {
    hand.iter().filter(|t| **t != except && t.matches(value)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mextrain_engine::config::DoubleRule;
    use mextrain_engine::tile::Tile;
    use mextrain_engine::train::TrainRef;

    struct Stubborn(AiAction);

    impl AIPolicy for Stubborn {
        fn choose(&self, _: &RoundEngine, _: &str, _: &[ValidMove], _: &Hand) -> AiAction {
            self.0.clone()
        }
        fn name(&self) -> &str {
            "stubborn"
        }
        fn skill_level(&self) -> u8 {
            0
        }
    }

    fn round() -> RoundEngine {
        RoundEngine::from_deal(
            6,
            vec![
                ("bot".into(), vec![Tile::new(6, 2), Tile::new(1, 1)]),
                ("you".into(), vec![Tile::new(3, 4)]),
            ],
            vec![Tile::new(0, 5)],
            DoubleRule::Scoped,
        )
        .unwrap()
    }

    #[test]
    fn illegal_pick_falls_back_to_draw() {
        let r = round();
        let cheat = Stubborn(AiAction::Play(ValidMove {
            tile: Tile::new(1, 1),
            train: TrainRef::Mexican,
            orientation: mextrain_engine::tile::Orientation::Natural,
        }));
        assert_eq!(decide(&cheat, &r, "bot"), AiAction::Draw);
        let pass = Stubborn(AiAction::Pass);
        assert_eq!(decide(&pass, &r, "bot"), AiAction::Draw);
    }

    #[test]
    fn factory_clamps_levels_and_names_match() {
        assert_eq!(create_ai(0, None).skill_level(), 1);
        assert_eq!(create_ai(9, None).skill_level(), 5);
        for (i, name) in POLICY_NAMES.iter().enumerate() {
            let ai = create_ai(i as u8 + 1, Some(1));
            assert_eq!(ai.name(), *name);
        }
    }

    #[test]
    fn play_turn_draws_then_plays_drawn_tile() {
        let mut r = RoundEngine::from_deal(
            6,
            vec![
                ("bot".into(), vec![Tile::new(1, 1)]),
                ("you".into(), vec![Tile::new(3, 4)]),
            ],
            vec![Tile::new(2, 2), Tile::new(6, 5)],
            DoubleRule::Scoped,
        )
        .unwrap();
        let ai = create_ai(2, None);
        let actions = play_turn(ai.as_ref(), &mut r, "bot").unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], AiAction::Draw);
        assert!(matches!(&actions[1], AiAction::Play(mv) if mv.tile == Tile::new(5, 6)));
        assert_eq!(r.current_player(), "you");
    }
}
