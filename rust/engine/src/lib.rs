//! # mextrain-engine: Mexican Train Game Engine Core
//!
//! The authoritative rules and state machine for Mexican Train dominoes. Decides whose
//! turn it is, which placements are legal, how trains and the boneyard evolve, and how
//! rounds chain into a scored match. Transport, AI and persistence live in other crates.
//!
//! ## Core Modules
//!
//! - [`tile`] - Domino value object and full-set construction
//! - [`boneyard`] - Shuffled draw pool with seeded ChaCha20 RNG
//! - [`hand`] - Per-player tile set
//! - [`train`] - Personal and Mexican trains, open state, pending doubles
//! - [`validator`] - Legal-move enumeration
//! - [`round`] - Round state machine: deal, play, draw, pass, scoring
//! - [`game`] - Match orchestration across rounds and winner selection
//! - [`config`] - Match configuration and validation
//! - [`logger`] - Action/round/match records and JSONL output
//! - [`errors`] - Error types for game operations
//!
//! ## Quick Start
//!
//! ```rust
//! use mextrain_engine::config::MatchConfig;
//! use mextrain_engine::game::MatchOrchestrator;
//! use mextrain_engine::validator::valid_moves;
//!
//! let config = MatchConfig { seed: Some(42), games_to_play: 1, ..MatchConfig::default() };
//! let mut game = MatchOrchestrator::new(vec!["ana".into(), "ben".into()], config).unwrap();
//! let round = game.start().unwrap();
//!
//! assert_eq!(round.engine_value(), 12);
//! let moves = valid_moves(round, "ana");
//! // every opening move matches the engine double
//! assert!(moves.iter().all(|m| m.tile.matches(12)));
//! ```
//!
//! ## Playing a Turn
//!
//! ```rust
//! use mextrain_engine::config::DoubleRule;
//! use mextrain_engine::round::RoundEngine;
//! use mextrain_engine::tile::Tile;
//! use mextrain_engine::train::TrainRef;
//!
//! let mut round = RoundEngine::from_deal(
//!     9,
//!     vec![
//!         ("ana".into(), vec![Tile::new(9, 4), Tile::new(2, 2)]),
//!         ("ben".into(), vec![Tile::new(1, 3)]),
//!     ],
//!     vec![Tile::new(0, 5)],
//!     DoubleRule::Scoped,
//! )
//! .unwrap();
//!
//! round.play("ana", Tile::new(4, 9), &TrainRef::Personal("ana".into()), None).unwrap();
//! assert_eq!(round.current_player(), "ben");
//! ```

pub mod boneyard;
pub mod config;
pub mod errors;
pub mod game;
pub mod hand;
pub mod logger;
pub mod round;
pub mod tile;
pub mod train;
pub mod validator;

/// Players are identified by an opaque string chosen by the session layer.
pub type PlayerId = String;
