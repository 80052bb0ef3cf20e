use crate::tile::Tile;
use crate::PlayerId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("It's not {actual}'s turn (waiting on {expected})")]
    NotYourTurn { expected: PlayerId, actual: PlayerId },
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Tile {tile} cannot be placed on this train")]
    IllegalPlacement { tile: Tile },
    #[error("Boneyard is empty")]
    EmptyBoneyard,
    #[error("Tile {0} is not in hand")]
    InvalidTile(Tile),
    #[error("Tile {0} is already in hand")]
    DuplicateTile(Tile),
    #[error("Round has not started")]
    RoundNotStarted,
    #[error("Round is already over")]
    RoundOver,
    #[error("Round is still in progress")]
    RoundInProgress,
    #[error("Match has already ended")]
    MatchAlreadyEnded,
    #[error("Player {0} is not in this session")]
    PlayerNotInSession(PlayerId),
    #[error("Not enough tiles to deal: need {needed}, have {available}")]
    InsufficientTiles { needed: usize, available: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GameError {
    /// Machine-readable code used by transports.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::NotYourTurn { .. } => "not_your_turn",
            GameError::IllegalMove(_) => "illegal_move",
            GameError::IllegalPlacement { .. } => "illegal_placement",
            GameError::EmptyBoneyard => "empty_boneyard",
            GameError::InvalidTile(_) => "invalid_tile",
            GameError::DuplicateTile(_) => "duplicate_tile",
            GameError::RoundNotStarted => "round_not_started",
            GameError::RoundOver => "round_over",
            GameError::RoundInProgress => "round_in_progress",
            GameError::MatchAlreadyEnded => "match_already_ended",
            GameError::PlayerNotInSession(_) => "player_not_in_session",
            GameError::InsufficientTiles { .. } => "insufficient_tiles",
            GameError::InvalidConfig(_) => "invalid_config",
        }
    }
}
