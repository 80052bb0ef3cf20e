use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::GameError;
use crate::tile::{Orientation, Tile};
use crate::PlayerId;

/// Names a train within a round.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "owner", rename_all = "snake_case")]
pub enum TrainRef {
    /// A player's own train
    Personal(PlayerId),
    /// The communal train, open to everyone
    Mexican,
}

impl fmt::Display for TrainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainRef::Personal(owner) => write!(f, "{owner}'s train"),
            TrainRef::Mexican => write!(f, "Mexican train"),
        }
    }
}

/// A chain of tiles growing out of the engine double.
///
/// Tiles are stored oriented: `dominoes[0].left == engine_value` and each tile's `left`
/// equals the previous tile's `right`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Train {
    owner: Option<PlayerId>,
    engine_value: u8,
    dominoes: Vec<Tile>,
    is_open: bool,
    needs_double_satisfaction: bool,
}

impl Train {
    pub fn new_personal(owner: impl Into<PlayerId>, engine_value: u8) -> Self {
        Self {
            owner: Some(owner.into()),
            engine_value,
            dominoes: Vec::new(),
            is_open: false,
            needs_double_satisfaction: false,
        }
    }

    pub fn new_mexican(engine_value: u8) -> Self {
        Self {
            owner: None,
            engine_value,
            dominoes: Vec::new(),
            is_open: true,
            needs_double_satisfaction: false,
        }
    }

    pub fn reference(&self) -> TrainRef {
        match &self.owner {
            Some(owner) => TrainRef::Personal(owner.clone()),
            None => TrainRef::Mexican,
        }
    }

    pub fn owner(&self) -> Option<&PlayerId> {
        self.owner.as_ref()
    }

    pub fn is_mexican(&self) -> bool {
        self.owner.is_none()
    }

    pub fn is_owned_by(&self, player: &str) -> bool {
        self.owner.as_deref() == Some(player)
    }

    pub fn engine_value(&self) -> u8 {
        self.engine_value
    }

    pub fn dominoes(&self) -> &[Tile] {
        &self.dominoes
    }

    pub fn len(&self) -> usize {
        self.dominoes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dominoes.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn needs_double_satisfaction(&self) -> bool {
        self.needs_double_satisfaction
    }

    /// Pip value the next tile must match.
    pub fn required_value(&self) -> u8 {
        self.dominoes
            .last()
            .map(|t| t.right)
            .unwrap_or(self.engine_value)
    }

    /// Value of the unsatisfied double at the end of this train, if any.
    pub fn pending_double(&self) -> Option<u8> {
        self.needs_double_satisfaction
            .then(|| self.required_value())
    }

    pub fn is_playable_by(&self, as_owner: bool) -> bool {
        as_owner || self.is_open || self.is_mexican()
    }

    pub fn can_accept(&self, tile: Tile, as_owner: bool) -> bool {
        if !self.is_playable_by(as_owner) {
            return false;
        }
        let required = self.required_value();
        if !tile.matches(required) {
            return false;
        }
        match self.pending_double() {
            Some(double_value) => tile.matches(double_value),
            None => true,
        }
    }

    /// Appends `tile`. With no orientation given the tile is turned so its matching end
    /// leads. Only pip matching is checked here; who may play is the validator's call.
    pub fn place(&mut self, tile: Tile, orientation: Option<Orientation>) -> Result<(), GameError> {
        let required = self.required_value();
        let orientation = match orientation {
            Some(o) => o,
            None => tile
                .orientation_for(required)
                .ok_or(GameError::IllegalPlacement { tile })?,
        };
        let laid = tile.oriented(orientation);
        if laid.left != required {
            return Err(GameError::IllegalPlacement { tile });
        }
        self.needs_double_satisfaction = laid.is_double();
        self.dominoes.push(laid);
        Ok(())
    }

    pub fn mark_open(&mut self) {
        self.is_open = true;
    }

    /// Owner played on it again. The Mexican train never closes.
    pub fn close(&mut self) {
        if !self.is_mexican() {
            self.is_open = false;
        }
    }
}
