use serde::{Deserialize, Serialize};

use crate::errors::GameError;
use crate::tile::{pip_total, Tile};

/// Tiles held by one player. Only deal, draw and play mutate it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    tiles: Vec<Tile>,
}

impl Hand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a hand from explicit tiles, rejecting duplicates.
    pub fn from_tiles(tiles: Vec<Tile>) -> Result<Self, GameError> {
        let mut hand = Hand::new();
        for t in tiles {
            hand.add(t)?;
        }
        Ok(hand)
    }

    pub fn add(&mut self, tile: Tile) -> Result<(), GameError> {
        if self.contains(tile) {
            return Err(GameError::DuplicateTile(tile));
        }
        self.tiles.push(tile);
        Ok(())
    }

    pub fn remove(&mut self, tile: Tile) -> Result<Tile, GameError> {
        let idx = self
            .tiles
            .iter()
            .position(|t| *t == tile)
            .ok_or(GameError::InvalidTile(tile))?;
        Ok(self.tiles.remove(idx))
    }

    pub fn contains(&self, tile: Tile) -> bool {
        self.tiles.contains(&tile)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Penalty points this hand is worth at round end.
    pub fn pip_total(&self) -> u32 {
        pip_total(&self.tiles)
    }

    /// How many tiles carry `value` on either end (a double counts once).
    pub fn count_value(&self, value: u8) -> usize {
        self.tiles.iter().filter(|t| t.matches(value)).count()
    }
}
