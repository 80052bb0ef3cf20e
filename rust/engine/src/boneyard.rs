use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::errors::GameError;
use crate::tile::{full_set, Tile};

/// The undealt pool. Tiles are shuffled once when the pool is built and drawn from the top.
#[derive(Debug, Clone)]
pub struct Boneyard {
    tiles: Vec<Tile>,
}

impl Boneyard {
    /// Full double-`max_pip` set, shuffled with a seeded ChaCha20 stream.
    pub fn new_with_seed(max_pip: u8, seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        Self::shuffled(full_set(max_pip), &mut rng)
    }

    pub fn new_random(max_pip: u8) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(rand::random());
        Self::shuffled(full_set(max_pip), &mut rng)
    }

    fn shuffled(mut tiles: Vec<Tile>, rng: &mut ChaCha20Rng) -> Self {
        tiles.shuffle(rng);
        Self { tiles }
    }

    /// Pool with a fixed draw order: the last tile of `tiles` is drawn first.
    pub fn from_tiles(tiles: Vec<Tile>) -> Self {
        Self { tiles }
    }

    pub fn draw(&mut self) -> Result<Tile, GameError> {
        self.tiles.pop().ok_or(GameError::EmptyBoneyard)
    }

    /// Removes a specific tile (used to pull the engine double before dealing).
    pub fn take(&mut self, tile: Tile) -> Option<Tile> {
        let idx = self.tiles.iter().position(|t| *t == tile)?;
        Some(self.tiles.swap_remove(idx))
    }

    pub fn remaining_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }
}
