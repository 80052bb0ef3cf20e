use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Highest pip value of the standard double-twelve set.
pub const DEFAULT_MAX_PIP: u8 = 12;

/// A single domino.
///
/// Tiles are unordered pairs: `(3, 5)` and `(5, 3)` are the same tile, so equality,
/// hashing and ordering all go through [`Tile::key`]. The `left`/`right` fields keep the
/// orientation a tile was laid in, which matters once it sits on a train.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Tile {
    /// Pip value on the leading end
    pub left: u8,
    /// Pip value on the trailing end
    pub right: u8,
}

/// How a tile is laid onto a train relative to its stored `left`/`right` ends.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// `left` touches the train end, `right` becomes the new open end
    Natural,
    /// `right` touches the train end, `left` becomes the new open end
    Flipped,
}

impl Tile {
    pub const fn new(left: u8, right: u8) -> Self {
        Self { left, right }
    }

    pub const fn double(value: u8) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Canonical `(low, high)` identity of the tile.
    pub fn key(&self) -> (u8, u8) {
        if self.left <= self.right {
            (self.left, self.right)
        } else {
            (self.right, self.left)
        }
    }

    pub fn is_double(&self) -> bool {
        self.left == self.right
    }

    pub fn pip_sum(&self) -> u32 {
        self.left as u32 + self.right as u32
    }

    pub fn matches(&self, value: u8) -> bool {
        self.left == value || self.right == value
    }

    /// The end left open after matching `value`, or `None` if the tile has no such end.
    pub fn other_end(&self, value: u8) -> Option<u8> {
        if self.left == value {
            Some(self.right)
        } else if self.right == value {
            Some(self.left)
        } else {
            None
        }
    }

    pub fn flipped(&self) -> Tile {
        Tile {
            left: self.right,
            right: self.left,
        }
    }

    /// Orientation that puts `value` on the leading end, preferring `Natural` for doubles.
    pub fn orientation_for(&self, value: u8) -> Option<Orientation> {
        if self.left == value {
            Some(Orientation::Natural)
        } else if self.right == value {
            Some(Orientation::Flipped)
        } else {
            None
        }
    }

    pub fn oriented(&self, orientation: Orientation) -> Tile {
        match orientation {
            Orientation::Natural => *self,
            Orientation::Flipped => self.flipped(),
        }
    }

    pub fn fits_set(&self, max_pip: u8) -> bool {
        self.left <= max_pip && self.right <= max_pip
    }
}

impl PartialEq for Tile {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Tile {}

impl Hash for Tile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Tile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}|{}]", self.left, self.right)
    }
}

impl FromStr for Tile {
    type Err = String;

    /// Accepts `3-5`, `3|5`, `[3|5]` and `3,5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '[' | ']' | ' '))
            .map(|c| if matches!(c, '|' | ',') { '-' } else { c })
            .collect();
        let (a, b) = cleaned
            .split_once('-')
            .ok_or_else(|| format!("bad tile: {s}"))?;
        let left = a.parse::<u8>().map_err(|_| format!("bad tile: {s}"))?;
        let right = b.parse::<u8>().map_err(|_| format!("bad tile: {s}"))?;
        Ok(Tile::new(left, right))
    }
}

/// Number of tiles in a double-`max_pip` set.
pub fn total_tiles(max_pip: u8) -> usize {
    let n = max_pip as usize + 1;
    n * (n + 1) / 2
}

pub fn full_set(max_pip: u8) -> Vec<Tile> {
    let mut v = Vec::with_capacity(total_tiles(max_pip));
    for low in 0..=max_pip {
        for high in low..=max_pip {
            v.push(Tile::new(low, high));
        }
    }
    v
}

pub fn pip_total<'a, I>(tiles: I) -> u32
where
    I: IntoIterator<Item = &'a Tile>,
{
    tiles.into_iter().map(Tile::pip_sum).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tiles_compare_as_unordered_pairs() {
        assert_eq!(Tile::new(3, 5), Tile::new(5, 3));
        let mut set = HashSet::new();
        set.insert(Tile::new(3, 5));
        assert!(!set.insert(Tile::new(5, 3)));
    }

    #[test]
    fn double_twelve_set_has_91_unique_tiles() {
        let set = full_set(12);
        assert_eq!(set.len(), 91);
        assert_eq!(total_tiles(12), 91);
        let unique: HashSet<_> = set.iter().copied().collect();
        assert_eq!(unique.len(), 91);
        assert_eq!(set.iter().filter(|t| t.is_double()).count(), 13);
    }

    #[test]
    fn orientation_puts_matching_value_first() {
        let t = Tile::new(3, 5);
        assert_eq!(t.orientation_for(3), Some(Orientation::Natural));
        assert_eq!(t.orientation_for(5), Some(Orientation::Flipped));
        assert_eq!(t.orientation_for(4), None);
        assert_eq!(t.oriented(Orientation::Flipped).left, 5);
        assert_eq!(t.other_end(5), Some(3));
    }

    #[test]
    fn parses_common_notations() {
        assert_eq!("3-5".parse::<Tile>().unwrap(), Tile::new(3, 5));
        assert_eq!("[12|0]".parse::<Tile>().unwrap(), Tile::new(0, 12));
        assert!("35".parse::<Tile>().is_err());
    }
}
