use serde::{Deserialize, Serialize};

use crate::errors::GameError;
use crate::tile::{total_tiles, DEFAULT_MAX_PIP};

pub const MIN_SEATS: usize = 1;
pub const MAX_SEATS: usize = 8;
pub const MAX_GAMES: u32 = 100;

/// How far a pending double restricts the active player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoubleRule {
    /// A pending double on the player's own train or the Mexican train blocks every other
    /// option. Doubles on other open trains only restrict that train.
    #[default]
    Scoped,
    /// Any pending double on a train the player may target blocks every other option.
    Global,
}

/// Settings fixed at match creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub min_players: usize,
    pub max_players: usize,
    pub ai_enabled: bool,
    pub ai_skill_level: u8,
    pub ai_fill_to_max: bool,
    pub games_to_play: u32,
    pub starting_engine_value: u8,
    pub max_pip: u8,
    pub hand_size: Option<usize>,
    pub double_rule: DoubleRule,
    pub seed: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 4,
            ai_enabled: true,
            ai_skill_level: 2,
            ai_fill_to_max: false,
            games_to_play: DEFAULT_MAX_PIP as u32 + 1,
            starting_engine_value: DEFAULT_MAX_PIP,
            max_pip: DEFAULT_MAX_PIP,
            hand_size: None,
            double_rule: DoubleRule::Scoped,
            seed: None,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), GameError> {
        if !(MIN_SEATS..=MAX_SEATS).contains(&self.min_players) {
            return Err(GameError::InvalidConfig(format!(
                "min_players must be between {MIN_SEATS} and {MAX_SEATS}"
            )));
        }
        if !(MIN_SEATS..=MAX_SEATS).contains(&self.max_players) {
            return Err(GameError::InvalidConfig(format!(
                "max_players must be between {MIN_SEATS} and {MAX_SEATS}"
            )));
        }
        if self.min_players > self.max_players {
            return Err(GameError::InvalidConfig(
                "min_players cannot exceed max_players".to_string(),
            ));
        }
        if !(1..=5).contains(&self.ai_skill_level) {
            return Err(GameError::InvalidConfig(
                "ai_skill_level must be between 1 and 5".to_string(),
            ));
        }
        if !(1..=MAX_GAMES).contains(&self.games_to_play) {
            return Err(GameError::InvalidConfig(format!(
                "games_to_play must be between 1 and {MAX_GAMES}"
            )));
        }
        if self.max_pip == 0 {
            return Err(GameError::InvalidConfig(
                "max_pip must be at least 1".to_string(),
            ));
        }
        if self.starting_engine_value > self.max_pip {
            return Err(GameError::InvalidConfig(format!(
                "starting_engine_value {} exceeds max_pip {}",
                self.starting_engine_value, self.max_pip
            )));
        }
        if self.hand_size == Some(0) {
            return Err(GameError::InvalidConfig(
                "hand_size must be positive".to_string(),
            ));
        }
        // Largest table must still be dealable; the engine double is off the table.
        let per_seat = self.hand_size_for(self.max_players);
        let available = total_tiles(self.max_pip) - 1;
        let needed = per_seat.max(1) * self.max_players;
        if per_seat == 0 || needed > available {
            return Err(GameError::InsufficientTiles { needed, available });
        }
        Ok(())
    }

    /// Tiles dealt to each seat for a table of `players`.
    ///
    /// Without an explicit `hand_size` the table-size default is cut down to what the set
    /// can deal, so a double-9 or double-6 table gets smaller hands instead of failing.
    pub fn hand_size_for(&self, players: usize) -> usize {
        self.hand_size.unwrap_or_else(|| {
            let dealable = (total_tiles(self.max_pip) - 1) / players.max(1);
            default_hand_size(players).min(dealable)
        })
    }

    /// Engine value of the 1-based round `game_number`, counting down and wrapping from 0
    /// back to `max_pip`.
    pub fn engine_value_for(&self, game_number: u32) -> u8 {
        let span = self.max_pip as u32 + 1;
        let offset = (game_number.saturating_sub(1)) % span;
        let start = self.starting_engine_value as u32;
        ((start + span - offset) % span) as u8
    }
}

pub fn default_hand_size(players: usize) -> usize {
    match players {
        0..=2 => 16,
        3..=4 => 15,
        5..=6 => 12,
        _ => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MatchConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cfg = MatchConfig {
            games_to_play: 0,
            ..MatchConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(GameError::InvalidConfig(_))));

        let cfg = MatchConfig {
            ai_skill_level: 6,
            ..MatchConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(GameError::InvalidConfig(_))));

        let cfg = MatchConfig {
            min_players: 5,
            max_players: 3,
            ..MatchConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(GameError::InvalidConfig(_))));
    }

    #[test]
    fn explicit_hand_size_must_fit_the_set() {
        let cfg = MatchConfig {
            max_pip: 6,
            starting_engine_value: 6,
            max_players: 4,
            hand_size: Some(10),
            ..MatchConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(GameError::InsufficientTiles { needed: 40, available: 27 })
        ));
    }

    #[test]
    fn default_hands_shrink_to_fit_smaller_sets() {
        let double_nine = MatchConfig {
            max_pip: 9,
            starting_engine_value: 9,
            games_to_play: 10,
            ..MatchConfig::default()
        };
        assert!(double_nine.validate().is_ok());
        assert_eq!(double_nine.hand_size_for(2), 16);
        assert_eq!(double_nine.hand_size_for(4), 13);
        assert_eq!(double_nine.hand_size_for(8), 6);

        let double_six = MatchConfig {
            max_pip: 6,
            starting_engine_value: 6,
            ..MatchConfig::default()
        };
        assert!(double_six.validate().is_ok());
        assert_eq!(double_six.hand_size_for(4), 6);

        let double_one = MatchConfig {
            max_pip: 1,
            starting_engine_value: 1,
            max_players: 8,
            ..MatchConfig::default()
        };
        assert!(matches!(
            double_one.validate(),
            Err(GameError::InsufficientTiles { available: 2, .. })
        ));
    }

    #[test]
    fn hand_size_follows_table_size() {
        let cfg = MatchConfig::default();
        assert_eq!(cfg.hand_size_for(2), 16);
        assert_eq!(cfg.hand_size_for(4), 15);
        assert_eq!(cfg.hand_size_for(6), 12);
        assert_eq!(cfg.hand_size_for(8), 10);
        let fixed = MatchConfig {
            hand_size: Some(7),
            ..cfg
        };
        assert_eq!(fixed.hand_size_for(8), 7);
    }

    #[test]
    fn engine_values_count_down_and_wrap() {
        let cfg = MatchConfig {
            starting_engine_value: 1,
            max_pip: 3,
            ..MatchConfig::default()
        };
        let values: Vec<u8> = (1..=5).map(|g| cfg.engine_value_for(g)).collect();
        assert_eq!(values, vec![1, 0, 3, 2, 1]);
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: MatchConfig =
            serde_json::from_str(r#"{"games_to_play":3,"double_rule":"global"}"#).unwrap();
        assert_eq!(cfg.games_to_play, 3);
        assert_eq!(cfg.double_rule, DoubleRule::Global);
        assert_eq!(cfg.max_pip, 12);
    }
}
