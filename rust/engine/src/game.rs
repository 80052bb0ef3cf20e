use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::config::MatchConfig;
use crate::errors::GameError;
use crate::logger::{now_rfc3339, MatchRecord, RoundRecord};
use crate::round::{RoundEndReason, RoundEngine};
use crate::PlayerId;

/// Final standings of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub winner: PlayerId,
    pub cumulative_scores: BTreeMap<PlayerId, u32>,
    pub round_wins: BTreeMap<PlayerId, u32>,
    pub rounds_played: u32,
}

/// What `advance` did after a finished round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchProgress {
    NextRound { game_number: u32, engine_value: u8 },
    Ended(MatchResult),
}

/// Sequences rounds with a descending engine value and keeps the running score.
///
/// Seats never leave a match once it starts, so turn order and train layout stay stable
/// when someone drops out; their turns are played with [`RoundEngine::auto_turn`].
#[derive(Debug, Clone)]
pub struct MatchOrchestrator {
    players: Vec<PlayerId>,
    config: MatchConfig,
    current_game_number: u32,
    cumulative_scores: BTreeMap<PlayerId, u32>,
    round_wins: BTreeMap<PlayerId, u32>,
    rounds: Vec<RoundRecord>,
    round: Option<RoundEngine>,
    result: Option<MatchResult>,
}

impl MatchOrchestrator {
    pub fn new(players: Vec<PlayerId>, config: MatchConfig) -> Result<Self, GameError> {
        config.validate()?;
        if players.len() > config.max_players {
            return Err(GameError::InvalidConfig(format!(
                "{} players exceed max_players {}",
                players.len(),
                config.max_players
            )));
        }
        let zeroes: BTreeMap<PlayerId, u32> = players.iter().map(|p| (p.clone(), 0)).collect();
        Ok(Self {
            players,
            config,
            current_game_number: 0,
            cumulative_scores: zeroes.clone(),
            round_wins: zeroes,
            rounds: Vec::new(),
            round: None,
            result: None,
        })
    }

    /// Deals the first round.
    pub fn start(&mut self) -> Result<&RoundEngine, GameError> {
        if self.result.is_some() {
            return Err(GameError::MatchAlreadyEnded);
        }
        if self.round.is_some() {
            return Err(GameError::RoundInProgress);
        }
        self.start_game(1)
    }

    fn start_game(&mut self, game_number: u32) -> Result<&RoundEngine, GameError> {
        let engine_value = self.config.engine_value_for(game_number);
        let seed = self
            .config
            .seed
            .map(|s| s.wrapping_add(game_number as u64));
        let mut round = RoundEngine::new(self.players.clone(), engine_value, &self.config, seed)?;
        round.start_round()?;
        self.current_game_number = game_number;
        Ok(self.round.insert(round))
    }

    /// Folds a finished round into the match and deals the next one, or ends the match
    /// once `games_to_play` rounds are done.
    pub fn advance(&mut self) -> Result<MatchProgress, GameError> {
        if self.result.is_some() {
            return Err(GameError::MatchAlreadyEnded);
        }
        let round = self.round.as_ref().ok_or(GameError::RoundNotStarted)?;
        let outcome = round.outcome().ok_or(GameError::RoundInProgress)?.clone();

        for (player, points) in &outcome.scores {
            *self.cumulative_scores.entry(player.clone()).or_insert(0) += points;
        }
        if let (Some(winner), RoundEndReason::Domino) = (&outcome.winner, outcome.reason) {
            *self.round_wins.entry(winner.clone()).or_insert(0) += 1;
        }
        self.rounds.push(RoundRecord {
            game_number: self.current_game_number,
            engine_value: round.engine_value(),
            winner: outcome.winner.clone(),
            reason: outcome.reason,
            scores: outcome.scores.clone(),
            actions: round.actions().to_vec(),
        });

        let next = self.current_game_number + 1;
        if next > self.config.games_to_play {
            self.current_game_number = next;
            let result = MatchResult {
                winner: pick_winner(&self.cumulative_scores, &self.round_wins)
                    .ok_or_else(|| GameError::InvalidConfig("match has no players".to_string()))?,
                cumulative_scores: self.cumulative_scores.clone(),
                round_wins: self.round_wins.clone(),
                rounds_played: self.rounds.len() as u32,
            };
            self.result = Some(result.clone());
            return Ok(MatchProgress::Ended(result));
        }
        let engine_value = self.start_game(next)?.engine_value();
        Ok(MatchProgress::NextRound {
            game_number: next,
            engine_value,
        })
    }

    pub fn round(&self) -> Result<&RoundEngine, GameError> {
        self.round.as_ref().ok_or(GameError::RoundNotStarted)
    }

    /// Mutable access for play/draw/pass. Fails once the match has ended.
    pub fn round_mut(&mut self) -> Result<&mut RoundEngine, GameError> {
        if self.result.is_some() {
            return Err(GameError::MatchAlreadyEnded);
        }
        self.round.as_mut().ok_or(GameError::RoundNotStarted)
    }

    pub fn is_started(&self) -> bool {
        self.round.is_some()
    }

    pub fn is_over(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn current_game_number(&self) -> u32 {
        self.current_game_number
    }

    pub fn games_to_play(&self) -> u32 {
        self.config.games_to_play
    }

    pub fn cumulative_scores(&self) -> &BTreeMap<PlayerId, u32> {
        &self.cumulative_scores
    }

    pub fn round_wins(&self) -> &BTreeMap<PlayerId, u32> {
        &self.round_wins
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    /// Record of a finished match, `None` while it is still running.
    pub fn to_record(&self, match_id: impl Into<String>) -> Option<MatchRecord> {
        let result = self.result.as_ref()?;
        Some(MatchRecord {
            match_id: match_id.into(),
            players: self.players.clone(),
            config: self.config.clone(),
            rounds: self.rounds.clone(),
            cumulative_scores: result.cumulative_scores.clone(),
            round_wins: result.round_wins.clone(),
            winner: result.winner.clone(),
            ts: Some(now_rfc3339()),
            meta: None,
        })
    }
}

/// Lowest cumulative score wins; ties go to more round wins, then the smaller id.
pub fn pick_winner(
    scores: &BTreeMap<PlayerId, u32>,
    round_wins: &BTreeMap<PlayerId, u32>,
) -> Option<PlayerId> {
    scores
        .iter()
        .min_by_key(|(player, score)| {
            let wins = round_wins.get(*player).copied().unwrap_or(0);
            (**score, Reverse(wins), (*player).clone())
        })
        .map(|(player, _)| player.clone())
}
