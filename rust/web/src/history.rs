use mextrain_engine::logger::MatchRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

const DEFAULT_RECENT_LIMIT: usize = 100;

/// Finished matches, newest last.
#[derive(Debug, Default)]
pub struct HistoryStore {
    matches: RwLock<Vec<MatchRecord>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_match(&self, record: MatchRecord) -> Result<(), HistoryError> {
        let mut matches = self
            .matches
            .write()
            .map_err(|_| HistoryError::StoragePoisoned)?;
        tracing::info!(
            match_id = %record.match_id,
            winner = %record.winner,
            rounds = record.rounds.len(),
            "match recorded"
        );
        matches.push(record);
        Ok(())
    }

    /// Most recent matches first.
    pub fn recent(&self, limit: Option<usize>) -> Result<Vec<MatchRecord>, HistoryError> {
        let matches = self
            .matches
            .read()
            .map_err(|_| HistoryError::StoragePoisoned)?;
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT);
        Ok(matches.iter().rev().take(limit).cloned().collect())
    }

    pub fn get(&self, match_id: &str) -> Result<MatchRecord, HistoryError> {
        let matches = self
            .matches
            .read()
            .map_err(|_| HistoryError::StoragePoisoned)?;
        matches
            .iter()
            .find(|m| m.match_id == match_id)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(match_id.to_string()))
    }

    /// Matches `player` took part in, most recent first.
    pub fn by_player(&self, player: &str) -> Result<Vec<MatchRecord>, HistoryError> {
        let matches = self
            .matches
            .read()
            .map_err(|_| HistoryError::StoragePoisoned)?;
        Ok(matches
            .iter()
            .rev()
            .filter(|m| m.players.iter().any(|p| p == player))
            .cloned()
            .collect())
    }

    pub fn stats(&self) -> Result<HistoryStats, HistoryError> {
        let matches = self
            .matches
            .read()
            .map_err(|_| HistoryError::StoragePoisoned)?;

        let mut stats = HistoryStats {
            total_matches: matches.len(),
            ..HistoryStats::default()
        };
        for record in matches.iter() {
            stats.total_rounds += record.rounds.len();
            for player in &record.players {
                let entry = stats.players.entry(player.clone()).or_default();
                entry.matches += 1;
                entry.total_score += u64::from(
                    record.cumulative_scores.get(player).copied().unwrap_or(0),
                );
                entry.round_wins += record.round_wins.get(player).copied().unwrap_or(0);
            }
            if let Some(entry) = stats.players.get_mut(&record.winner) {
                entry.wins += 1;
            }
        }
        for entry in stats.players.values_mut() {
            if entry.matches > 0 {
                entry.win_rate = entry.wins as f64 / entry.matches as f64 * 100.0;
                entry.avg_score = entry.total_score as f64 / entry.matches as f64;
            }
        }
        Ok(stats)
    }

    pub fn total_matches(&self) -> Result<usize, HistoryError> {
        let matches = self
            .matches
            .read()
            .map_err(|_| HistoryError::StoragePoisoned)?;
        Ok(matches.len())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryStats {
    pub total_matches: usize,
    pub total_rounds: usize,
    pub players: BTreeMap<String, PlayerStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerStats {
    pub matches: usize,
    pub wins: usize,
    pub round_wins: u32,
    pub total_score: u64,
    pub win_rate: f64,
    pub avg_score: f64,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History storage poisoned")]
    StoragePoisoned,
    #[error("Match not found: {0}")]
    NotFound(String),
}

impl crate::errors::IntoErrorResponse for HistoryError {
    fn status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            HistoryError::StoragePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
            HistoryError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            HistoryError::StoragePoisoned => "history_storage_error",
            HistoryError::NotFound(_) => "match_not_found",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn severity(&self) -> crate::errors::ErrorSeverity {
        use crate::errors::ErrorSeverity;
        match self {
            HistoryError::StoragePoisoned => ErrorSeverity::Critical,
            HistoryError::NotFound(_) => ErrorSeverity::Client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mextrain_engine::config::MatchConfig;

    fn record(id: &str, players: &[&str], scores: &[u32], winner: &str) -> MatchRecord {
        let players: Vec<String> = players.iter().map(|p| p.to_string()).collect();
        let cumulative_scores = players.iter().cloned().zip(scores.iter().copied()).collect();
        let mut round_wins = BTreeMap::new();
        round_wins.insert(winner.to_string(), 1);
        MatchRecord {
            match_id: id.to_string(),
            players,
            config: MatchConfig::default(),
            rounds: Vec::new(),
            cumulative_scores,
            round_wins,
            winner: winner.to_string(),
            ts: None,
            meta: None,
        }
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let store = HistoryStore::new();
        for i in 0..5 {
            store
                .add_match(record(&format!("m{i}"), &["a", "b"], &[0, 9], "a"))
                .expect("add");
        }
        let recent = store.recent(Some(2)).expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].match_id, "m4");
        assert_eq!(recent[1].match_id, "m3");
        assert_eq!(store.total_matches().expect("count"), 5);
    }

    #[test]
    fn lookup_by_id_and_player() {
        let store = HistoryStore::new();
        store.add_match(record("one", &["a", "b"], &[3, 8], "a")).expect("add");
        store.add_match(record("two", &["b", "c"], &[5, 2], "c")).expect("add");

        assert_eq!(store.get("two").expect("get").winner, "c");
        assert!(matches!(store.get("three"), Err(HistoryError::NotFound(_))));

        let for_b: Vec<String> = store
            .by_player("b")
            .expect("by player")
            .into_iter()
            .map(|m| m.match_id)
            .collect();
        assert_eq!(for_b, vec!["two".to_string(), "one".to_string()]);
        assert!(store.by_player("zed").expect("by player").is_empty());
    }

    #[test]
    fn stats_count_wins_and_average_scores() {
        let store = HistoryStore::new();
        assert_eq!(store.stats().expect("stats"), HistoryStats::default());

        store.add_match(record("one", &["a", "b"], &[10, 20], "a")).expect("add");
        store.add_match(record("two", &["a", "b"], &[30, 0], "b")).expect("add");
        store.add_match(record("three", &["a", "b"], &[2, 4], "a")).expect("add");

        let stats = store.stats().expect("stats");
        assert_eq!(stats.total_matches, 3);
        let a = &stats.players["a"];
        assert_eq!(a.matches, 3);
        assert_eq!(a.wins, 2);
        assert_eq!(a.round_wins, 2);
        assert_eq!(a.total_score, 42);
        assert_eq!(a.avg_score, 14.0);
        let b = &stats.players["b"];
        assert_eq!(b.wins, 1);
        assert!((b.win_rate - 100.0 / 3.0).abs() < 1e-9);
    }
}
