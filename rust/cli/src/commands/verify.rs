//! Verify command handler module.
//!
//! Re-checks JSONL match records (plain or `.zst`) written by `sim` or the web server:
//!
//! - Rounds are numbered 1..n, one per configured game, with the expected engine double
//! - A round won by domino has a winner who scored 0; a blocked round has no winner
//! - Cumulative scores equal the sum of the round scores
//! - Round wins match the rounds each player won by domino
//! - The match winner follows the tie-break (lowest score, most round wins, smallest id)
//! - Match ids are unique within the file
//!
//! Every problem is reported with its line number before the command fails.

use crate::error::{BatchValidationError, CliError};
use crate::io_utils::read_text_auto;
use crate::ui;
use mextrain_engine::game::pick_winner;
use mextrain_engine::logger::MatchRecord;
use mextrain_engine::round::RoundEndReason;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;

/// The `usize` context is the 1-based line number.
type VerifyError = BatchValidationError<usize>;

pub fn handle_verify_command(
    input: String,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), CliError> {
    let content = match read_text_auto(&input) {
        Ok(c) => c,
        Err(e) => {
            ui::write_error(err, &format!("Failed to read {}: {}", input, e))?;
            return Err(CliError::Io(std::io::Error::other(e)));
        }
    };

    let mut errors: Vec<VerifyError> = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut matches = 0usize;

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        matches += 1;
        let record: MatchRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                errors.push(VerifyError {
                    item_context: line_no,
                    message: format!("Invalid match record: {}", e),
                });
                continue;
            }
        };
        if !seen_ids.insert(record.match_id.clone()) {
            errors.push(VerifyError {
                item_context: line_no,
                message: format!("Duplicate match_id {}", record.match_id),
            });
        }
        errors.extend(check_record(&record).into_iter().map(|message| VerifyError {
            item_context: line_no,
            message,
        }));
    }

    if matches == 0 {
        ui::write_error(err, &format!("No match records in {}", input))?;
        return Err(CliError::InvalidInput(format!("no match records in {}", input)));
    }

    if errors.is_empty() {
        writeln!(out, "Verify: OK ({} matches)", matches)?;
        return Ok(());
    }
    for e in &errors {
        writeln!(err, "Line {}", e)?;
    }
    writeln!(
        out,
        "Verify: FAIL ({} errors in {} matches)",
        errors.len(),
        matches
    )?;
    Err(CliError::InvalidInput(format!(
        "{} verification errors",
        errors.len()
    )))
}

/// Problems found in one record, in reading order.
fn check_record(record: &MatchRecord) -> Vec<String> {
    let mut problems = Vec::new();

    if record.players.is_empty() {
        problems.push("Match has no players".to_string());
        return problems;
    }
    let expected_rounds = record.config.games_to_play as usize;
    if record.rounds.len() != expected_rounds {
        problems.push(format!(
            "Expected {} rounds, found {}",
            expected_rounds,
            record.rounds.len()
        ));
    }

    let mut summed: BTreeMap<&str, u32> =
        record.players.iter().map(|p| (p.as_str(), 0)).collect();
    let mut domino_wins: BTreeMap<&str, u32> =
        record.players.iter().map(|p| (p.as_str(), 0)).collect();

    for (i, round) in record.rounds.iter().enumerate() {
        let expected_number = i as u32 + 1;
        if round.game_number != expected_number {
            problems.push(format!(
                "Round {} is numbered {}",
                expected_number, round.game_number
            ));
        }
        let expected_engine = record.config.engine_value_for(expected_number);
        if round.engine_value != expected_engine {
            problems.push(format!(
                "Round {} used engine {} instead of {}",
                expected_number, round.engine_value, expected_engine
            ));
        }

        match (round.reason, &round.winner) {
            (RoundEndReason::Domino, Some(winner)) => {
                match round.scores.get(winner) {
                    Some(0) => {}
                    Some(score) => problems.push(format!(
                        "Round {} winner {} scored {}",
                        expected_number, winner, score
                    )),
                    None => problems.push(format!(
                        "Round {} winner {} has no score",
                        expected_number, winner
                    )),
                }
                match domino_wins.get_mut(winner.as_str()) {
                    Some(wins) => *wins += 1,
                    None => problems.push(format!(
                        "Round {} winner {} is not a player",
                        expected_number, winner
                    )),
                }
            }
            (RoundEndReason::Domino, None) => problems.push(format!(
                "Round {} ended by domino without a winner",
                expected_number
            )),
            (RoundEndReason::Blocked, Some(winner)) => problems.push(format!(
                "Blocked round {} names winner {}",
                expected_number, winner
            )),
            (RoundEndReason::Blocked, None) => {}
        }

        for (player, total) in summed.iter_mut() {
            match round.scores.get(*player) {
                Some(score) => *total += score,
                None => problems.push(format!(
                    "Round {} has no score for {}",
                    expected_number, player
                )),
            }
        }
    }

    for (player, total) in &summed {
        let recorded = record.cumulative_scores.get(*player).copied();
        if recorded != Some(*total) {
            problems.push(format!(
                "Cumulative score for {} is {:?}, rounds sum to {}",
                player, recorded, total
            ));
        }
    }
    for (player, wins) in &domino_wins {
        let recorded = record.round_wins.get(*player).copied().unwrap_or(0);
        if recorded != *wins {
            problems.push(format!(
                "Round wins for {} recorded as {}, counted {}",
                player, recorded, wins
            ));
        }
    }

    match pick_winner(&record.cumulative_scores, &record.round_wins) {
        Some(expected) if expected == record.winner => {}
        Some(expected) => problems.push(format!(
            "Winner is {} but the tie-break picks {}",
            record.winner, expected
        )),
        None => problems.push("No cumulative scores to pick a winner from".to_string()),
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::sim::{SeatSpec, play_ai_match};

    fn record() -> MatchRecord {
        let seats = vec![
            SeatSpec {
                id: "p1".to_string(),
                level: 2,
            },
            SeatSpec {
                id: "p2".to_string(),
                level: 3,
            },
        ];
        play_ai_match(&seats, 2, 11)
            .unwrap()
            .to_record("20260101-000001")
            .unwrap()
    }

    #[test]
    fn simulated_match_passes() {
        assert_eq!(check_record(&record()), Vec::<String>::new());
    }

    #[test]
    fn tampered_cumulative_score_is_reported() {
        let mut rec = record();
        *rec.cumulative_scores.get_mut("p1").unwrap() += 5;
        let problems = check_record(&rec);
        assert!(problems.iter().any(|p| p.starts_with("Cumulative score for p1")));
    }

    #[test]
    fn wrong_winner_is_reported() {
        let mut rec = record();
        rec.winner = if rec.winner == "p1" { "p2" } else { "p1" }.to_string();
        let problems = check_record(&rec);
        assert!(problems.iter().any(|p| p.contains("tie-break picks")));
    }

    #[test]
    fn missing_round_is_reported() {
        let mut rec = record();
        rec.rounds.pop();
        let problems = check_record(&rec);
        assert!(problems.iter().any(|p| p == "Expected 2 rounds, found 1"));
    }
}
