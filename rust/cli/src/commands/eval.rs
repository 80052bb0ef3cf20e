//! Head-to-head evaluation of two AI skill levels.
//!
//! Two seats, `a` and `b`, play a series of matches. Seating alternates every match so
//! neither level always moves first.

use super::sim::{SeatSpec, play_ai_match};
use crate::config;
use crate::error::CliError;
use crate::ui;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::io::Write;

#[derive(Debug, Default)]
struct EvalStats {
    wins: u32,
    round_wins: u32,
    total_score: u64,
    shutouts: u32,
}

impl EvalStats {
    fn avg_score(&self, matches: u32) -> f64 {
        if matches == 0 {
            0.0
        } else {
            self.total_score as f64 / f64::from(matches)
        }
    }
}

pub fn handle_eval_command(
    level_a: u8,
    level_b: u8,
    matches: u32,
    games: Option<u32>,
    seed: Option<u64>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    if matches == 0 {
        return Err(CliError::InvalidInput("matches must be >= 1".to_string()));
    }
    let cfg = config::load_with_sources()?.config;
    let games = games.unwrap_or(cfg.games);
    let base_seed = seed.or(cfg.seed).unwrap_or_else(rand::random);
    let mut seeds = ChaCha20Rng::seed_from_u64(base_seed);

    let a = SeatSpec {
        id: "a".to_string(),
        level: level_a,
    };
    let b = SeatSpec {
        id: "b".to_string(),
        level: level_b,
    };
    let mut stats_a = EvalStats::default();
    let mut stats_b = EvalStats::default();

    for i in 0..matches {
        let seating = if i % 2 == 0 {
            [a.clone(), b.clone()]
        } else {
            [b.clone(), a.clone()]
        };
        let game = play_ai_match(&seating, games, seeds.next_u64())?;
        let result = game
            .result()
            .ok_or_else(|| CliError::Engine("match ended without a result".to_string()))?;

        for (seat, stats) in [(&a, &mut stats_a), (&b, &mut stats_b)] {
            let score = result.cumulative_scores.get(&seat.id).copied().unwrap_or(0);
            if result.winner == seat.id {
                stats.wins += 1;
            }
            if score == 0 {
                stats.shutouts += 1;
            }
            stats.round_wins += result.round_wins.get(&seat.id).copied().unwrap_or(0);
            stats.total_score += u64::from(score);
        }
    }

    writeln!(
        out,
        "Eval: {} (A) vs {} (B), {} matches of {} games, seed {}",
        a.policy_name(),
        b.policy_name(),
        matches,
        games,
        base_seed
    )?;
    for (label, seat, stats) in [("A", &a, &stats_a), ("B", &b, &stats_b)] {
        writeln!(
            out,
            "{} {}: wins {} ({}), round wins {}, avg score {:.1}, shutouts {}",
            label,
            seat.policy_name(),
            stats.wins,
            ui::percent(stats.wins, matches),
            stats.round_wins,
            stats.avg_score(matches),
            stats.shutouts
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wins_on(line: &str) -> u32 {
        line.split("wins ")
            .nth(1)
            .and_then(|rest| rest.split(' ').next())
            .and_then(|n| n.parse().ok())
            .unwrap()
    }

    #[test]
    fn every_match_has_one_winner() {
        let mut out = Vec::new();
        handle_eval_command(1, 4, 4, Some(1), Some(42), &mut out).unwrap();

        let output = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Eval: sleepy_caboose (A) vs chain_strategist (B), 4 matches"));
        assert!(lines[1].starts_with("A sleepy_caboose: wins "));
        assert!(lines[2].starts_with("B chain_strategist: wins "));
        assert_eq!(wins_on(lines[1]) + wins_on(lines[2]), 4);
    }

    #[test]
    fn same_seed_same_report() {
        let mut first = Vec::new();
        let mut second = Vec::new();
        handle_eval_command(2, 3, 2, Some(1), Some(9), &mut first).unwrap();
        handle_eval_command(2, 3, 2, Some(1), Some(9), &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_matches_is_rejected() {
        let mut out = Vec::new();
        assert!(matches!(
            handle_eval_command(1, 2, 0, None, Some(1), &mut out),
            Err(CliError::InvalidInput(_))
        ));
    }
}
