//! Simulation command: computer-only matches, recorded as JSONL.
//!
//! Every seat is an AI at a configurable skill level. Each match gets its own seed from
//! a ChaCha stream seeded with the run seed, so a run can be reproduced exactly.
//!
//! # Environment Variables
//!
//! - `MEXTRAIN_SIM_BREAK_AFTER`: stop after N matches as if interrupted (for testing)

use crate::config;
use crate::error::CliError;
use crate::io_utils::{ensure_parent_dir, read_text_auto, write_text_auto};
use crate::ui;
use mextrain_ai::{AIPolicy, POLICY_NAMES, create_ai, play_turn};
use mextrain_engine::config::MatchConfig;
use mextrain_engine::game::MatchOrchestrator;
use mextrain_engine::logger::{MatchLogger, MatchRecord, format_match_id};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::io::Write;
use std::path::Path;

/// Guards against a round that never ends.
const MAX_TURNS_PER_ROUND: u32 = 10_000;

#[derive(Debug, Clone, Default)]
pub struct SimOptions {
    pub matches: u32,
    pub players: Option<u8>,
    pub levels: Vec<u8>,
    pub games: Option<u32>,
    pub seed: Option<u64>,
    pub output: Option<String>,
}

/// One computer seat.
#[derive(Debug, Clone)]
pub(crate) struct SeatSpec {
    pub id: String,
    pub level: u8,
}

impl SeatSpec {
    pub fn policy_name(&self) -> &'static str {
        POLICY_NAMES[usize::from(self.level.clamp(1, 5)) - 1]
    }
}

/// Plays a full match between AI seats and returns the finished orchestrator.
pub(crate) fn play_ai_match(
    seats: &[SeatSpec],
    games: u32,
    seed: u64,
) -> Result<MatchOrchestrator, CliError> {
    let config = MatchConfig {
        max_players: seats.len().max(2),
        games_to_play: games,
        seed: Some(seed),
        ..MatchConfig::default()
    };
    let policies: Vec<Box<dyn AIPolicy>> = seats
        .iter()
        .enumerate()
        .map(|(i, seat)| create_ai(seat.level, Some(seed.wrapping_add(i as u64))))
        .collect();
    let ids = seats.iter().map(|s| s.id.clone()).collect();

    let mut game = MatchOrchestrator::new(ids, config)?;
    game.start()?;
    while !game.is_over() {
        let game_number = game.current_game_number();
        let round = game.round_mut()?;
        let mut turns = 0;
        while !round.is_over() {
            turns += 1;
            if turns > MAX_TURNS_PER_ROUND {
                return Err(CliError::Engine(format!(
                    "round {game_number} did not finish within {MAX_TURNS_PER_ROUND} turns"
                )));
            }
            let player = round.current_player().clone();
            let seat = seats
                .iter()
                .position(|s| s.id == player)
                .ok_or_else(|| CliError::Engine(format!("unknown seat {player}")))?;
            play_turn(policies[seat].as_ref(), round, &player)?;
        }
        game.advance()?;
    }
    Ok(game)
}

#[derive(Debug, Default, Clone)]
struct SeatTally {
    wins: u32,
    round_wins: u32,
    total_score: u64,
}

enum RecordSink {
    Plain(MatchLogger),
    /// Compressed files are rewritten whole at the end of the run
    Compressed { path: String, lines: String },
}

impl RecordSink {
    /// Opens `path` for appending. Also returns how many records it already holds.
    fn open(path: &str) -> Result<(Self, u32), String> {
        ensure_parent_dir(Path::new(path))?;
        let existing_text = if Path::new(path).exists() {
            read_text_auto(path)?
        } else {
            String::new()
        };
        let existing = existing_text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count() as u32;
        let sink = if path.ends_with(".zst") {
            RecordSink::Compressed {
                path: path.to_string(),
                lines: existing_text,
            }
        } else {
            MatchLogger::append(path)
                .map(RecordSink::Plain)
                .map_err(|e| e.to_string())?
        };
        Ok((sink, existing))
    }

    fn write(&mut self, record: &MatchRecord) -> Result<(), String> {
        match self {
            RecordSink::Plain(logger) => logger.write(record).map_err(|e| e.to_string()),
            RecordSink::Compressed { lines, .. } => {
                let line = serde_json::to_string(record).map_err(|e| e.to_string())?;
                lines.push_str(&line);
                lines.push('\n');
                Ok(())
            }
        }
    }

    fn finish(self) -> Result<(), String> {
        match self {
            RecordSink::Plain(_) => Ok(()),
            RecordSink::Compressed { path, lines } => write_text_auto(&path, &lines),
        }
    }
}

/// Handle the sim command.
///
/// Missing options fall back to the resolved configuration. Seat `i` plays at
/// `levels[i % levels.len()]`. Records are appended to `output` when given.
pub fn handle_sim_command(
    options: SimOptions,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), CliError> {
    if options.matches == 0 {
        ui::write_error(err, "matches must be >= 1")?;
        return Err(CliError::InvalidInput("matches must be >= 1".to_string()));
    }
    let cfg = config::load_with_sources()?.config;
    let players = options.players.map(usize::from).unwrap_or(cfg.players);
    let games = options.games.unwrap_or(cfg.games);
    let levels = if options.levels.is_empty() {
        vec![cfg.ai_level]
    } else {
        options.levels
    };
    if levels.len() > players {
        ui::display_warning(
            err,
            &format!(
                "{} levels given for {} seats; extra levels ignored",
                levels.len(),
                players
            ),
        )?;
    }
    let seats: Vec<SeatSpec> = (0..players)
        .map(|i| SeatSpec {
            id: format!("p{}", i + 1),
            level: levels[i % levels.len()],
        })
        .collect();

    let base_seed = options.seed.or(cfg.seed).unwrap_or_else(rand::random);
    let mut seeds = ChaCha20Rng::seed_from_u64(base_seed);
    let break_after = std::env::var("MEXTRAIN_SIM_BREAK_AFTER")
        .ok()
        .and_then(|v| v.parse::<u32>().ok());

    let (mut sink, existing) = match options.output.as_deref() {
        Some(path) => match RecordSink::open(path) {
            Ok((sink, existing)) => (Some(sink), existing),
            Err(e) => {
                ui::write_error(err, &format!("Failed to open output file: {}", e))?;
                return Err(CliError::Io(std::io::Error::other(e)));
            }
        },
        None => (None, 0),
    };

    let run_date = chrono::Utc::now().format("%Y%m%d").to_string();
    let mut tally = vec![SeatTally::default(); seats.len()];
    let mut played = 0u32;
    for _ in 0..options.matches {
        if break_after == Some(played) {
            break;
        }
        let match_seed = seeds.next_u64();
        let game = play_ai_match(&seats, games, match_seed)?;
        let result = game
            .result()
            .ok_or_else(|| CliError::Engine("match ended without a result".to_string()))?;

        for (seat, entry) in seats.iter().zip(tally.iter_mut()) {
            if result.winner == seat.id {
                entry.wins += 1;
            }
            entry.round_wins += result.round_wins.get(&seat.id).copied().unwrap_or(0);
            entry.total_score += u64::from(result.cumulative_scores.get(&seat.id).copied().unwrap_or(0));
        }

        if let Some(sink) = sink.as_mut() {
            let match_id = format_match_id(&run_date, existing + played + 1);
            let mut record = game
                .to_record(match_id)
                .ok_or_else(|| CliError::Engine("finished match has no record".to_string()))?;
            record.meta = Some(serde_json::json!({
                "seed": match_seed,
                "levels": seats.iter().map(|s| s.level).collect::<Vec<_>>(),
                "policies": seats.iter().map(SeatSpec::policy_name).collect::<Vec<_>>(),
            }));
            if let Err(e) = sink.write(&record) {
                ui::write_error(err, &format!("Failed to write record: {}", e))?;
                return Err(CliError::Io(std::io::Error::other(e)));
            }
        }
        played += 1;
    }

    if let Some(sink) = sink
        && let Err(e) = sink.finish()
    {
        ui::write_error(err, &format!("Failed to write output file: {}", e))?;
        return Err(CliError::Io(std::io::Error::other(e)));
    }

    writeln!(
        out,
        "Simulated {} matches: {} players, {} games each, seed {}",
        played, players, games, base_seed
    )?;
    for (seat, entry) in seats.iter().zip(&tally) {
        let avg = if played == 0 {
            0.0
        } else {
            entry.total_score as f64 / f64::from(played)
        };
        writeln!(
            out,
            "{} {} (level {}): wins {} ({}), round wins {}, avg score {:.1}",
            seat.id,
            seat.policy_name(),
            seat.level,
            entry.wins,
            ui::percent(entry.wins, played),
            entry.round_wins,
            avg
        )?;
    }
    if let Some(path) = &options.output {
        writeln!(out, "Records: {}", path)?;
    }

    if played < options.matches {
        return Err(CliError::Interrupted(format!(
            "stopped after {} of {} matches",
            played, options.matches
        )));
    }
    Ok(())
}
