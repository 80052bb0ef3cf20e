//! Deal command: shuffles and deals one round, then shows the table before the first
//! move. The same seed always produces the same deal.

use crate::config;
use crate::error::CliError;
use mextrain_engine::config::MatchConfig;
use mextrain_engine::round::RoundEngine;
use mextrain_engine::tile::Tile;
use std::io::Write;

/// Handle the deal command.
///
/// `players` and `seed` fall back to the resolved configuration; `engine` defaults to
/// the highest double. Output:
///
/// ```text
/// Seed: 42
/// Engine: [12|12]
/// p1 (16): [3|7] [0|12] ...
/// p2 (16): ...
/// Boneyard: 58
/// ```
pub fn handle_deal_command(
    seed: Option<u64>,
    players: Option<u8>,
    engine: Option<u8>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let cfg = config::load_with_sources()?.config;
    let players = players.map(usize::from).unwrap_or(cfg.players);
    let seed = seed.or(cfg.seed).unwrap_or_else(rand::random);

    let match_config = MatchConfig::default();
    let engine = engine.unwrap_or(match_config.max_pip);
    let ids: Vec<String> = (1..=players).map(|i| format!("p{i}")).collect();

    let mut round = RoundEngine::new(ids.clone(), engine, &match_config, Some(seed))?;
    round.start_round()?;

    writeln!(out, "Seed: {}", seed)?;
    writeln!(out, "Engine: {}", round.anchor())?;
    for id in &ids {
        let hand = round
            .hand(id)
            .ok_or_else(|| CliError::Engine(format!("no hand dealt to {id}")))?;
        writeln!(out, "{} ({}): {}", id, hand.len(), format_tiles(hand.tiles()))?;
    }
    writeln!(out, "Boneyard: {}", round.boneyard_count())?;
    Ok(())
}

fn format_tiles(tiles: &[Tile]) -> String {
    tiles
        .iter()
        .map(Tile::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
