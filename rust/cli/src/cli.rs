//! Command-line argument definitions.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "mextrain",
    version,
    about = "Mexican Train dominoes: deal, simulate, evaluate and verify matches"
)]
pub struct MextrainCli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the resolved configuration and where each value came from
    Cfg,
    /// Deal one round and print the engine double, every hand and the boneyard size
    Deal {
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(2..=8))]
        players: Option<u8>,
        /// Engine double value (defaults to the highest double)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=12))]
        engine: Option<u8>,
    },
    /// Play computer-only matches and optionally record them as JSONL
    Sim {
        #[arg(long, default_value_t = 1)]
        matches: u32,
        #[arg(long, value_parser = clap::value_parser!(u8).range(2..=8))]
        players: Option<u8>,
        /// Skill level per seat, comma separated; repeats when shorter than the table
        #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u8).range(1..=5))]
        levels: Vec<u8>,
        /// Rounds per match
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
        games: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
        /// Record file; a `.zst` suffix writes it compressed
        #[arg(long)]
        output: Option<String>,
    },
    /// Pit two skill levels against each other head to head
    Eval {
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        level_a: u8,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        level_b: u8,
        #[arg(long, default_value_t = 10)]
        matches: u32,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
        games: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Check recorded matches for consistent scores and winners
    Verify {
        #[arg(long)]
        input: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_subcommand() {
        let commands = vec![
            vec!["mextrain", "cfg"],
            vec!["mextrain", "deal", "--seed", "3", "--players", "4", "--engine", "9"],
            vec!["mextrain", "sim", "--matches", "2", "--levels", "1,5", "--output", "a.jsonl"],
            vec!["mextrain", "eval", "--level-a", "2", "--level-b", "4"],
            vec!["mextrain", "verify", "--input", "a.jsonl"],
        ];
        for args in commands {
            assert!(MextrainCli::try_parse_from(&args).is_ok(), "failed to parse {args:?}");
        }
    }

    #[test]
    fn levels_are_split_on_commas() {
        let cli = MextrainCli::try_parse_from(["mextrain", "sim", "--levels", "1,3,5"]).unwrap();
        match cli.cmd {
            Commands::Sim { levels, matches, .. } => {
                assert_eq!(levels, vec![1, 3, 5]);
                assert_eq!(matches, 1);
            }
            other => panic!("expected sim, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for args in [
            vec!["mextrain", "deal", "--players", "1"],
            vec!["mextrain", "deal", "--engine", "13"],
            vec!["mextrain", "sim", "--levels", "0"],
            vec!["mextrain", "sim", "--games", "101"],
            vec!["mextrain", "eval", "--level-a", "6", "--level-b", "1"],
        ] {
            assert!(MextrainCli::try_parse_from(&args).is_err(), "accepted {args:?}");
        }
    }
}
