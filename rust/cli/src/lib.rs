//! # Mextrain CLI Library
//!
//! Headless tools around the Mexican Train engine: deal a round, simulate AI matches,
//! compare skill levels and verify recorded matches.
//!
//! The entry point is [`run`], which parses the arguments, dispatches to a command and
//! returns the process exit code.
//!
//! ```no_run
//! use std::io;
//! let args = vec!["mextrain", "sim", "--matches", "10", "--levels", "2,4"];
//! let code = mextrain_cli::run(args, &mut io::stdout(), &mut io::stderr());
//! assert_eq!(code, 0);
//! ```
//!
//! ## Available Subcommands
//!
//! - `cfg`: Display the resolved configuration and its sources
//! - `deal`: Deal one round for inspection
//! - `sim`: Play AI-only matches and write JSONL match records
//! - `eval`: Head-to-head win rates of two AI skill levels
//! - `verify`: Re-check scores and winners in match records

use clap::Parser;
use std::io::Write;
pub mod cli;
mod commands;
mod config;
mod error;
pub mod exit_code;
pub mod io_utils;
pub mod ui;

use cli::{Commands, MextrainCli};
use commands::{
    SimOptions, handle_cfg_command, handle_deal_command, handle_eval_command, handle_sim_command,
    handle_verify_command,
};

pub use error::{BatchValidationError, CliError};

const COMMANDS: &[&str] = &["cfg", "deal", "sim", "eval", "verify"];

/// Runs one CLI invocation.
///
/// Returns `0` on success, `2` on any error and `130` when a simulation was cut short.
///
/// ```
/// use std::io;
/// let args = vec!["mextrain", "deal", "--seed", "42"];
/// let code = mextrain_cli::run(args, &mut io::stdout(), &mut io::stderr());
/// assert_eq!(code, 0);
/// ```
pub fn run<I, S>(args: I, out: &mut dyn Write, err: &mut dyn Write) -> i32
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let argv: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

    let cli = match MextrainCli::try_parse_from(&argv) {
        Ok(cli) => cli,
        Err(e) => return usage_error(e, out, err),
    };

    let result = match cli.cmd {
        Commands::Cfg => handle_cfg_command(out, err),
        Commands::Deal {
            seed,
            players,
            engine,
        } => handle_deal_command(seed, players, engine, out),
        Commands::Sim {
            matches,
            players,
            levels,
            games,
            seed,
            output,
        } => handle_sim_command(
            SimOptions {
                matches,
                players,
                levels,
                games,
                seed,
                output,
            },
            out,
            err,
        ),
        Commands::Eval {
            level_a,
            level_b,
            matches,
            games,
            seed,
        } => handle_eval_command(level_a, level_b, matches, games, seed, out),
        Commands::Verify { input } => {
            let Some(path) = input else {
                let _ = ui::write_error(err, "input required");
                return exit_code::ERROR;
            };
            handle_verify_command(path, out, err)
        }
    };

    match result {
        Ok(()) => exit_code::SUCCESS,
        Err(CliError::Interrupted(msg)) => {
            let _ = writeln!(err, "Interrupted: {}", msg);
            exit_code::INTERRUPTED
        }
        Err(e) => {
            if writeln!(err, "Error: {}", e).is_err() {
                return exit_code::ERROR;
            }
            exit_code::ERROR
        }
    }
}

fn usage_error(e: clap::Error, out: &mut dyn Write, err: &mut dyn Write) -> i32 {
    use clap::error::ErrorKind;

    // Help and version print to stdout and exit 0
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            if write!(out, "{}", e).is_err() {
                return exit_code::ERROR;
            }
            exit_code::SUCCESS
        }
        _ => {
            if writeln!(err, "{}", e).is_err()
                || writeln!(err).is_err()
                || writeln!(err, "Mexican Train CLI").is_err()
                || writeln!(err, "Usage: mextrain <command> [options]\n").is_err()
                || writeln!(err, "Commands:").is_err()
            {
                return exit_code::ERROR;
            }
            for c in COMMANDS {
                if writeln!(err, "  {}", c).is_err() {
                    return exit_code::ERROR;
                }
            }
            let _ = writeln!(err, "\nFor full help, run: mextrain --help");
            exit_code::ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_capture(args: &[&str]) -> (i32, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = run(args.iter().copied(), &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn help_goes_to_stdout() {
        let (code, out, _) = run_capture(&["mextrain", "--help"]);
        assert_eq!(code, 0);
        assert!(out.contains("verify"));
    }

    #[test]
    fn unknown_command_lists_commands() {
        let (code, _, err) = run_capture(&["mextrain", "play"]);
        assert_eq!(code, 2);
        assert!(err.contains("Usage: mextrain <command> [options]"));
        for c in COMMANDS {
            assert!(err.contains(&format!("  {c}\n")));
        }
    }

    #[test]
    fn verify_without_input_fails() {
        let (code, _, err) = run_capture(&["mextrain", "verify"]);
        assert_eq!(code, 2);
        assert_eq!(err, "Error: input required\n");
    }

    #[test]
    fn deal_dispatches() {
        let (code, out, _) = run_capture(&["mextrain", "deal", "--seed", "7", "--players", "2"]);
        assert_eq!(code, 0);
        assert!(out.starts_with("Seed: 7\nEngine: [12|12]\n"));
    }
}
