//! Configuration command handler.
//!
//! Prints the resolved configuration with the source of every value:
//!
//! ```json
//! {
//!   "seed": { "value": null, "source": "default" },
//!   "players": { "value": 4, "source": "env" },
//!   ...
//! }
//! ```

use crate::config;
use crate::error::CliError;
use crate::ui;
use std::io::Write;

pub fn handle_cfg_command(out: &mut dyn Write, err: &mut dyn Write) -> Result<(), CliError> {
    let config::ConfigResolved { config, sources } = match config::load_with_sources() {
        Ok(r) => r,
        Err(e) => {
            ui::display_warning(err, "check MEXTRAIN_CONFIG and the MEXTRAIN_* variables")?;
            return Err(e.into());
        }
    };
    let display = serde_json::json!({
        "seed": {
            "value": config.seed,
            "source": sources.seed,
        },
        "players": {
            "value": config.players,
            "source": sources.players,
        },
        "games": {
            "value": config.games,
            "source": sources.games,
        },
        "ai_level": {
            "value": config.ai_level,
            "source": sources.ai_level,
        }
    });
    let json_str = serde_json::to_string_pretty(&display).map_err(std::io::Error::other)?;
    writeln!(out, "{}", json_str)?;
    Ok(())
}
