//! Command handler modules for the mextrain CLI.
//!
//! Each command lives in its own module and exposes
//! `pub fn handle_COMMAND_command(...) -> Result<(), CliError>`, writing to the output
//! streams it is given.

mod cfg;
mod deal;
mod eval;
mod sim;
mod verify;

pub use cfg::handle_cfg_command;
pub use deal::handle_deal_command;
pub use eval::handle_eval_command;
pub use sim::{SimOptions, handle_sim_command};
pub use verify::handle_verify_command;
