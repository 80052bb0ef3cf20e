//! Process exit codes returned by [`crate::run`].

pub const SUCCESS: i32 = 0;

/// Any failure: bad arguments, invalid records, I/O.
pub const ERROR: i32 = 2;

/// The run stopped early.
pub const INTERRUPTED: i32 = 130;
