//! Stable exit codes for planner CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config/prompts/problems or other errors.
pub const INVALID: i32 = 1;
/// A generation or scoring oracle failed and the run was aborted.
pub const ORACLE_FAILED: i32 = 2;
