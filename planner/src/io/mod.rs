//! I/O helpers for planner commands.

pub mod command;
pub mod config;
pub mod oracle;
pub mod problems;
pub mod process;
pub mod prompt;
