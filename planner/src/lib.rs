//! Receding-horizon step planner for language-model problem solving.
//!
//! A generator proposes continuations of a partial solution, a scoring
//! oracle rewards them, and the planner commits one step at a time using
//! n-gram retrieval over everything proposed so far. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, retrieval, decisions).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (oracle processes, config, prompt
//!   files). Isolated behind traits to enable scripted oracles in tests.
//!
//! Orchestration modules ([`planner`], [`batch`], [`scoring`]) coordinate
//! core logic with the oracles to implement CLI commands.

pub mod batch;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod planner;
pub mod scoring;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
