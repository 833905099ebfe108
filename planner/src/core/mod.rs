//! Deterministic, pure logic shared by the planner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests; the
//! only source of nondeterminism, the sampling RNG, is passed in by callers.

pub mod parser;
pub mod policy;
pub mod pool;
pub mod reflection;
pub mod reward;
pub mod solution;
pub mod stop;
pub mod types;
