//! Stuck detection and reflection hints.

use crate::core::pool::TrajectoryPool;

/// Build a reflection hint from everything tried so far.
///
/// Fires whenever the pool holds at least one entry: it signals that some
/// continuation was proposed and none was accepted, not that progress has
/// plateaued across rounds. The hint lists the distinct final actions of all
/// entries (first-seen order) and is formatted as a comment block.
pub fn reflect(pool: &TrajectoryPool, question: &str) -> Option<String> {
    if pool.is_empty() {
        return None;
    }

    let mut tried: Vec<&str> = Vec::new();
    for action in pool.entries().iter().filter_map(|entry| entry.last_action()) {
        if !tried.contains(&action) {
            tried.push(action);
        }
    }

    let hint = format!(
        "I have generated {}, but none of them are correct. I need to revise them to solve the problem {}.",
        tried.join(","),
        question
    );
    Some(format!("    # {}", hint.replace('\n', "\n# ")))
}
