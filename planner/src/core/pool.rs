//! Trajectory pool and n-gram action retrieval.
//!
//! Every accepted generation is stored as one [`PoolEntry`]: a root step, the
//! history that was committed when the generation was requested, and the
//! proposed chain. Retrieval slides over every entry looking for runs whose
//! leading steps equal the tail of the current history, and returns the step
//! that followed together with the entry's reward.

use crate::core::types::{Reward, Task};

/// One step of a recorded trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// `None` only for the root step.
    pub action: Option<String>,
    /// `Some(true)` for committed history, `None` for proposals, `Some(false)` for the root.
    pub verified: Option<bool>,
    pub reward: Reward,
}

/// One recorded generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    steps: Vec<Step>,
}

impl PoolEntry {
    /// Build an entry: root, then `history` (verified), then `proposal`.
    pub fn new(history: &[&str], proposal: &[String], reward: Reward) -> Self {
        let mut steps = Vec::with_capacity(1 + history.len() + proposal.len());
        steps.push(Step {
            action: None,
            verified: Some(false),
            reward,
        });
        steps.extend(history.iter().map(|action| Step {
            action: Some((*action).to_string()),
            verified: Some(true),
            reward,
        }));
        steps.extend(proposal.iter().map(|action| Step {
            action: Some(action.clone()),
            verified: None,
            reward,
        }));
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Action of the final step.
    pub fn last_action(&self) -> Option<&str> {
        self.steps.last().and_then(|step| step.action.as_deref())
    }
}

/// A retrieved continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub action: String,
    pub reward: Reward,
}

/// Append-only log of attempts for one problem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectoryPool {
    entries: Vec<PoolEntry>,
}

impl TrajectoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, history: &[&str], proposal: &[String], reward: Reward) {
        self.entries.push(PoolEntry::new(history, proposal, reward));
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry. Only used when cross-round memory is disabled.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Collect every continuation recorded after a tail of `history`.
///
/// `history` is the committed prefix without the root sentinel; the
/// sentinel is matched implicitly so full-prefix matches anchor at an
/// entry's root. At each offset the run length is
/// `min(remaining, window, history.len() + 1)`; runs shorter than two steps
/// carry no context and are skipped. Every aligned run yields a match, so a
/// step reached through several runs or entries is returned once per run
/// and the decision policy weighs it accordingly.
pub fn retrieve(pool: &TrajectoryPool, history: &[&str], window: usize, task: Task) -> Vec<Match> {
    let anchored: Vec<Option<&str>> = std::iter::once(None)
        .chain(history.iter().map(|action| Some(*action)))
        .collect();

    let mut matches = Vec::new();
    for entry in pool.entries() {
        let steps = entry.steps();
        for offset in 0..steps.len() {
            let n = (steps.len() - offset).min(window).min(anchored.len() + 1);
            if n < 2 {
                continue;
            }
            let run = &steps[offset..offset + n];
            let context = &anchored[anchored.len() - (n - 1)..];
            let aligned = run[..n - 1]
                .iter()
                .zip(context)
                .all(|(step, expected)| step.action.as_deref() == *expected);
            if !aligned {
                continue;
            }
            let last = &run[n - 1];
            if let Some(action) = &last.action {
                matches.push(Match {
                    action: action.clone(),
                    reward: last.reward,
                });
            }
        }
    }

    matches.retain(|candidate| task.admits(&candidate.action));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn actions(matches: &[Match]) -> Vec<&str> {
        matches.iter().map(|m| m.action.as_str()).collect()
    }

    #[test]
    fn entry_layout_marks_root_history_and_proposal() {
        let entry = PoolEntry::new(&["a."], &strings(&[" b.", " c."]), 0.7);
        let verified: Vec<Option<bool>> = entry.steps().iter().map(|s| s.verified).collect();
        assert_eq!(verified, vec![Some(false), Some(true), None, None]);
        assert_eq!(entry.steps()[0].action, None);
        assert_eq!(entry.last_action(), Some(" c."));
        assert!(entry.steps().iter().all(|s| s.reward == 0.7));
    }

    #[test]
    fn empty_history_returns_first_proposed_step() {
        let mut pool = TrajectoryPool::new();
        pool.record(&[], &strings(&["a.", " b."]), 0.9);
        let matches = retrieve(&pool, &[], 25, Task::Gsm8k);
        assert_eq!(actions(&matches), vec!["a."]);
        assert_eq!(matches[0].reward, 0.9);
    }

    #[test]
    fn one_step_history_is_recalled_at_any_offset() {
        let mut pool = TrajectoryPool::new();
        pool.record(&[], &strings(&["a.", " b."]), 0.5);
        pool.record(&[], &strings(&["x.", "a.", " c."]), 0.8);
        pool.record(&[], &strings(&["y."]), 0.3);

        // ` b.` follows both [root, a.] and [a.] in the first entry.
        let matches = retrieve(&pool, &["a."], 25, Task::Gsm8k);
        assert_eq!(actions(&matches), vec![" b.", " b.", " c."]);
        assert_eq!(matches[2].reward, 0.8);
    }

    #[test]
    fn retrieval_follows_current_history_not_recorded_history() {
        let mut pool = TrajectoryPool::new();
        pool.record(&[], &strings(&["a.", " b.", " c."]), 0.6);
        pool.record(&["a."], &strings(&[" d."]), 0.9);

        let matches = retrieve(&pool, &["a.", " b."], 25, Task::Gsm8k);
        assert_eq!(actions(&matches), vec![" c.", " c.", " c."]);

        let matches = retrieve(&pool, &["a."], 25, Task::Gsm8k);
        assert_eq!(actions(&matches), vec![" b.", " d.", " d."]);
    }

    #[test]
    fn window_bounds_context_length() {
        let mut pool = TrajectoryPool::new();
        pool.record(&[], &strings(&["z.", " b.", " c.", " e."]), 0.4);

        // The recorded run differs from [root, a., b.] at `a.`; a window of
        // two only compares the last committed step.
        assert!(retrieve(&pool, &["a.", " b."], 25, Task::Gsm8k).is_empty());
        let matches = retrieve(&pool, &["a.", " b."], 2, Task::Gsm8k);
        assert_eq!(actions(&matches), vec![" c."]);
    }

    #[test]
    fn every_aligned_run_counts_as_a_match() {
        let mut pool = TrajectoryPool::new();
        pool.record(&[], &strings(&["a.", " b."]), 0.5);
        pool.record(&[], &strings(&["a.", " x."]), 0.6);
        pool.record(&[], &strings(&["z.", "a.", " x."]), 0.7);

        // Root-anchored entries match through [root, a.] and [a.]; the
        // third entry only through [a.].
        let matches = retrieve(&pool, &["a."], 25, Task::Gsm8k);
        assert_eq!(actions(&matches), vec![" b.", " b.", " x.", " x.", " x."]);
        let rewards: Vec<Reward> = matches.iter().map(|m| m.reward).collect();
        assert_eq!(rewards, vec![0.5, 0.5, 0.6, 0.6, 0.7]);
    }

    #[test]
    fn duplicates_across_entries_are_kept() {
        let mut pool = TrajectoryPool::new();
        pool.record(&[], &strings(&["a."]), 0.2);
        pool.record(&[], &strings(&["a."]), 0.4);
        let matches = retrieve(&pool, &[], 25, Task::Gsm8k);
        assert_eq!(actions(&matches), vec!["a.", "a."]);
    }

    #[test]
    fn math_task_discards_code_fences() {
        let mut pool = TrajectoryPool::new();
        pool.record(&[], &strings(&["    return x\n```"]), 0.9);
        pool.record(&[], &strings(&["    x = 1"]), 0.1);
        let matches = retrieve(&pool, &[], 30, Task::Math);
        assert_eq!(actions(&matches), vec!["    x = 1"]);
    }

    #[test]
    fn unit_window_never_matches() {
        let mut pool = TrajectoryPool::new();
        pool.record(&[], &strings(&["a."]), 0.9);
        assert!(retrieve(&pool, &[], 1, Task::Gsm8k).is_empty());
    }
}
