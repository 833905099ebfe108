//! Reward-weighted selection among retrieved continuations.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use tracing::debug;

use crate::core::pool::Match;
use crate::core::types::Reward;

/// How one action is chosen among matches that clear the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    /// Highest reward; ties go to the earliest match.
    Greedy,
    /// Draw from `softmax(reward / temperature)` merged per distinct action.
    Sample { temperature: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    threshold: Reward,
    selection: Selection,
}

impl DecisionPolicy {
    pub fn new(threshold: Reward, selection: Selection) -> Self {
        Self {
            threshold,
            selection,
        }
    }

    /// Pick the next action, or `None` when nothing clears the threshold.
    ///
    /// Matches with a non-finite reward are ignored.
    pub fn decide<R: Rng + ?Sized>(&self, matches: &[Match], rng: &mut R) -> Option<String> {
        let usable: Vec<&Match> = matches.iter().filter(|m| m.reward.is_finite()).collect();
        let best = greedy(&usable)?;
        if best.reward < self.threshold {
            debug!(
                best_reward = best.reward,
                threshold = self.threshold,
                "no match clears the reward threshold"
            );
            return None;
        }

        match self.selection {
            Selection::Greedy => Some(best.action.clone()),
            Selection::Sample { temperature } => {
                let merged = action_probabilities(&usable, temperature);
                debug!(?merged, "action probabilities");
                match WeightedIndex::new(merged.iter().map(|(_, p)| *p)) {
                    Ok(dist) => Some(merged[dist.sample(rng)].0.to_string()),
                    Err(_) => Some(best.action.clone()),
                }
            }
        }
    }

    /// Decide independently for each problem's match set, in order.
    pub fn decide_each<R: Rng + ?Sized>(
        &self,
        match_sets: &[Vec<Match>],
        rng: &mut R,
    ) -> Vec<Option<String>> {
        match_sets
            .iter()
            .map(|matches| self.decide(matches, rng))
            .collect()
    }
}

fn greedy<'m>(matches: &[&'m Match]) -> Option<&'m Match> {
    let mut best: Option<&Match> = None;
    for &candidate in matches {
        if best.is_none_or(|b| candidate.reward > b.reward) {
            best = Some(candidate);
        }
    }
    best
}

/// Softmax over every match, summed per distinct action in first-seen order.
fn action_probabilities<'m>(matches: &[&'m Match], temperature: f64) -> Vec<(&'m str, f64)> {
    let max = matches
        .iter()
        .map(|m| m.reward)
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = matches
        .iter()
        .map(|m| ((m.reward - max) / temperature).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    let mut merged: Vec<(&str, f64)> = Vec::new();
    for (candidate, weight) in matches.iter().zip(&weights) {
        let p = weight / total;
        match merged
            .iter_mut()
            .find(|(action, _)| *action == candidate.action)
        {
            Some(slot) => slot.1 += p,
            None => merged.push((candidate.action.as_str(), p)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn matches(items: &[(&str, f64)]) -> Vec<Match> {
        items
            .iter()
            .map(|(action, reward)| Match {
                action: action.to_string(),
                reward: *reward,
            })
            .collect()
    }

    #[test]
    fn no_matches_means_no_decision() {
        let policy = DecisionPolicy::new(0.0, Selection::Greedy);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.decide(&[], &mut rng), None);
    }

    #[test]
    fn rewards_below_threshold_mean_no_decision() {
        let set = matches(&[("a", 0.2), ("b", 0.4), ("b", 0.4)]);
        let mut rng = StdRng::seed_from_u64(1);
        for selection in [Selection::Greedy, Selection::Sample { temperature: 0.1 }] {
            let policy = DecisionPolicy::new(0.5, selection);
            assert_eq!(policy.decide(&set, &mut rng), None);
        }
    }

    #[test]
    fn greedy_picks_strict_maximum_and_earliest_tie() {
        let policy = DecisionPolicy::new(0.5, Selection::Greedy);
        let mut rng = StdRng::seed_from_u64(1);
        let set = matches(&[("a", 0.5), ("b", 0.9), ("c", 0.9), ("d", 0.1)]);
        assert_eq!(policy.decide(&set, &mut rng).as_deref(), Some("b"));
    }

    #[test]
    fn sampling_is_reproducible_under_a_seed() {
        let policy = DecisionPolicy::new(0.0, Selection::Sample { temperature: 1.0 });
        let set = matches(&[("a", 0.3), ("b", 0.5), ("c", 0.4), ("a", 0.6)]);
        let draws = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..16)
                .map(|_| policy.decide(&set, &mut rng).expect("decision"))
                .collect::<Vec<_>>()
        };
        assert_eq!(draws(42), draws(42));
    }

    #[test]
    fn sampling_converges_to_argmax_as_temperature_vanishes() {
        let policy = DecisionPolicy::new(0.0, Selection::Sample { temperature: 1e-6 });
        let set = matches(&[("a", 0.5), ("b", 0.9), ("c", 0.7)]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..32 {
            assert_eq!(policy.decide(&set, &mut rng).as_deref(), Some("b"));
        }
    }

    #[test]
    fn probabilities_are_summed_per_action() {
        let set = matches(&[("a", 1.0), ("b", 1.0), ("a", 1.0)]);
        let refs: Vec<&Match> = set.iter().collect();
        let merged = action_probabilities(&refs, 1.0);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].0, "a");
        assert!((merged[0].1 - 2.0 / 3.0).abs() < 1e-12);
        assert!((merged[1].1 - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn non_finite_rewards_are_ignored() {
        let policy = DecisionPolicy::new(0.0, Selection::Greedy);
        let mut rng = StdRng::seed_from_u64(1);
        let set = matches(&[("nan", f64::NAN), ("a", 0.4)]);
        assert_eq!(policy.decide(&set, &mut rng).as_deref(), Some("a"));
    }

    #[test]
    fn batched_decisions_stay_per_problem() {
        let policy = DecisionPolicy::new(0.5, Selection::Greedy);
        let mut rng = StdRng::seed_from_u64(1);
        let sets = vec![
            matches(&[("a", 0.9)]),
            Vec::new(),
            matches(&[("b", 0.2)]),
            matches(&[("c", 0.6), ("d", 0.7)]),
        ];
        let decided = policy.decide_each(&sets, &mut rng);
        assert_eq!(
            decided,
            vec![Some("a".to_string()), None, None, Some("d".to_string())]
        );
    }
}
