//! Process-reward-model input formatting and step verification scores.
//!
//! The reward model reads a question followed by numbered steps, each closed
//! by a step tag. The token after every tag is where the model predicts a
//! good or bad marker; the probability of the good marker at the last tag
//! is the reward of the whole proposal.

use serde::{Deserialize, Serialize};

use crate::core::types::{Reward, TokenLogprob};

/// Marker tokens understood by the reward model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepMarkers {
    pub good: String,
    pub bad: String,
    pub step_tag: String,
}

impl Default for StepMarkers {
    fn default() -> Self {
        Self {
            good: "+".to_string(),
            bad: "-".to_string(),
            step_tag: "ки".to_string(),
        }
    }
}

/// Render the reward-model input for `history` followed by `proposal`.
pub fn verification_prompt(
    question: &str,
    history: &[&str],
    proposal: &[String],
    markers: &StepMarkers,
) -> String {
    let tag = &markers.step_tag;
    let steps = history
        .iter()
        .copied()
        .chain(proposal.iter().map(String::as_str));

    let mut body = String::new();
    for (index, action) in steps.enumerate() {
        if action.contains("answer") {
            body.push_str(&format!("{action}{tag}\n"));
        }
        body.push_str(&format!("Step {}: {action} {tag}\n", index + 1));
    }
    format!("{question} {body}")
}

/// Good-marker probability at the last step tag.
///
/// For every token containing the step tag, the alternatives at the next
/// position give the first good and bad marker log-probabilities (0.0 when a
/// marker is absent), renormalized with a two-way softmax. Returns `None`
/// when no tag is followed by a scored position.
pub fn step_probability(
    logprobs: &[Vec<TokenLogprob>],
    tokens: &[String],
    markers: &StepMarkers,
) -> Option<Reward> {
    let mut last = None;
    for (index, token) in tokens.iter().enumerate() {
        if !token.contains(markers.step_tag.as_str()) {
            continue;
        }
        let Some(alternatives) = logprobs.get(index + 1) else {
            continue;
        };
        let good = marker_logprob(alternatives, &markers.good);
        let bad = marker_logprob(alternatives, &markers.bad);
        last = Some(1.0 / (1.0 + (bad - good).exp()));
    }
    last
}

fn marker_logprob(alternatives: &[TokenLogprob], marker: &str) -> f64 {
    alternatives
        .iter()
        .find(|alt| alt.token.contains(marker))
        .map_or(0.0, |alt| alt.logprob)
}
