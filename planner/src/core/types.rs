//! Shared deterministic types for planner core logic.
//!
//! These types define stable contracts between core components and the
//! oracle transports. They carry no I/O and serialize to the oracle wire
//! format unchanged.

use serde::{Deserialize, Serialize};

/// Scalar desirability of a proposed continuation.
///
/// Either a calibrated verification probability (reward-model scoring) or a
/// length-normalized likelihood (log-probability scoring). A single run only
/// ever produces one kind.
pub type Reward = f64;

/// One raw generation returned by the generation oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    /// Plain text, no token-level information.
    Text(String),
    /// Text with parallel token strings and per-token log-probabilities.
    Scored(ScoredText),
}

impl Sample {
    pub fn text(&self) -> &str {
        match self {
            Sample::Text(text) => text,
            Sample::Scored(scored) => &scored.text,
        }
    }
}

impl From<&str> for Sample {
    fn from(text: &str) -> Self {
        Sample::Text(text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredText {
    pub text: String,
    pub tokens: Vec<String>,
    pub logprobs: Vec<f64>,
}

/// A candidate token and its log-probability at one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLogprob {
    pub token: String,
    pub logprob: f64,
}

/// Problem family. Selects the step budget and candidate filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Gsm8k,
    Math,
}

impl Task {
    /// Default number of solution slots (and planning rounds) per problem.
    pub fn step_budget(self) -> usize {
        match self {
            Task::Gsm8k => 25,
            Task::Math => 30,
        }
    }

    /// Whether a retrieved action may be proposed for this task.
    ///
    /// `math` solutions are written inside a fenced code block, so an action
    /// that emits a fence would close the block early.
    pub fn admits(self, action: &str) -> bool {
        match self {
            Task::Gsm8k => true,
            Task::Math => !action.contains("```"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Task::Gsm8k => "gsm8k",
            Task::Math => "math",
        }
    }
}

/// How candidate continuations are rewarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Ask a process reward model to verify the proposed steps.
    Reward,
    /// Use the generator's own length-normalized token likelihood.
    Logp,
}

impl ScoringMode {
    pub fn wants_logprobs(self) -> bool {
        matches!(self, ScoringMode::Logp)
    }
}

/// What the planning loop does when no retrieved action clears the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoDecisionPolicy {
    /// Commit a reflection hint and finish if anything was tried, else retry.
    Reflect,
    /// Generate again next round.
    Retry,
    /// Finish the problem with what has been committed.
    Stop,
}

/// Why a problem stopped planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A committed action satisfied the stop condition.
    StopToken,
    /// Every solution slot is filled.
    SolutionFull,
    /// The round budget ran out.
    StepBudget,
    /// A reflection hint was committed after a round without a decision.
    Reflected,
    /// The no-decision policy ended the problem.
    NoDecision,
}
