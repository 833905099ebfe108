//! Oracle abstractions for generation and reward scoring.
//!
//! The [`Generator`] and [`RewardOracle`] traits decouple the planning loop
//! from the backends that serve language-model completions and
//! process-reward-model scores. Tests use scripted oracles that return
//! predetermined outputs without spawning processes.

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::types::{Sample, TokenLogprob};

/// One prompt for the generation oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_message: String,
    /// Few-shot examples followed by the question.
    pub prompt: String,
    /// Assistant text the completion continues from.
    pub answer_prefix: String,
}

/// Sampling parameters shared by every request in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Completions per request.
    pub n: usize,
    pub stop: Vec<String>,
    pub top_p: f64,
    pub max_tokens: usize,
    pub temperature: f64,
    pub do_sample: bool,
    /// Ask for tokens and per-token log-probabilities.
    pub logprobs: bool,
}

/// Generation result: one sample list per request, in request order.
///
/// A `None` list marks a request the backend could not serve (for example
/// because it exceeded the context window).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(default)]
    pub samples: Vec<Option<Vec<Sample>>>,
}

/// Reward-model result: per prompt, per token alternatives plus the tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub logprobs: Vec<Vec<Vec<TokenLogprob>>>,
    pub tokens: Vec<Vec<String>>,
}

/// Abstraction over generation backends.
pub trait Generator {
    /// Complete every request in one call.
    fn generate_batch(
        &self,
        requests: &[GenerationRequest],
        config: &GenerationConfig,
    ) -> Result<GenerationResponse>;

    /// Complete a single request.
    fn generate(
        &self,
        request: &GenerationRequest,
        config: &GenerationConfig,
    ) -> Result<GenerationResponse> {
        self.generate_batch(std::slice::from_ref(request), config)
    }
}

/// Abstraction over process-reward-model backends.
pub trait RewardOracle {
    fn score(&self, prompts: &[String]) -> Result<ScoreResponse>;
}

/// Which oracle a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    Generation,
    Scoring,
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleKind::Generation => f.write_str("generation"),
            OracleKind::Scoring => f.write_str("scoring"),
        }
    }
}

/// A run aborted because an oracle failed or returned an unusable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleFailure {
    pub oracle: OracleKind,
    pub message: String,
}

impl OracleFailure {
    pub fn generation(message: impl Into<String>) -> Self {
        Self {
            oracle: OracleKind::Generation,
            message: message.into(),
        }
    }

    pub fn scoring(message: impl Into<String>) -> Self {
        Self {
            oracle: OracleKind::Scoring,
            message: message.into(),
        }
    }

    /// Wrap a transport error, keeping its whole context chain.
    pub fn from_error(oracle: OracleKind, err: &anyhow::Error) -> Self {
        Self {
            oracle,
            message: format!("{err:#}"),
        }
    }
}

impl fmt::Display for OracleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} oracle failed: {}", self.oracle, self.message)
    }
}

impl std::error::Error for OracleFailure {}
