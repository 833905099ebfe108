//! Candidate scoring strategies.
//!
//! The strategy is chosen once when a planner is built and never changes
//! during a run, so rewards recorded in one pool are always comparable.

use anyhow::{Result, bail};
use tracing::{debug, instrument};

use crate::core::reward::{StepMarkers, step_probability, verification_prompt};
use crate::core::types::{Reward, ScoringMode};
use crate::io::oracle::{OracleFailure, OracleKind, RewardOracle};

/// What a strategy needs to know about one candidate.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'c> {
    pub question: &'c str,
    pub history: &'c [&'c str],
    pub chain: &'c [String],
    pub probability: Option<f64>,
}

pub enum Scoring<'a> {
    /// Ask a process reward model to verify history plus chain.
    RewardModel {
        oracle: &'a dyn RewardOracle,
        markers: StepMarkers,
    },
    /// Use the parser's length-normalized likelihood.
    Likelihood,
}

impl<'a> Scoring<'a> {
    /// Select the strategy for `mode`; reward scoring needs an oracle.
    pub fn new(
        mode: ScoringMode,
        oracle: Option<&'a dyn RewardOracle>,
        markers: StepMarkers,
    ) -> Result<Self> {
        match (mode, oracle) {
            (ScoringMode::Reward, Some(oracle)) => Ok(Scoring::RewardModel { oracle, markers }),
            (ScoringMode::Reward, None) => {
                bail!("scoring mode `reward` requires a reward oracle")
            }
            (ScoringMode::Logp, _) => Ok(Scoring::Likelihood),
        }
    }

    pub fn mode(&self) -> ScoringMode {
        match self {
            Scoring::RewardModel { .. } => ScoringMode::Reward,
            Scoring::Likelihood => ScoringMode::Logp,
        }
    }

    /// Reward every candidate, in order.
    ///
    /// A `None` reward drops the candidate. The reward model is called once
    /// for the whole slice; an answer without a usable step marker fails the
    /// run like any other oracle failure.
    #[instrument(skip_all, fields(candidates = inputs.len(), mode = ?self.mode()))]
    pub fn score(&self, inputs: &[ScoringInput<'_>]) -> Result<Vec<Option<Reward>>, OracleFailure> {
        match self {
            Scoring::Likelihood => {
                let rewards: Vec<Option<Reward>> =
                    inputs.iter().map(|input| input.probability).collect();
                let dropped = rewards.iter().filter(|r| r.is_none()).count();
                if dropped > 0 {
                    debug!(dropped, "candidates without token likelihood");
                }
                Ok(rewards)
            }
            Scoring::RewardModel { oracle, markers } => {
                if inputs.is_empty() {
                    return Ok(Vec::new());
                }
                let prompts: Vec<String> = inputs
                    .iter()
                    .map(|input| {
                        verification_prompt(input.question, input.history, input.chain, markers)
                    })
                    .collect();
                let response = oracle
                    .score(&prompts)
                    .map_err(|err| OracleFailure::from_error(OracleKind::Scoring, &err))?;
                if response.logprobs.len() != prompts.len() || response.tokens.len() != prompts.len()
                {
                    return Err(OracleFailure::scoring(format!(
                        "expected {} scored prompts, got {}",
                        prompts.len(),
                        response.tokens.len().min(response.logprobs.len())
                    )));
                }

                response
                    .logprobs
                    .iter()
                    .zip(&response.tokens)
                    .enumerate()
                    .map(|(index, (logprobs, tokens))| {
                        step_probability(logprobs, tokens, markers)
                            .map(Some)
                            .ok_or_else(|| {
                                OracleFailure::scoring(format!(
                                    "no scored `{}` step tag in response {index}",
                                    markers.step_tag
                                ))
                            })
                    })
                    .collect()
            }
        }
    }
}
