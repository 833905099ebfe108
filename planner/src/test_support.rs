//! Scripted oracles for tests.
//!
//! Both oracles record every call so tests can assert on what the planner
//! asked for, and neither spawns processes.

use std::cell::RefCell;

use anyhow::{Result, anyhow};

use crate::core::types::{Sample, TokenLogprob};
use crate::io::oracle::{
    GenerationConfig, GenerationRequest, GenerationResponse, Generator, RewardOracle,
    ScoreResponse,
};

type Respond = Box<dyn Fn(&GenerationRequest) -> Option<Vec<Sample>>>;

/// Generator answering each request through a closure.
pub struct ScriptedGenerator {
    respond: Respond,
    fail_from_call: Option<usize>,
    report_failure: bool,
    calls: RefCell<Vec<Vec<GenerationRequest>>>,
}

impl ScriptedGenerator {
    pub fn new(respond: impl Fn(&GenerationRequest) -> Option<Vec<Sample>> + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            fail_from_call: None,
            report_failure: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Answer every request with the same plain-text samples.
    pub fn constant(samples: &[&str]) -> Self {
        let samples: Vec<Sample> = samples.iter().map(|s| Sample::from(*s)).collect();
        Self::new(move |_| Some(samples.clone()))
    }

    /// Return a transport error from the zero-based call `call` onwards.
    pub fn failing_from(mut self, call: usize) -> Self {
        self.fail_from_call = Some(call);
        self
    }

    /// Answer with `success = false` instead of a transport error.
    pub fn reporting_failure(mut self) -> Self {
        self.report_failure = true;
        self
    }

    /// Requests of every call so far.
    pub fn calls(&self) -> Vec<Vec<GenerationRequest>> {
        self.calls.borrow().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate_batch(
        &self,
        requests: &[GenerationRequest],
        _config: &GenerationConfig,
    ) -> Result<GenerationResponse> {
        let call = {
            let mut calls = self.calls.borrow_mut();
            calls.push(requests.to_vec());
            calls.len() - 1
        };
        if self.fail_from_call.is_some_and(|from| call >= from) {
            if self.report_failure {
                return Ok(GenerationResponse {
                    success: false,
                    samples: Vec::new(),
                });
            }
            return Err(anyhow!("scripted generation failure on call {call}"));
        }
        Ok(GenerationResponse {
            success: true,
            samples: requests.iter().map(|r| (self.respond)(r)).collect(),
        })
    }
}

type Judge = Box<dyn Fn(&str) -> Option<f64>>;

/// Reward oracle scoring each prompt through a closure.
///
/// The closure returns the good-marker probability, or `None` for a
/// response without any step tag.
pub struct ScriptedRewardOracle {
    judge: Judge,
    calls: RefCell<Vec<Vec<String>>>,
}

impl ScriptedRewardOracle {
    pub fn new(judge: impl Fn(&str) -> Option<f64> + 'static) -> Self {
        Self {
            judge: Box::new(judge),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn constant(reward: f64) -> Self {
        Self::new(move |_| Some(reward))
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl RewardOracle for ScriptedRewardOracle {
    fn score(&self, prompts: &[String]) -> Result<ScoreResponse> {
        self.calls.borrow_mut().push(prompts.to_vec());
        let mut response = ScoreResponse::default();
        for prompt in prompts {
            match (self.judge)(prompt) {
                Some(p) => {
                    response
                        .tokens
                        .push(vec!["Step".to_string(), " ки".to_string(), "+".to_string()]);
                    response.logprobs.push(vec![
                        Vec::new(),
                        Vec::new(),
                        vec![
                            TokenLogprob {
                                token: "+".to_string(),
                                logprob: p.ln(),
                            },
                            TokenLogprob {
                                token: "-".to_string(),
                                logprob: (1.0 - p).ln(),
                            },
                        ],
                    ]);
                }
                None => {
                    response.tokens.push(vec!["Step".to_string()]);
                    response.logprobs.push(vec![Vec::new()]);
                }
            }
        }
        Ok(response)
    }
}

