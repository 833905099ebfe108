//! Oracles served by an external command speaking JSON over stdio.
//!
//! Each call spawns the configured command, writes one JSON request to its
//! stdin and reads one JSON response from its stdout. Responses are checked
//! against embedded JSON Schemas (Draft 2020-12) before deserialization so a
//! malformed backend fails loudly instead of producing empty candidates.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::io::config::CommandConfig;
use crate::io::oracle::{
    GenerationConfig, GenerationRequest, GenerationResponse, Generator, RewardOracle,
    ScoreResponse,
};
use crate::io::process::run_with_input;

const GENERATION_RESPONSE_SCHEMA: &str =
    include_str!("../../schemas/generation_response.schema.json");
const SCORE_RESPONSE_SCHEMA: &str = include_str!("../../schemas/score_response.schema.json");

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum WireRequest<'a> {
    Generate {
        requests: &'a [GenerationRequest],
        config: &'a GenerationConfig,
    },
    Score {
        prompts: &'a [String],
    },
}

/// Oracle backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandOracle {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("oracle command must be a non-empty array");
        }
        Ok(Self {
            command,
            timeout,
            output_limit_bytes,
        })
    }

    pub fn from_config(config: &CommandConfig) -> Result<Self> {
        Self::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
            config.output_limit_bytes,
        )
    }

    fn call<T: DeserializeOwned>(&self, request: &WireRequest<'_>, schema: &str) -> Result<T> {
        let payload = serde_json::to_vec(request).context("serialize oracle request")?;
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);

        let label = self.command.join(" ");
        let output = run_with_input(cmd, &payload, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run oracle command `{label}`"))?;
        output.ensure_complete(&label, self.timeout)?;

        let value: Value =
            serde_json::from_slice(&output.stdout).context("parse oracle response json")?;
        validate_schema(&value, schema)?;
        serde_json::from_value(value).context("deserialize oracle response")
    }
}

impl Generator for CommandOracle {
    #[instrument(skip_all, fields(requests = requests.len(), n = config.n))]
    fn generate_batch(
        &self,
        requests: &[GenerationRequest],
        config: &GenerationConfig,
    ) -> Result<GenerationResponse> {
        let response: GenerationResponse = self.call(
            &WireRequest::Generate { requests, config },
            GENERATION_RESPONSE_SCHEMA,
        )?;
        debug!(
            success = response.success,
            lists = response.samples.len(),
            "generation response"
        );
        Ok(response)
    }
}

impl RewardOracle for CommandOracle {
    #[instrument(skip_all, fields(prompts = prompts.len()))]
    fn score(&self, prompts: &[String]) -> Result<ScoreResponse> {
        let response: ScoreResponse =
            self.call(&WireRequest::Score { prompts }, SCORE_RESPONSE_SCHEMA)?;
        if response.logprobs.len() != prompts.len() || response.tokens.len() != prompts.len() {
            return Err(anyhow!(
                "score response covers {} logprob lists and {} token lists for {} prompts",
                response.logprobs.len(),
                response.tokens.len(),
                prompts.len()
            ));
        }
        Ok(response)
    }
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &str) -> Result<()> {
    let schema: Value = serde_json::from_str(schema).context("parse response schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile response schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!(
            "oracle response failed schema validation:\n- {}",
            messages.join("\n- ")
        );
    }
    Ok(())
}
