//! Planner configuration stored as TOML (default `planner.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::parser::ActionParser;
use crate::core::policy::{DecisionPolicy, Selection};
use crate::core::reward::StepMarkers;
use crate::core::stop::StopCondition;
use crate::core::types::{NoDecisionPolicy, ScoringMode, Task};
use crate::io::oracle::GenerationConfig;

/// Planner configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Problem family; selects the default step budget and candidate filtering.
    pub task: Task,

    /// How candidates are rewarded: `reward` (process reward model) or `logp`.
    pub scoring: ScoringMode,

    /// Override for the task's step budget (slots and rounds per problem).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_budget: Option<usize>,

    /// Character that terminates one action.
    pub delimiter: char,

    /// Actions kept per generation, the committed one included.
    pub lookahead_thought_length: usize,

    /// When set, truncate each generation to this many tokens instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookahead_token_length: Option<usize>,

    /// Minimum reward a retrieved action needs to be committed.
    pub reward_threshold: f64,

    /// Samples requested per problem per round.
    pub beam_size: usize,

    /// Generation temperature.
    pub beam_temperature: f64,

    /// Softmax temperature when sampling among retrieved actions.
    pub select_temperature: f64,

    /// Sample among retrieved actions (`true`) or take the best (`false`).
    pub do_sample: bool,

    /// Independent solutions per problem in batch runs.
    pub n_generate_sample: usize,

    /// Keep pool entries across rounds.
    pub use_memory: bool,

    pub max_tokens: usize,
    pub top_p: f64,
    pub stop_sequences: Vec<String>,

    /// Seed for action sampling; entropy when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// What to do after a round without a decision.
    pub no_decision: NoDecisionPolicy,

    pub stop: StopConfig,
    pub parser: ParserConfig,
    pub reward_model: StepMarkers,

    /// A partial table keeps the defaults of the fields it leaves out.
    #[serde(deserialize_with = "generator_section")]
    pub generator: CommandConfig,
    #[serde(deserialize_with = "scorer_section")]
    pub scorer: CommandConfig,
}

/// When a committed action finishes the solution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StopConfig {
    /// Substring that ends the solution.
    pub suffix: String,

    /// Compare case-insensitively. Unset means sensitive for single runs and
    /// insensitive for batch runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,

    /// Regular expression used instead of `suffix` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            suffix: "The answer is".to_string(),
            case_insensitive: None,
            pattern: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParserConfig {
    /// Text the generator may echo before its continuation (e.g. `"A:"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo_prefix: Option<String>,
}

/// External command serving an oracle over JSON stdio.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandConfig {
    pub command: Vec<String>,

    /// Wall-clock budget per call in seconds.
    pub timeout_secs: u64,

    /// Reject responses larger than this many bytes.
    pub output_limit_bytes: usize,
}

impl CommandConfig {
    fn oracle(subcommand: &str) -> Self {
        Self {
            command: vec!["planner-oracle".to_string(), subcommand.to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 64 * 1024 * 1024,
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(anyhow!("{section}.command must be a non-empty array"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("{section}.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("{section}.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Fields of a `[generator]` or `[scorer]` table, each optional.
#[derive(Deserialize)]
struct CommandSection {
    command: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    output_limit_bytes: Option<usize>,
}

impl CommandSection {
    fn over(self, base: CommandConfig) -> CommandConfig {
        CommandConfig {
            command: self.command.unwrap_or(base.command),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
            output_limit_bytes: self.output_limit_bytes.unwrap_or(base.output_limit_bytes),
        }
    }
}

fn generator_section<'de, D>(deserializer: D) -> Result<CommandConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let section = CommandSection::deserialize(deserializer)?;
    Ok(section.over(CommandConfig::oracle("generate")))
}

fn scorer_section<'de, D>(deserializer: D) -> Result<CommandConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let section = CommandSection::deserialize(deserializer)?;
    Ok(section.over(CommandConfig::oracle("score")))
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            task: Task::Gsm8k,
            scoring: ScoringMode::Reward,
            step_budget: None,
            delimiter: '.',
            lookahead_thought_length: 3,
            lookahead_token_length: None,
            reward_threshold: 1.0,
            beam_size: 8,
            beam_temperature: 0.7,
            select_temperature: 0.1,
            do_sample: true,
            n_generate_sample: 8,
            use_memory: true,
            max_tokens: 500,
            top_p: 1.0,
            stop_sequences: Vec::new(),
            seed: None,
            no_decision: NoDecisionPolicy::Reflect,
            stop: StopConfig::default(),
            parser: ParserConfig::default(),
            reward_model: StepMarkers::default(),
            generator: CommandConfig::oracle("generate"),
            scorer: CommandConfig::oracle("score"),
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.step_budget == Some(0) {
            return Err(anyhow!("step_budget must be > 0"));
        }
        if self.delimiter.is_whitespace() {
            return Err(anyhow!("delimiter must not be whitespace"));
        }
        if self.lookahead_thought_length == 0 {
            return Err(anyhow!("lookahead_thought_length must be > 0"));
        }
        if self.lookahead_token_length == Some(0) {
            return Err(anyhow!("lookahead_token_length must be > 0"));
        }
        if !self.reward_threshold.is_finite() {
            return Err(anyhow!("reward_threshold must be finite"));
        }
        if self.beam_size == 0 {
            return Err(anyhow!("beam_size must be > 0"));
        }
        if !(self.beam_temperature > 0.0 && self.beam_temperature.is_finite()) {
            return Err(anyhow!("beam_temperature must be > 0"));
        }
        if self.do_sample && !(self.select_temperature > 0.0 && self.select_temperature.is_finite())
        {
            return Err(anyhow!("select_temperature must be > 0 when do_sample is set"));
        }
        if self.n_generate_sample == 0 {
            return Err(anyhow!("n_generate_sample must be > 0"));
        }
        if self.max_tokens == 0 {
            return Err(anyhow!("max_tokens must be > 0"));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(anyhow!("top_p must be in (0, 1]"));
        }
        if self.stop.pattern.is_none() && self.stop.suffix.is_empty() {
            return Err(anyhow!("stop.suffix must be non-empty when stop.pattern is unset"));
        }
        if let Some(pattern) = &self.stop.pattern {
            StopCondition::pattern(pattern)?;
        }
        let markers = &self.reward_model;
        if markers.good.is_empty() || markers.bad.is_empty() || markers.step_tag.is_empty() {
            return Err(anyhow!("reward_model markers must be non-empty"));
        }
        self.generator.validate("generator")?;
        if self.scoring == ScoringMode::Reward {
            self.scorer.validate("scorer")?;
        }
        Ok(())
    }

    /// Slots per solution and rounds per problem.
    pub fn step_budget(&self) -> usize {
        self.step_budget.unwrap_or_else(|| self.task.step_budget())
    }

    /// Stop condition for single (`batched = false`) or batch runs.
    pub fn stop_condition(&self, batched: bool) -> Result<StopCondition> {
        if let Some(pattern) = &self.stop.pattern {
            return StopCondition::pattern(pattern);
        }
        let token = self.stop.suffix.clone();
        if self.stop.case_insensitive.unwrap_or(batched) {
            Ok(StopCondition::contains_ignore_case(token))
        } else {
            Ok(StopCondition::contains(token))
        }
    }

    pub fn action_parser(&self) -> ActionParser {
        ActionParser::new(
            self.delimiter,
            self.lookahead_thought_length,
            self.lookahead_token_length,
        )
    }

    pub fn decision_policy(&self) -> DecisionPolicy {
        let selection = if self.do_sample {
            Selection::Sample {
                temperature: self.select_temperature,
            }
        } else {
            Selection::Greedy
        };
        DecisionPolicy::new(self.reward_threshold, selection)
    }

    /// Sampling parameters for one generation round.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            n: self.beam_size,
            stop: self.stop_sequences.clone(),
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            temperature: self.beam_temperature,
            do_sample: true,
            logprobs: self.scoring.wants_logprobs(),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlannerConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlannerConfig> {
    if !path.exists() {
        let cfg = PlannerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlannerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlannerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
