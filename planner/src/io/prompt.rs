//! Prompt file loading and model-input rendering.
//!
//! A prompt file is JSON with the few-shot examples under `prompt` (one
//! string shared by every problem, or one string per problem) and the system
//! message under `system_msg`. The examples and the question are rendered
//! into the model input; the committed history is rendered into the answer
//! prefix the completion continues from.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MODEL_INPUT_TEMPLATE: &str = include_str!("prompts/model_input.j2");
const ANSWER_PREFIX_TEMPLATE: &str = include_str!("prompts/answer_prefix.j2");

/// Few-shot examples, shared or per problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Examples {
    Shared(String),
    PerProblem(Vec<String>),
}

/// Contents of a prompt file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSet {
    #[serde(rename = "prompt")]
    pub examples: Examples,
    #[serde(default)]
    pub system_msg: String,
}

impl PromptSet {
    pub fn shared(examples: impl Into<String>, system_msg: impl Into<String>) -> Self {
        Self {
            examples: Examples::Shared(examples.into()),
            system_msg: system_msg.into(),
        }
    }

    /// Examples for the problem at `index`.
    pub fn examples_for(&self, index: usize) -> Result<&str> {
        match &self.examples {
            Examples::Shared(examples) => Ok(examples),
            Examples::PerProblem(list) => list.get(index).map(String::as_str).ok_or_else(|| {
                anyhow!(
                    "prompt list has {} entries, no prompt for problem {index}",
                    list.len()
                )
            }),
        }
    }

    /// Fail unless every one of `problems` has examples.
    pub fn ensure_covers(&self, problems: usize) -> Result<()> {
        if let Examples::PerProblem(list) = &self.examples
            && list.len() < problems
        {
            bail!(
                "prompt list has {} entries but there are {problems} problems",
                list.len()
            );
        }
        Ok(())
    }

    /// Repeat each per-problem entry `times` times in place, matching
    /// problems replicated the same way.
    pub fn replicated(&self, times: usize) -> Self {
        let examples = match &self.examples {
            Examples::Shared(examples) => Examples::Shared(examples.clone()),
            Examples::PerProblem(list) => Examples::PerProblem(
                list.iter()
                    .flat_map(|examples| std::iter::repeat_n(examples.clone(), times))
                    .collect(),
            ),
        };
        Self {
            examples,
            system_msg: self.system_msg.clone(),
        }
    }
}

/// Load a prompt file.
pub fn load_prompts(path: &Path) -> Result<PromptSet> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read prompts {}", path.display()))?;
    let prompts: PromptSet =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    debug!(
        per_problem = matches!(prompts.examples, Examples::PerProblem(_)),
        "loaded prompts"
    );
    Ok(prompts)
}

/// Template engine wrapper around minijinja.
pub struct PromptRenderer {
    env: Environment<'static>,
}

impl PromptRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.add_template("model_input", MODEL_INPUT_TEMPLATE)
            .context("load model input template")?;
        env.add_template("answer_prefix", ANSWER_PREFIX_TEMPLATE)
            .context("load answer prefix template")?;
        Ok(Self { env })
    }

    pub fn model_input(&self, examples: &str, question: &str) -> Result<String> {
        let template = self.env.get_template("model_input")?;
        let rendered = template.render(context! {
            examples => examples,
            question => question,
        })?;
        Ok(rendered)
    }

    pub fn answer_prefix(&self, history: &str) -> Result<String> {
        let template = self.env.get_template("answer_prefix")?;
        let rendered = template.render(context! { history => history })?;
        Ok(rendered)
    }
}
