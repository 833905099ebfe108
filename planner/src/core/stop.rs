//! Stop predicates applied to committed actions.

use anyhow::{Context, Result};
use regex::Regex;

/// Decides whether a committed action ends the solution.
#[derive(Debug, Clone)]
pub enum StopCondition {
    /// The trimmed action contains `token`.
    Contains { token: String, ignore_case: bool },
    /// The action matches a regular expression.
    Pattern(Regex),
}

impl StopCondition {
    pub fn contains(token: impl Into<String>) -> Self {
        StopCondition::Contains {
            token: token.into(),
            ignore_case: false,
        }
    }

    pub fn contains_ignore_case(token: impl Into<String>) -> Self {
        StopCondition::Contains {
            token: token.into().to_lowercase(),
            ignore_case: true,
        }
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).with_context(|| format!("compile stop pattern {pattern:?}"))?;
        Ok(StopCondition::Pattern(regex))
    }

    pub fn is_met(&self, action: &str) -> bool {
        match self {
            StopCondition::Contains { token, ignore_case } => {
                let action = action.trim();
                if *ignore_case {
                    action.to_lowercase().contains(token.as_str())
                } else {
                    action.contains(token.as_str())
                }
            }
            StopCondition::Pattern(regex) => regex.is_match(action),
        }
    }
}
