//! Problem files: JSON Lines with one `{"question": ...}` object per line.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ProblemLine {
    question: String,
}

/// Load the questions of a problems file, in file order.
///
/// Blank lines are skipped; extra fields on a line are ignored.
pub fn load_problems(path: &Path) -> Result<Vec<String>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read problems {}", path.display()))?;
    let mut questions = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let problem: ProblemLine = serde_json::from_str(line)
            .with_context(|| format!("parse {} line {}", path.display(), index + 1))?;
        questions.push(problem.question);
    }
    if questions.is_empty() {
        bail!("no problems in {}", path.display());
    }
    Ok(questions)
}
