//! Batched and replicated planning.
//!
//! All unfinished problems advance together: one generation call and one
//! scoring call per round serve every problem still running, and problems
//! that finish early stop taking part in later requests.

use anyhow::{Result, bail};
use tracing::{info, instrument};

use crate::io::oracle::Generator;
use crate::planner::{Planner, ProblemState, RunOutcome, Solution};

impl<G: Generator + ?Sized> Planner<'_, G> {
    /// Solve every question together, one solution per question.
    ///
    /// An oracle failure fails the whole batch.
    #[instrument(skip_all, fields(problems = questions.len()))]
    pub fn solve_batch(&mut self, questions: &[String]) -> Result<RunOutcome<Vec<Solution>>> {
        self.prompts().ensure_covers(questions.len())?;
        let budget = self.config().step_budget();
        let mut problems = questions
            .iter()
            .enumerate()
            .map(|(index, question)| {
                let examples = self.prompts().examples_for(index)?;
                Ok(ProblemState::new(question.as_str(), examples, budget))
            })
            .collect::<Result<Vec<_>>>()?;
        self.run_batch(&mut problems)
    }

    /// Solve each question `samples` times independently.
    ///
    /// Every question is replicated in place (its prompt with it) and the
    /// copies run as one batch; the result holds the `samples` solutions of
    /// each question in question order.
    #[instrument(skip_all, fields(problems = questions.len(), samples = samples))]
    pub fn solve_replicated(
        &mut self,
        questions: &[String],
        samples: usize,
    ) -> Result<RunOutcome<Vec<Vec<Solution>>>> {
        if samples == 0 {
            bail!("n_generate_sample must be > 0");
        }
        self.prompts().ensure_covers(questions.len())?;
        let prompts = self.prompts().replicated(samples);
        let budget = self.config().step_budget();
        let mut problems = replicate(questions, samples)
            .into_iter()
            .enumerate()
            .map(|(index, question)| {
                let examples = prompts.examples_for(index)?;
                Ok(ProblemState::new(question, examples, budget))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(match self.run_batch(&mut problems)? {
            RunOutcome::Completed(solutions) => {
                RunOutcome::Completed(regroup(solutions, samples))
            }
            RunOutcome::Failed(failure) => RunOutcome::Failed(failure),
        })
    }

    /// Solve with the configured `n_generate_sample`.
    ///
    /// A sample count of one is a plain batch.
    pub fn solve_all(&mut self, questions: &[String]) -> Result<RunOutcome<Vec<Vec<Solution>>>> {
        match self.config().n_generate_sample {
            1 => Ok(match self.solve_batch(questions)? {
                RunOutcome::Completed(solutions) => {
                    RunOutcome::Completed(solutions.into_iter().map(|s| vec![s]).collect())
                }
                RunOutcome::Failed(failure) => RunOutcome::Failed(failure),
            }),
            samples => self.solve_replicated(questions, samples),
        }
    }

    fn run_batch(&mut self, problems: &mut [ProblemState]) -> Result<RunOutcome<Vec<Solution>>> {
        let stop = self.config().stop_condition(true)?;
        if let Some(failure) = self.run_to_completion(problems, &stop)? {
            return Ok(RunOutcome::Failed(failure));
        }
        let solutions: Vec<Solution> = problems.iter().map(ProblemState::to_solution).collect();
        info!(
            problems = solutions.len(),
            rounds = solutions.iter().map(|s| s.rounds).max().unwrap_or(0),
            "batch solved"
        );
        Ok(RunOutcome::Completed(solutions))
    }
}

fn replicate(questions: &[String], times: usize) -> Vec<String> {
    questions
        .iter()
        .flat_map(|question| std::iter::repeat_n(question.clone(), times))
        .collect()
}

fn regroup<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut groups = Vec::with_capacity(items.len() / size.max(1));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        groups.push(items.by_ref().take(size).collect());
    }
    groups
}
