//! Receding-horizon planning loop.
//!
//! Every round a problem asks the generator for continuations of its
//! committed prefix, scores the parsed candidates, records them in its
//! trajectory pool and commits at most one retrieved action. Single-problem
//! and batched runs share the same per-problem steps; see [`crate::batch`]
//! for the batched entry points.

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::parser::{ActionParser, ParsedAction};
use crate::core::policy::DecisionPolicy;
use crate::core::pool::{Match, TrajectoryPool, retrieve};
use crate::core::reflection::reflect;
use crate::core::solution::SolutionState;
use crate::core::stop::StopCondition;
use crate::core::types::{NoDecisionPolicy, Sample, StopReason};
use crate::io::config::PlannerConfig;
use crate::io::oracle::{
    GenerationConfig, GenerationRequest, Generator, OracleFailure, OracleKind, RewardOracle,
};
use crate::io::prompt::{PromptRenderer, PromptSet};
use crate::scoring::{Scoring, ScoringInput};

/// Result of a run: the solution(s), or the oracle failure that aborted it.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<T> {
    Completed(T),
    Failed(OracleFailure),
}

impl<T> RunOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            RunOutcome::Completed(value) => Some(value),
            RunOutcome::Failed(_) => None,
        }
    }
}

/// Final state of one problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    /// Concatenation of the committed steps.
    pub output: String,
    pub steps: Vec<String>,
    pub stop: StopReason,
    /// Generation rounds spent.
    pub rounds: usize,
}

/// Mutable state of one problem during a run.
#[derive(Debug, Clone)]
pub struct ProblemState {
    pub question: String,
    pub examples: String,
    pub solution: SolutionState,
    pub pool: TrajectoryPool,
    pub rounds: usize,
    pub finished: Option<StopReason>,
}

impl ProblemState {
    pub fn new(question: impl Into<String>, examples: impl Into<String>, budget: usize) -> Self {
        Self {
            question: question.into(),
            examples: examples.into(),
            solution: SolutionState::new(budget),
            pool: TrajectoryPool::new(),
            rounds: 0,
            finished: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Snapshot as a [`Solution`]; unfinished problems report the budget.
    pub fn to_solution(&self) -> Solution {
        Solution {
            output: self.solution.render(),
            steps: self
                .solution
                .committed()
                .into_iter()
                .map(str::to_string)
                .collect(),
            stop: self.finished.unwrap_or(StopReason::StepBudget),
            rounds: self.rounds,
        }
    }
}

/// A parsed candidate and the problem it belongs to.
struct Candidate {
    problem: usize,
    parsed: ParsedAction,
}

/// Planner bound to one generator, one scoring strategy and one prompt set.
pub struct Planner<'a, G: Generator + ?Sized> {
    generator: &'a G,
    scoring: Scoring<'a>,
    config: PlannerConfig,
    prompts: PromptSet,
    renderer: PromptRenderer,
    parser: ActionParser,
    policy: DecisionPolicy,
    rng: StdRng,
}

impl<'a, G: Generator + ?Sized> Planner<'a, G> {
    /// Build a planner; fails on invalid configuration or a missing reward oracle.
    pub fn new(
        config: PlannerConfig,
        prompts: PromptSet,
        generator: &'a G,
        reward_oracle: Option<&'a dyn RewardOracle>,
    ) -> Result<Self> {
        config.validate().context("invalid planner config")?;
        let scoring = Scoring::new(config.scoring, reward_oracle, config.reward_model.clone())?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            generator,
            scoring,
            parser: config.action_parser(),
            policy: config.decision_policy(),
            renderer: PromptRenderer::new()?,
            prompts,
            config,
            rng,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub(crate) fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    /// Solve one problem. A failed oracle call discards all progress.
    #[instrument(skip_all, fields(task = self.config.task.as_str(), budget = self.config.step_budget()))]
    pub fn solve(&mut self, question: &str) -> Result<RunOutcome<Solution>> {
        let stop = self.config.stop_condition(false)?;
        let examples = self.prompts.examples_for(0)?.to_string();
        let mut problems = vec![ProblemState::new(
            question,
            examples,
            self.config.step_budget(),
        )];

        if let Some(failure) = self.run_to_completion(&mut problems, &stop)? {
            return Ok(RunOutcome::Failed(failure));
        }
        let solution = problems[0].to_solution();
        info!(
            steps = solution.steps.len(),
            rounds = solution.rounds,
            stop = ?solution.stop,
            "problem solved"
        );
        Ok(RunOutcome::Completed(solution))
    }

    /// Run rounds until every problem has finished.
    ///
    /// Returns the oracle failure that aborted the run, if any.
    pub(crate) fn run_to_completion(
        &mut self,
        problems: &mut [ProblemState],
        stop: &StopCondition,
    ) -> Result<Option<OracleFailure>> {
        while problems.iter().any(|p| !p.is_finished()) {
            if let Err(failure) = self.round(problems, stop)? {
                warn!(%failure, "oracle failure, aborting run");
                return Ok(Some(failure));
            }
        }
        Ok(None)
    }

    /// One generation round over every unfinished problem.
    ///
    /// The outer error covers local faults (template rendering); the inner
    /// one is an oracle failure that ends the run.
    #[instrument(skip_all, fields(active = tracing::field::Empty))]
    fn round(
        &mut self,
        problems: &mut [ProblemState],
        stop: &StopCondition,
    ) -> Result<Result<(), OracleFailure>> {
        let active: Vec<usize> = (0..problems.len())
            .filter(|&i| !problems[i].is_finished())
            .collect();
        tracing::Span::current().record("active", active.len());

        let mut requests = Vec::with_capacity(active.len());
        for &index in &active {
            let problem = &mut problems[index];
            if !self.config.use_memory {
                problem.pool.clear();
            }
            requests.push(self.request_for(problem)?);
        }

        let samples = match self.generate(&requests) {
            Ok(samples) => samples,
            Err(failure) => return Ok(Err(failure)),
        };

        let mut candidates = Vec::new();
        for (&index, lists) in active.iter().zip(&samples) {
            candidates.extend(self.parse_candidates(index, &problems[index], lists.as_deref()));
        }
        if let Err(failure) = self.record_candidates(problems, &candidates) {
            return Ok(Err(failure));
        }

        let budget = self.config.step_budget();
        let match_sets: Vec<Vec<Match>> = active
            .iter()
            .map(|&index| {
                let problem = &problems[index];
                retrieve(
                    &problem.pool,
                    &problem.solution.committed(),
                    budget,
                    self.config.task,
                )
            })
            .collect();
        let decisions = self.policy.decide_each(&match_sets, &mut self.rng);
        for (&index, decision) in active.iter().zip(decisions) {
            self.settle(&mut problems[index], decision, stop);
        }
        Ok(Ok(()))
    }

    fn request_for(&self, problem: &ProblemState) -> Result<GenerationRequest> {
        let prompt = self
            .renderer
            .model_input(&problem.examples, &problem.question)?;
        let answer_prefix = self.renderer.answer_prefix(&problem.solution.render())?;
        Ok(GenerationRequest {
            system_message: self.prompts.system_msg.clone(),
            prompt,
            answer_prefix,
        })
    }

    fn generation_config(&self) -> GenerationConfig {
        self.config.generation_config()
    }

    /// Call the generator once for all requests.
    fn generate(
        &self,
        requests: &[GenerationRequest],
    ) -> Result<Vec<Option<Vec<Sample>>>, OracleFailure> {
        let config = self.generation_config();
        let response = self
            .generator
            .generate_batch(requests, &config)
            .map_err(|err| OracleFailure::from_error(OracleKind::Generation, &err))?;
        if !response.success {
            return Err(OracleFailure::generation("generator reported failure"));
        }
        if response.samples.len() != requests.len() {
            return Err(OracleFailure::generation(format!(
                "expected {} sample lists, got {}",
                requests.len(),
                response.samples.len()
            )));
        }
        Ok(response.samples)
    }

    /// Parse one problem's samples, dropping those with nothing left.
    fn parse_candidates(
        &self,
        index: usize,
        problem: &ProblemState,
        samples: Option<&[Sample]>,
    ) -> Vec<Candidate> {
        let Some(samples) = samples else {
            debug!(problem = index, "no samples for problem");
            return Vec::new();
        };
        let history = problem.solution.committed();
        let mut echo: Vec<&str> = Vec::with_capacity(history.len() + 1);
        if let Some(prefix) = self.config.parser.echo_prefix.as_deref() {
            echo.push(prefix);
        }
        echo.extend(history.iter().copied());

        let mut candidates = Vec::with_capacity(samples.len());
        for sample in samples {
            match self.parser.parse(sample, &echo) {
                Some(parsed) => candidates.push(Candidate {
                    problem: index,
                    parsed,
                }),
                None => debug!(problem = index, "sample parsed to no action"),
            }
        }
        candidates
    }

    /// Score every candidate in one call and append the survivors to their pools.
    fn record_candidates(
        &self,
        problems: &mut [ProblemState],
        candidates: &[Candidate],
    ) -> Result<(), OracleFailure> {
        let histories: Vec<Vec<String>> = candidates
            .iter()
            .map(|c| {
                problems[c.problem]
                    .solution
                    .committed()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect();
        let histories: Vec<Vec<&str>> = histories
            .iter()
            .map(|h| h.iter().map(String::as_str).collect())
            .collect();

        let rewards = {
            let inputs: Vec<ScoringInput<'_>> = candidates
                .iter()
                .zip(&histories)
                .map(|(c, history)| ScoringInput {
                    question: &problems[c.problem].question,
                    history,
                    chain: &c.parsed.chain,
                    probability: c.parsed.probability,
                })
                .collect();
            self.scoring.score(&inputs)?
        };

        for ((candidate, history), reward) in candidates.iter().zip(&histories).zip(rewards) {
            let Some(reward) = reward else {
                continue;
            };
            problems[candidate.problem]
                .pool
                .record(history, &candidate.parsed.chain, reward);
        }
        Ok(())
    }

    /// Commit one problem's decision, or apply the no-decision policy.
    fn settle(&self, problem: &mut ProblemState, decision: Option<String>, stop: &StopCondition) {
        problem.rounds += 1;
        match decision {
            Some(action) => {
                let finished = stop.is_met(&action);
                debug!(%action, round = problem.rounds, "committing action");
                problem.solution.commit(action);
                if finished {
                    problem.finished = Some(StopReason::StopToken);
                } else if problem.solution.is_full() {
                    problem.finished = Some(StopReason::SolutionFull);
                }
            }
            None => match self.config.no_decision {
                NoDecisionPolicy::Reflect => {
                    if let Some(hint) = reflect(&problem.pool, &problem.question) {
                        debug!(round = problem.rounds, "no decision, committing reflection");
                        problem.solution.commit(hint);
                        problem.finished = Some(StopReason::Reflected);
                    }
                }
                NoDecisionPolicy::Retry => {
                    debug!(round = problem.rounds, "no decision, retrying");
                }
                NoDecisionPolicy::Stop => {
                    problem.finished = Some(StopReason::NoDecision);
                }
            },
        }

        if problem.finished.is_none() && problem.rounds >= self.config.step_budget() {
            problem.finished = Some(StopReason::StepBudget);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ScoredText, ScoringMode, Task};
    use crate::test_support::{ScriptedGenerator, ScriptedRewardOracle};

    fn config() -> PlannerConfig {
        PlannerConfig {
            do_sample: false,
            step_budget: Some(4),
            seed: Some(7),
            ..PlannerConfig::default()
        }
    }

    fn prompts() -> PromptSet {
        PromptSet::shared("Q: 1+1?\nA: 2.", "You are careful.")
    }

    #[test]
    fn commits_first_candidate_each_round_until_stop_token() {
        let generator = ScriptedGenerator::new(|request| {
            let next = if request.answer_prefix.contains("two.") {
                " The answer is 3."
            } else if request.answer_prefix.contains("one.") {
                " two."
            } else {
                "one."
            };
            Some(vec![next.into()])
        });
        let oracle = ScriptedRewardOracle::constant(1.0);
        let mut planner = Planner::new(config(), prompts(), &generator, Some(&oracle)).expect("new");

        let solution = planner
            .solve("Count.")
            .expect("solve")
            .completed()
            .expect("completed");
        assert_eq!(solution.steps, vec!["one.", " two.", " The answer is 3."]);
        assert_eq!(solution.output, "one. two. The answer is 3.");
        assert_eq!(solution.stop, StopReason::StopToken);
        assert_eq!(solution.rounds, 3);

        let calls = generator.calls();
        assert_eq!(calls[0][0].answer_prefix, "A: ");
        assert_eq!(calls[1][0].answer_prefix, "A: one.");
        assert_eq!(calls[0][0].system_message, "You are careful.");
        assert!(calls[0][0].prompt.ends_with("Q: Count.\n"));
    }

    #[test]
    fn low_rewards_reflect_once_something_was_tried() {
        let generator = ScriptedGenerator::constant(&["a.", "b."]);
        let oracle = ScriptedRewardOracle::constant(0.1);
        let mut planner = Planner::new(config(), prompts(), &generator, Some(&oracle)).expect("new");

        let solution = planner
            .solve("q?")
            .expect("solve")
            .completed()
            .expect("completed");
        assert_eq!(solution.stop, StopReason::Reflected);
        assert_eq!(solution.rounds, 1);
        assert_eq!(
            solution.output,
            "    # I have generated a.,b., but none of them are correct. I need to revise them to solve the problem q?."
        );
    }

    #[test]
    fn retry_policy_spends_the_budget() {
        let generator = ScriptedGenerator::constant(&["a."]);
        let oracle = ScriptedRewardOracle::constant(0.1);
        let cfg = PlannerConfig {
            no_decision: NoDecisionPolicy::Retry,
            ..config()
        };
        let mut planner = Planner::new(cfg, prompts(), &generator, Some(&oracle)).expect("new");

        let solution = planner
            .solve("q")
            .expect("solve")
            .completed()
            .expect("completed");
        assert_eq!(solution.stop, StopReason::StepBudget);
        assert_eq!(solution.rounds, 4);
        assert!(solution.steps.is_empty());
        assert_eq!(generator.calls().len(), 4);
    }

    #[test]
    fn stop_policy_ends_without_output() {
        let generator = ScriptedGenerator::constant(&["a."]);
        let oracle = ScriptedRewardOracle::constant(0.1);
        let cfg = PlannerConfig {
            no_decision: NoDecisionPolicy::Stop,
            ..config()
        };
        let mut planner = Planner::new(cfg, prompts(), &generator, Some(&oracle)).expect("new");

        let solution = planner
            .solve("q")
            .expect("solve")
            .completed()
            .expect("completed");
        assert_eq!(solution.stop, StopReason::NoDecision);
        assert_eq!(solution.output, "");
    }

    #[test]
    fn blank_samples_leave_nothing_to_reflect_on() {
        let generator = ScriptedGenerator::constant(&["   ", "A:"]);
        let oracle = ScriptedRewardOracle::constant(1.0);
        let cfg = PlannerConfig {
            parser: crate::io::config::ParserConfig {
                echo_prefix: Some("A:".to_string()),
            },
            ..config()
        };
        let mut planner = Planner::new(cfg, prompts(), &generator, Some(&oracle)).expect("new");

        let solution = planner
            .solve("q")
            .expect("solve")
            .completed()
            .expect("completed");
        assert_eq!(solution.stop, StopReason::StepBudget);
        assert!(oracle.calls().is_empty());
    }

    #[test]
    fn likelihood_mode_requests_logprobs_and_needs_no_oracle() {
        let generator = ScriptedGenerator::new(|request| {
            let text = if request.answer_prefix == "A: " {
                "x = 2."
            } else {
                " y = 3."
            };
            Some(vec![Sample::Scored(ScoredText {
                text: text.to_string(),
                tokens: vec![text.to_string()],
                logprobs: vec![-0.1],
            })])
        });
        let cfg = PlannerConfig {
            scoring: ScoringMode::Logp,
            reward_threshold: 0.5,
            step_budget: Some(2),
            ..config()
        };
        let mut planner = Planner::new(cfg, prompts(), &generator, None).expect("new");
        let solution = planner
            .solve("q")
            .expect("solve")
            .completed()
            .expect("completed");
        assert_eq!(solution.steps, vec!["x = 2.", " y = 3."]);
        assert_eq!(solution.stop, StopReason::SolutionFull);
    }

    #[test]
    fn reward_mode_without_oracle_is_rejected() {
        let generator = ScriptedGenerator::constant(&["a."]);
        assert!(Planner::new(config(), prompts(), &generator, None).is_err());
    }

    #[test]
    fn math_task_never_commits_code_fences() {
        let generator = ScriptedGenerator::constant(&["```python."]);
        let oracle = ScriptedRewardOracle::constant(1.0);
        let cfg = PlannerConfig {
            task: Task::Math,
            no_decision: NoDecisionPolicy::Retry,
            ..config()
        };
        let mut planner = Planner::new(cfg, prompts(), &generator, Some(&oracle)).expect("new");
        let solution = planner
            .solve("q")
            .expect("solve")
            .completed()
            .expect("completed");
        assert!(solution.steps.is_empty());
    }

    #[test]
    fn generator_failure_mid_run_discards_progress() {
        let generator = ScriptedGenerator::constant(&["a."]).failing_from(1);
        let oracle = ScriptedRewardOracle::constant(1.0);
        let mut planner = Planner::new(config(), prompts(), &generator, Some(&oracle)).expect("new");
        match planner.solve("q").expect("solve") {
            RunOutcome::Failed(failure) => assert_eq!(failure.oracle, OracleKind::Generation),
            RunOutcome::Completed(solution) => panic!("unexpected solution {solution:?}"),
        }
    }

    #[test]
    fn forgetful_planner_clears_the_pool_every_round() {
        let generator = ScriptedGenerator::new(|request| {
            let step = format!(" step{}.", request.answer_prefix.len());
            Some(vec![Sample::from(step.as_str())])
        });
        let oracle = ScriptedRewardOracle::constant(1.0);
        let cfg = PlannerConfig {
            use_memory: false,
            ..config()
        };
        let mut planner = Planner::new(cfg, prompts(), &generator, Some(&oracle)).expect("new");
        let stop = planner.config().stop_condition(false).expect("stop");
        let mut problems = vec![ProblemState::new("q", "ex", 4)];
        for _ in 0..3 {
            planner
                .round(&mut problems, &stop)
                .expect("round")
                .expect("oracles");
            assert_eq!(problems[0].pool.len(), 1);
        }
    }
}
