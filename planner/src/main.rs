//! Receding-horizon step planner CLI.
//!
//! Drives an external generation oracle (and, in reward mode, a reward
//! oracle) to solve one problem or a file of problems step by step. Results
//! go to stdout; diagnostics go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use planner::core::types::ScoringMode;
use planner::exit_codes;
use planner::io::command::CommandOracle;
use planner::io::config::{PlannerConfig, load_config, write_config};
use planner::io::oracle::{OracleFailure, RewardOracle};
use planner::io::problems::load_problems;
use planner::io::prompt::load_prompts;
use planner::logging;
use planner::planner::{Planner, RunOutcome, Solution};
use serde::Serialize;

const DEFAULT_CONFIG: &str = "planner.toml";

#[derive(Parser)]
#[command(
    name = "planner",
    version,
    about = "Receding-horizon step planner for language-model problem solving"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Solve a single question and print the solution.
    Solve {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Prompt file (`{"prompt": ..., "system_msg": ...}`).
        #[arg(long)]
        prompts: PathBuf,
        #[arg(long)]
        question: String,
        /// Override the configured sampling seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Solve every question of a JSONL file and print one JSON line per question.
    Batch {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        #[arg(long)]
        prompts: PathBuf,
        /// Problems file, one `{"question": ...}` object per line.
        #[arg(long)]
        problems: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Serialize)]
struct BatchLine<'a> {
    question: &'a str,
    solutions: &'a [Solution],
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Solve {
            config,
            prompts,
            question,
            seed,
        } => cmd_solve(&config, &prompts, &question, seed),
        Command::Batch {
            config,
            prompts,
            problems,
            seed,
        } => cmd_batch(&config, &prompts, &problems, seed),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &PlannerConfig::default())?;
    Ok(exit_codes::OK)
}

fn cmd_solve(config: &Path, prompts: &Path, question: &str, seed: Option<u64>) -> Result<i32> {
    let cfg = load_with_seed(config, seed)?;
    let prompts = load_prompts(prompts)?;
    let (generator, scorer) = build_oracles(&cfg)?;
    let mut planner = Planner::new(cfg, prompts, &generator, reward_oracle(scorer.as_ref()))?;

    match planner.solve(question)? {
        RunOutcome::Completed(solution) => {
            println!("{}", solution.output);
            Ok(exit_codes::OK)
        }
        RunOutcome::Failed(failure) => Ok(report_failure(&failure)),
    }
}

fn cmd_batch(config: &Path, prompts: &Path, problems: &Path, seed: Option<u64>) -> Result<i32> {
    let cfg = load_with_seed(config, seed)?;
    let prompts = load_prompts(prompts)?;
    let questions = load_problems(problems)?;
    let (generator, scorer) = build_oracles(&cfg)?;
    let mut planner = Planner::new(cfg, prompts, &generator, reward_oracle(scorer.as_ref()))?;

    match planner.solve_all(&questions)? {
        RunOutcome::Completed(groups) => {
            for (question, solutions) in questions.iter().zip(&groups) {
                let line = serde_json::to_string(&BatchLine {
                    question,
                    solutions,
                })
                .context("serialize batch result")?;
                println!("{line}");
            }
            Ok(exit_codes::OK)
        }
        RunOutcome::Failed(failure) => Ok(report_failure(&failure)),
    }
}

fn load_with_seed(path: &Path, seed: Option<u64>) -> Result<PlannerConfig> {
    let mut cfg = load_config(path)?;
    if seed.is_some() {
        cfg.seed = seed;
    }
    Ok(cfg)
}

fn build_oracles(cfg: &PlannerConfig) -> Result<(CommandOracle, Option<CommandOracle>)> {
    let generator = CommandOracle::from_config(&cfg.generator).context("generator oracle")?;
    let scorer = match cfg.scoring {
        ScoringMode::Reward => {
            Some(CommandOracle::from_config(&cfg.scorer).context("scorer oracle")?)
        }
        ScoringMode::Logp => None,
    };
    Ok((generator, scorer))
}

fn reward_oracle(scorer: Option<&CommandOracle>) -> Option<&dyn RewardOracle> {
    scorer.map(|oracle| oracle as &dyn RewardOracle)
}

fn report_failure(failure: &OracleFailure) -> i32 {
    eprintln!("{failure}");
    exit_codes::ORACLE_FAILED
}
