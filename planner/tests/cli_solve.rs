//! CLI tests for `planner init`, `planner solve` and `planner batch`.
//!
//! Spawns the planner binary against shell-script oracles and verifies
//! stdout and exit codes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use planner::exit_codes;
use planner::io::config::{CommandConfig, PlannerConfig, write_config};

const ANSWER: &str = r#"{"success":true,"samples":[[" The answer is 4."]]}"#;
const TWO_ANSWERS: &str =
    r#"{"success":true,"samples":[[" The answer is 4."],[" The answer is 6."]]}"#;
const ONE_SCORE: &str = r#"{"logprobs":[[[],[{"token":"+","logprob":-0.01},{"token":"-","logprob":-5.0}]]],"tokens":[[" ки","+"]]}"#;
const TWO_SCORES: &str = r#"{"logprobs":[[[],[{"token":"+","logprob":-0.01},{"token":"-","logprob":-5.0}]],[[],[{"token":"+","logprob":-0.01},{"token":"-","logprob":-5.0}]]],"tokens":[[" ки","+"],[" ки","+"]]}"#;

fn replying(body: &str) -> CommandConfig {
    CommandConfig {
        command: vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cat >/dev/null; printf '%s' '{body}'"),
        ],
        timeout_secs: 10,
        output_limit_bytes: 100_000,
    }
}

struct Workspace {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new(generator: CommandConfig, scorer: CommandConfig) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().to_path_buf();
        let cfg = PlannerConfig {
            do_sample: false,
            reward_threshold: 0.5,
            n_generate_sample: 1,
            step_budget: Some(3),
            generator,
            scorer,
            ..PlannerConfig::default()
        };
        write_config(&root.join("planner.toml"), &cfg).expect("write config");
        fs::write(
            root.join("prompts.json"),
            r#"{"prompt":"Q: 1+1?\nA: The answer is 2.","system_msg":"Solve it."}"#,
        )
        .expect("write prompts");
        Self { _temp: temp, root }
    }

    fn path(&self) -> &Path {
        &self.root
    }

    fn planner(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_planner"))
            .current_dir(&self.root)
            .args(args)
            .output()
            .expect("run planner")
    }
}

#[test]
fn solve_prints_the_committed_solution() {
    let ws = Workspace::new(replying(ANSWER), replying(ONE_SCORE));
    let output = ws.planner(&["solve", "--prompts", "prompts.json", "--question", "2+2?"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "The answer is 4."
    );
}

#[test]
fn generator_failure_exits_with_oracle_code() {
    let failing = CommandConfig {
        command: vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat >/dev/null; echo backend down >&2; exit 1".to_string(),
        ],
        ..replying(ANSWER)
    };
    let ws = Workspace::new(failing, replying(ONE_SCORE));
    let output = ws.planner(&["solve", "--prompts", "prompts.json", "--question", "2+2?"]);

    assert_eq!(output.status.code(), Some(exit_codes::ORACLE_FAILED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("generation oracle failed"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn malformed_generator_response_exits_with_oracle_code() {
    let ws = Workspace::new(replying(r#"{"samples":"nope"}"#), replying(ONE_SCORE));
    let output = ws.planner(&["solve", "--prompts", "prompts.json", "--question", "2+2?"]);
    assert_eq!(output.status.code(), Some(exit_codes::ORACLE_FAILED));
}

#[test]
fn batch_prints_one_json_line_per_question() {
    let ws = Workspace::new(replying(TWO_ANSWERS), replying(TWO_SCORES));
    fs::write(
        ws.path().join("problems.jsonl"),
        "{\"question\":\"2+2?\"}\n{\"question\":\"3+3?\"}\n",
    )
    .expect("write problems");

    let output = ws.planner(&[
        "batch",
        "--prompts",
        "prompts.json",
        "--problems",
        "problems.jsonl",
        "--seed",
        "3",
    ]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["question"], "2+2?");
    assert_eq!(lines[0]["solutions"][0]["output"], " The answer is 4.");
    assert_eq!(lines[1]["solutions"][0]["output"], " The answer is 6.");
    assert_eq!(lines[1]["solutions"][0]["stop"], "stop_token");
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = |args: &[&str]| {
        Command::new(env!("CARGO_BIN_EXE_planner"))
            .current_dir(temp.path())
            .args(args)
            .status()
            .expect("planner init")
    };

    assert_eq!(run(&["init"]).code(), Some(exit_codes::OK));
    let written = fs::read_to_string(temp.path().join("planner.toml")).expect("config");
    assert!(written.contains("beam_size = 8"));

    assert_eq!(run(&["init"]).code(), Some(exit_codes::INVALID));
    assert_eq!(run(&["init", "--force"]).code(), Some(exit_codes::OK));
}

#[test]
fn missing_prompt_file_is_invalid_input() {
    let ws = Workspace::new(replying(ANSWER), replying(ONE_SCORE));
    let output = ws.planner(&["solve", "--prompts", "absent.json", "--question", "q"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}
