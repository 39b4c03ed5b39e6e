//! Self-verifying code generation loop.
//!
//! `codeloop run` turns a problem description into tests and code, debugging
//! until every test passes. `codeloop verify` checks an existing candidate
//! against a test file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use codeloop::agents::{
    Collaborators, FailureReporter, LlmCodeGenerator, LlmDebugger, LlmTestGenerator,
};
use codeloop::core::types::{TestCase, VerificationReport};
use codeloop::exit_codes;
use codeloop::io::agent::CommandBackend;
use codeloop::io::config::{CONFIG_FILE, LoopConfig, load_config, write_config};
use codeloop::io::export::write_outcome;
use codeloop::logging;
use codeloop::looping::{LoopEvent, RunRequest, run_verification_loop};
use codeloop::sandbox::Sandbox;
use codeloop::verify::{SandboxVerifier, Verifier};

#[derive(Parser)]
#[command(
    name = "codeloop",
    version,
    about = "Generate code and keep fixing it until it passes its own tests"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate tests and code for a problem, debugging until the tests pass.
    Run {
        /// Problem description.
        #[arg(required_unless_present = "problem_file")]
        problem: Option<String>,
        /// Read the problem description from a file.
        #[arg(long, value_name = "PATH", conflicts_with = "problem")]
        problem_file: Option<PathBuf>,
        /// Number of test cases to request.
        #[arg(long)]
        tests: Option<usize>,
        /// Maximum number of generation attempts.
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Name of the function under test.
        #[arg(long)]
        function: Option<String>,
        #[arg(long, default_value = CONFIG_FILE)]
        config: PathBuf,
        /// Write tests, attempts and the result to this directory.
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Verify a candidate source file against a JSON test file.
    Verify {
        candidate: PathBuf,
        tests: PathBuf,
        /// Name of the function under test.
        #[arg(long)]
        function: Option<String>,
        #[arg(long, default_value = CONFIG_FILE)]
        config: PathBuf,
        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = CONFIG_FILE)]
        config: PathBuf,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run {
            problem,
            problem_file,
            tests,
            max_attempts,
            function,
            config,
            out,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(tests) = tests {
                cfg.test_count = tests;
            }
            if let Some(max_attempts) = max_attempts {
                cfg.max_attempts = max_attempts;
            }
            if function.is_some() {
                cfg.sandbox.target_function = function;
            }
            cfg.validate()?;
            let problem = match (problem, problem_file) {
                (Some(text), _) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("read problem {}", path.display()))?,
                (None, None) => bail!("a problem description is required"),
            };
            cmd_run(&cfg, problem, out.as_deref())
        }
        Command::Verify {
            candidate,
            tests,
            function,
            config,
            json,
        } => {
            let mut cfg = load_config(&config)?;
            if function.is_some() {
                cfg.sandbox.target_function = function;
            }
            cfg.validate()?;
            cmd_verify(&cfg, &candidate, &tests, json)
        }
        Command::Init { force, config } => cmd_init(&config, force),
    }
}

fn cmd_run(cfg: &LoopConfig, problem: String, out: Option<&Path>) -> Result<i32> {
    let backend = CommandBackend::from_settings(&cfg.agent);
    let budget = cfg.agent.prompt_budget_bytes;
    let tests = LlmTestGenerator::new(backend.clone(), budget)?;
    let coder = LlmCodeGenerator::new(backend.clone(), budget);
    let debugger = LlmDebugger::new(backend, budget);
    let reporter = FailureReporter;
    let verifier = SandboxVerifier::new(Sandbox::new(cfg.sandbox_config()));

    let request = RunRequest {
        problem,
        test_count: cfg.test_count,
        max_attempts: cfg.max_attempts,
    };
    let collaborators = Collaborators {
        tests: &tests,
        coder: &coder,
        debugger: &debugger,
        reporter: &reporter,
    };
    let outcome = run_verification_loop(&request, collaborators, &verifier, print_event)?;

    if let Some(out) = out {
        write_outcome(out, &outcome)?;
    }
    match (&outcome.final_code, &outcome.failure_report) {
        (Some(code), _) if outcome.success => {
            println!("{}", code.trim_end());
            Ok(exit_codes::OK)
        }
        (_, Some(report)) => {
            println!("{}", report.trim_end());
            Ok(exit_codes::FAILED)
        }
        _ => Ok(exit_codes::FAILED),
    }
}

fn cmd_verify(cfg: &LoopConfig, candidate: &Path, tests: &Path, json: bool) -> Result<i32> {
    let code = fs::read_to_string(candidate)
        .with_context(|| format!("read candidate {}", candidate.display()))?;
    let cases = read_test_cases(tests)?;

    let verifier = SandboxVerifier::new(Sandbox::new(cfg.sandbox_config()));
    let report = verifier.verify(&code, &cases);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    } else {
        print_report(&report);
    }
    Ok(if report.passed {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &LoopConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn read_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read tests {}", path.display()))?;
    let cases: Vec<TestCase> =
        serde_json::from_str(&raw).with_context(|| format!("parse tests {}", path.display()))?;
    if cases.is_empty() {
        bail!("{} contains no test cases", path.display());
    }
    Ok(cases)
}

fn print_report(report: &VerificationReport) {
    if report.passed {
        println!("PASS: all {} tests passed", report.test_results.len());
    } else {
        println!("FAIL: {}", report.error_msg);
    }
}

fn print_event(event: &LoopEvent<'_>) {
    match event {
        LoopEvent::TestsReady { cases } => eprintln!("generated {} test cases", cases.len()),
        LoopEvent::AttemptStarted {
            index,
            max_attempts,
        } => eprintln!("attempt {index}/{max_attempts}"),
        LoopEvent::CandidateGenerated { .. } => {}
        LoopEvent::GenerationFailed { detail, .. } => eprintln!("  generation failed: {detail}"),
        LoopEvent::Verified { report, .. } => {
            let (pass, fail, error) = report.tally();
            match &report.fault {
                Some(fault) => eprintln!("  {}", fault.describe()),
                None if report.passed => eprintln!("  all {pass} tests passed"),
                None => eprintln!("  {pass} passed, {fail} failed, {error} errors"),
            }
        }
        LoopEvent::FeedbackReady { feedback, error, .. } => match (feedback, error) {
            (Some(_), _) => eprintln!("  debugger feedback received"),
            (None, Some(error)) => eprintln!("  debugger failed: {error}"),
            (None, None) => {}
        },
        LoopEvent::Finished { success, attempts } => {
            let verdict = if *success { "succeeded" } else { "exhausted" };
            eprintln!("run {verdict} after {attempts} attempt(s)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["codeloop", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false, .. }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["codeloop", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "codeloop",
            "run",
            "Add two numbers",
            "--tests",
            "4",
            "--max-attempts",
            "2",
            "--out",
            "artifacts",
        ]);
        match cli.command {
            Command::Run {
                problem,
                tests,
                max_attempts,
                out,
                config,
                ..
            } => {
                assert_eq!(problem.as_deref(), Some("Add two numbers"));
                assert_eq!(tests, Some(4));
                assert_eq!(max_attempts, Some(2));
                assert_eq!(out, Some(PathBuf::from("artifacts")));
                assert_eq!(config, PathBuf::from(CONFIG_FILE));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_a_problem() {
        assert!(Cli::try_parse_from(["codeloop", "run"]).is_err());
        assert!(Cli::try_parse_from(["codeloop", "run", "--problem-file", "p.md"]).is_ok());
    }

    #[test]
    fn parse_verify() {
        let cli = Cli::parse_from(["codeloop", "verify", "sol.py", "tests.json", "--json"]);
        assert!(matches!(cli.command, Command::Verify { json: true, .. }));
    }
}
