//! Test-only helpers: scripted collaborators, a fake verifier and fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::agents::{CodeGenerator, DebugRequest, Debugger, ReportRequest, Reporter, TestGenerator};
use crate::core::fault::Fault;
use crate::core::report::{build_report, fault_report};
use crate::core::types::{Category, TestCase, TestResult, TestStatus, VerificationReport};
use crate::io::agent::{AgentBackend, AgentRequest};
use crate::verify::Verifier;

/// A happy-path case with a generated description.
pub fn case(input: Vec<Value>, expected: Value) -> TestCase {
    let description = format!("{} -> {}", Value::Array(input.clone()), expected);
    TestCase {
        input,
        expected,
        category: Category::HappyPath,
        description,
    }
}

/// Whether a `python3` interpreter can be started.
pub fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

/// Agent backend that replays canned completions and records prompts.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().map(str::to_string).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl AgentBackend for ScriptedBackend {
    fn complete(&self, request: &AgentRequest) -> Result<String> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted {} reply left", request.role))
    }
}

type Scripted = Result<String, String>;

fn script(items: Vec<Result<&str, &str>>) -> RefCell<VecDeque<Scripted>> {
    RefCell::new(
        items
            .into_iter()
            .map(|item| item.map(str::to_string).map_err(str::to_string))
            .collect(),
    )
}

fn next(queue: &RefCell<VecDeque<Scripted>>, what: &str) -> Result<String> {
    match queue.borrow_mut().pop_front() {
        Some(Ok(text)) => Ok(text),
        Some(Err(message)) => Err(anyhow!(message)),
        None => Err(anyhow!("no scripted {what} left")),
    }
}

/// Test generator returning a fixed suite or a fixed error.
#[derive(Debug)]
pub struct ScriptedTests {
    result: Result<Vec<TestCase>, String>,
    calls: RefCell<u32>,
}

impl ScriptedTests {
    pub fn ok(cases: Vec<TestCase>) -> Self {
        Self {
            result: Ok(cases),
            calls: RefCell::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: RefCell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.borrow()
    }
}

impl TestGenerator for ScriptedTests {
    fn generate_tests(&self, _problem: &str, _count: usize) -> Result<Vec<TestCase>> {
        *self.calls.borrow_mut() += 1;
        self.result.clone().map_err(|message| anyhow!(message))
    }
}

/// Code generator replaying candidates and recording the feedback it got.
#[derive(Debug)]
pub struct ScriptedCoder {
    outputs: RefCell<VecDeque<Scripted>>,
    feedback: RefCell<Vec<Option<String>>>,
}

impl ScriptedCoder {
    pub fn new(outputs: Vec<Result<&str, &str>>) -> Self {
        Self {
            outputs: script(outputs),
            feedback: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.feedback.borrow().len()
    }

    pub fn feedback_seen(&self) -> Vec<Option<String>> {
        self.feedback.borrow().clone()
    }
}

impl CodeGenerator for ScriptedCoder {
    fn generate_code(&self, _problem: &str, feedback: Option<&str>) -> Result<String> {
        self.feedback.borrow_mut().push(feedback.map(str::to_string));
        next(&self.outputs, "candidate")
    }
}

/// Debugger replaying feedback and recording what it was shown.
#[derive(Debug)]
pub struct ScriptedDebugger {
    outputs: RefCell<VecDeque<Scripted>>,
    seen: RefCell<Vec<(u32, Option<String>, usize)>>,
}

impl ScriptedDebugger {
    pub fn new(outputs: Vec<Result<&str, &str>>) -> Self {
        Self {
            outputs: script(outputs),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn attempts_seen(&self) -> Vec<u32> {
        self.seen.borrow().iter().map(|(attempt, ..)| *attempt).collect()
    }

    pub fn previous_seen(&self) -> Vec<Option<String>> {
        self.seen.borrow().iter().map(|(_, previous, _)| previous.clone()).collect()
    }

    pub fn failures_seen(&self) -> Vec<usize> {
        self.seen.borrow().iter().map(|(.., failures)| *failures).collect()
    }
}

impl Debugger for ScriptedDebugger {
    fn debug(&self, request: &DebugRequest<'_>) -> Result<String> {
        self.seen.borrow_mut().push((
            request.attempt,
            request.previous_feedback.map(str::to_string),
            request.failures.len(),
        ));
        next(&self.outputs, "feedback")
    }
}

/// Reporter returning a fixed report or a fixed error.
#[derive(Debug)]
pub struct ScriptedReporter {
    result: Result<String, String>,
    calls: RefCell<u32>,
}

impl ScriptedReporter {
    pub fn ok(report: &str) -> Self {
        Self {
            result: Ok(report.to_string()),
            calls: RefCell::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: RefCell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.borrow()
    }
}

impl Reporter for ScriptedReporter {
    fn report(&self, _request: &ReportRequest<'_>) -> Result<String> {
        *self.calls.borrow_mut() += 1;
        self.result.clone().map_err(|message| anyhow!(message))
    }
}

/// Verifier that passes exactly one candidate text and fails everything else.
#[derive(Debug)]
pub struct FakeVerifier {
    passing_code: String,
    suites: RefCell<Vec<Vec<TestCase>>>,
}

impl FakeVerifier {
    pub fn passing_code(code: &str) -> Self {
        Self {
            passing_code: code.to_string(),
            suites: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.suites.borrow().len()
    }

    pub fn suites_seen(&self) -> Vec<Vec<TestCase>> {
        self.suites.borrow().clone()
    }
}

impl Verifier for FakeVerifier {
    fn verify(&self, code: &str, cases: &[TestCase]) -> VerificationReport {
        self.suites.borrow_mut().push(cases.to_vec());
        let passing = code == self.passing_code;
        let results = cases
            .iter()
            .map(|case| TestResult {
                test_case: case.clone(),
                status: if passing { TestStatus::Pass } else { TestStatus::Fail },
                actual: Some(if passing { case.expected.clone() } else { Value::Null }),
                error_detail: None,
            })
            .collect();
        build_report(results).unwrap_or_else(|err| {
            fault_report(Fault::Generation {
                detail: err.to_string(),
            })
        })
    }
}

/// Scratch directory for CLI and export tests.
pub struct TempWorkspace {
    dir: tempfile::TempDir,
}

impl TempWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create temp workspace")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` under the workspace, creating parents.
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
