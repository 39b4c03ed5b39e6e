//! Collaborators the iteration controller depends on.
//!
//! The controller only sees the traits below. The `Llm*` implementations
//! drive an [`AgentBackend`](crate::io::agent::AgentBackend); the failure
//! reporter is local.

use anyhow::Result;

use crate::core::fault::Fault;
use crate::core::types::{Attempt, TestCase, TestResult};

pub mod coder;
pub mod debugger;
pub mod reporter;
pub mod test_writer;

pub use coder::LlmCodeGenerator;
pub use debugger::LlmDebugger;
pub use reporter::FailureReporter;
pub use test_writer::LlmTestGenerator;

/// Produces the fixed test suite for a problem.
pub trait TestGenerator {
    fn generate_tests(&self, problem: &str, count: usize) -> Result<Vec<TestCase>>;
}

/// Produces candidate source, optionally guided by debug feedback.
pub trait CodeGenerator {
    fn generate_code(&self, problem: &str, feedback: Option<&str>) -> Result<String>;
}

/// Everything the debugger sees about a failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct DebugRequest<'a> {
    pub problem: &'a str,
    pub code: &'a str,
    /// Non-passing results, in suite order.
    pub failures: &'a [TestResult],
    pub error_msg: &'a str,
    /// Set when the candidate never reached the test runner.
    pub fault: Option<&'a Fault>,
    pub attempt: u32,
    /// Feedback given for the previous attempt, if any.
    pub previous_feedback: Option<&'a str>,
}

/// Explains a failed attempt.
pub trait Debugger {
    fn debug(&self, request: &DebugRequest<'_>) -> Result<String>;
}

/// Inputs for the final report of an exhausted run.
#[derive(Debug, Clone, Copy)]
pub struct ReportRequest<'a> {
    pub problem: &'a str,
    pub history: &'a [Attempt],
    pub max_attempts: u32,
    pub test_cases: &'a [TestCase],
}

/// Summarizes an exhausted run for a human.
pub trait Reporter {
    fn report(&self, request: &ReportRequest<'_>) -> Result<String>;
}

/// The collaborator set for one run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub tests: &'a dyn TestGenerator,
    pub coder: &'a dyn CodeGenerator,
    pub debugger: &'a dyn Debugger,
    pub reporter: &'a dyn Reporter,
}
