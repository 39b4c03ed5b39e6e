//! Shared deterministic types for the verification loop.
//!
//! These types define stable contracts between the sandbox, the test runner,
//! the report builder and the iteration controller. They carry no I/O and
//! serialize to stable JSON for export.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::fault::Fault;

/// Coverage category assigned to a generated test case.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    HappyPath,
    EdgeCase,
    Boundary,
    InvalidInput,
    Special,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::HappyPath => "happy_path",
            Category::EdgeCase => "edge_case",
            Category::Boundary => "boundary",
            Category::InvalidInput => "invalid_input",
            Category::Special => "special",
        }
    }

    /// Lenient mapping for category labels produced by a model.
    ///
    /// Unknown labels fall back to `Special`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "happy_path" | "happy" | "typical" => Category::HappyPath,
            "edge_case" | "edge" => Category::EdgeCase,
            "boundary" | "boundaries" => Category::Boundary,
            "invalid_input" | "invalid" | "error" => Category::InvalidInput,
            _ => Category::Special,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured test case. `input` is the positional argument list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Vec<Value>,
    pub expected: Value,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub description: String,
}

/// Classification of a single test invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Error => "ERROR",
        }
    }
}

/// Outcome of running one test case against a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_case: TestCase,
    pub status: TestStatus,
    pub actual: Option<Value>,
    pub error_detail: Option<String>,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }
}

/// Aggregated verdict for one candidate.
///
/// `fault` is set when the candidate never reached the test runner (the
/// code generator failed, or the sandbox could not load it); `test_results`
/// is empty in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub test_results: Vec<TestResult>,
    pub error_msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

impl VerificationReport {
    /// Non-PASS results in test order.
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.test_results.iter().filter(|result| !result.passed())
    }

    /// `(pass, fail, error)` counts.
    pub fn tally(&self) -> (usize, usize, usize) {
        let mut tally = (0, 0, 0);
        for result in &self.test_results {
            match result.status {
                TestStatus::Pass => tally.0 += 1,
                TestStatus::Fail => tally.1 += 1,
                TestStatus::Error => tally.2 += 1,
            }
        }
        tally
    }
}

/// One generate-verify(-debug) cycle of the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-indexed, strictly increasing within a run.
    pub index: u32,
    pub candidate_code: String,
    pub report: VerificationReport,
    pub debug_feedback: Option<String>,
    /// Why the debugger produced no feedback for this attempt, if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_error: Option<String>,
}

/// Terminal value of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    /// Verified code on success, otherwise the last unverified candidate.
    pub final_code: Option<String>,
    pub test_cases: Vec<TestCase>,
    pub history: Vec<Attempt>,
    pub failure_report: Option<String>,
}

impl RunOutcome {
    pub fn attempts(&self) -> u32 {
        self.history.last().map_or(0, |attempt| attempt.index)
    }

    pub fn last_report(&self) -> Option<&VerificationReport> {
        self.history.last().map(|attempt| &attempt.report)
    }
}
