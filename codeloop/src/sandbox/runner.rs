//! Sequential test runner over a resolved candidate.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::equality::values_match;
use crate::core::types::{TestCase, TestResult, TestStatus};

/// Detail recorded when an invocation overruns its budget.
pub const TIMEOUT_DETAIL: &str = "timeout";

/// What a single invocation of the candidate produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The callable returned a value.
    Returned(Value),
    /// The callable raised, or the sandbox could not complete the call.
    Raised(String),
    /// The per-test budget elapsed first.
    TimedOut,
}

/// A callable the runner can invoke with positional arguments.
pub trait Invoke {
    fn invoke(&self, args: &[Value], budget: Duration) -> Invocation;
}

impl<F> Invoke for F
where
    F: Fn(&[Value]) -> Invocation,
{
    fn invoke(&self, args: &[Value], _budget: Duration) -> Invocation {
        self(args)
    }
}

/// Run every case in order, one at a time, and classify each outcome.
///
/// Returns exactly one result per case with `results[i].test_case == cases[i]`.
/// A fault in one case never stops the remaining cases.
#[instrument(skip_all, fields(cases = cases.len(), budget_ms = budget.as_millis() as u64))]
pub fn run_tests<C: Invoke + ?Sized>(
    callable: &C,
    cases: &[TestCase],
    budget: Duration,
) -> Vec<TestResult> {
    cases
        .iter()
        .enumerate()
        .map(|(idx, case)| {
            let result = classify(case, callable.invoke(&case.input, budget));
            debug!(test = idx + 1, status = result.status.as_str(), "test finished");
            result
        })
        .collect()
}

fn classify(case: &TestCase, invocation: Invocation) -> TestResult {
    match invocation {
        Invocation::Returned(actual) => {
            let status = if values_match(&actual, &case.expected) {
                TestStatus::Pass
            } else {
                TestStatus::Fail
            };
            TestResult {
                test_case: case.clone(),
                status,
                actual: Some(actual),
                error_detail: None,
            }
        }
        Invocation::Raised(detail) => TestResult {
            test_case: case.clone(),
            status: TestStatus::Error,
            actual: None,
            error_detail: Some(detail),
        },
        Invocation::TimedOut => TestResult {
            test_case: case.clone(),
            status: TestStatus::Error,
            actual: None,
            error_detail: Some(TIMEOUT_DETAIL.to_string()),
        },
    }
}
