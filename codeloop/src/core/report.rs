//! Folds per-test outcomes into a [`VerificationReport`].

use thiserror::Error;

use crate::core::equality::render_value;
use crate::core::fault::Fault;
use crate::core::types::{TestResult, TestStatus, VerificationReport};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// A report over zero tests would pass vacuously.
    #[error("cannot build a verification report from an empty test suite")]
    EmptyTestSuite,
}

/// Build the report for a candidate that ran against the test suite.
///
/// `passed` holds iff every result is PASS. `error_msg` is empty on success;
/// otherwise a count line followed by one line per non-PASS test, in order.
pub fn build_report(test_results: Vec<TestResult>) -> Result<VerificationReport, ReportError> {
    if test_results.is_empty() {
        return Err(ReportError::EmptyTestSuite);
    }
    let passed = test_results.iter().all(TestResult::passed);
    let error_msg = if passed {
        String::new()
    } else {
        failure_lines(&test_results)
    };
    Ok(VerificationReport {
        passed,
        test_results,
        error_msg,
        fault: None,
    })
}

/// Build the report for a candidate that never reached the test runner.
pub fn fault_report(fault: Fault) -> VerificationReport {
    VerificationReport {
        passed: false,
        test_results: Vec::new(),
        error_msg: fault.describe(),
        fault: Some(fault),
    }
}

fn failure_lines(results: &[TestResult]) -> String {
    let failing = results.iter().filter(|result| !result.passed()).count();
    let mut lines = Vec::with_capacity(failing + 1);
    lines.push(format!(
        "{failing} of {} tests did not pass",
        results.len()
    ));
    for (idx, result) in results.iter().enumerate() {
        if result.passed() {
            continue;
        }
        lines.push(describe_failure(idx + 1, result));
    }
    lines.join("\n")
}

/// `test <n> [<category>] <description>: expected <e>, got|raised <...>`
pub fn describe_failure(number: usize, result: &TestResult) -> String {
    let case = &result.test_case;
    let expected = render_value(&case.expected);
    let outcome = match result.status {
        TestStatus::Error => format!(
            "raised {}",
            result.error_detail.as_deref().unwrap_or("unknown error")
        ),
        TestStatus::Fail | TestStatus::Pass => format!(
            "got {}",
            result
                .actual
                .as_ref()
                .map_or_else(|| "nothing".to_string(), render_value)
        ),
    };
    format!(
        "test {number} [{}] {}: expected {expected}, {outcome}",
        case.category,
        case.description.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fault::LoadFailure;
    use crate::core::types::{Category, TestCase};
    use serde_json::{Value, json};

    fn case(input: Vec<Value>, expected: Value, description: &str) -> TestCase {
        TestCase {
            input,
            expected,
            category: Category::HappyPath,
            description: description.to_string(),
        }
    }

    fn result(case: TestCase, status: TestStatus, actual: Option<Value>) -> TestResult {
        TestResult {
            test_case: case,
            status,
            actual,
            error_detail: None,
        }
    }

    #[test]
    fn all_pass_reports_passed_with_empty_message() {
        let results = vec![
            result(case(vec![json!(2), json!(3)], json!(5), "a"), TestStatus::Pass, Some(json!(5))),
            result(case(vec![json!(-1), json!(1)], json!(0), "b"), TestStatus::Pass, Some(json!(0))),
        ];
        let report = build_report(results).expect("report");
        assert!(report.passed);
        assert!(report.error_msg.is_empty());
        assert_eq!(report.test_results.len(), 2);
    }

    #[test]
    fn one_failure_among_passes_fails_the_report() {
        let results = vec![
            result(case(vec![json!(1)], json!(1), "ok"), TestStatus::Pass, Some(json!(1))),
            result(case(vec![json!(2)], json!(4), "square"), TestStatus::Fail, Some(json!(2))),
            result(case(vec![json!(3)], json!(9), "ok"), TestStatus::Pass, Some(json!(9))),
        ];
        let report = build_report(results).expect("report");
        assert!(!report.passed);
        assert_eq!(
            report.error_msg,
            "1 of 3 tests did not pass\ntest 2 [happy_path] square: expected 4, got 2"
        );
    }

    #[test]
    fn error_lines_carry_the_detail() {
        let mut errored = result(case(vec![json!(0)], json!(0), "div"), TestStatus::Error, None);
        errored.error_detail = Some("ZeroDivisionError: division by zero".to_string());
        let report = build_report(vec![errored]).expect("report");
        assert!(
            report
                .error_msg
                .ends_with("expected 0, raised ZeroDivisionError: division by zero")
        );
    }

    #[test]
    fn empty_suite_is_rejected() {
        assert_eq!(build_report(Vec::new()), Err(ReportError::EmptyTestSuite));
    }

    #[test]
    fn fault_report_never_passes() {
        let report = fault_report(LoadFailure::SyntaxError("line 2, column 5".into()).into());
        assert!(!report.passed);
        assert!(report.test_results.is_empty());
        assert_eq!(report.error_msg, "syntax error: line 2, column 5");
    }
}
