//! Human-facing report for a run that exhausted its attempts.

use std::collections::BTreeSet;

use anyhow::{Result, anyhow};

use crate::agents::{ReportRequest, Reporter};
use crate::core::hints::missing_dependencies;
use crate::core::report::describe_failure;
use crate::core::text::truncate_chars;
use crate::sandbox::source;

/// Failing tests detailed in the report.
const MAX_DETAILED_FAILURES: usize = 5;
/// Characters of the last candidate included in the report.
const MAX_CODE_CHARS: usize = 1500;

/// Builds the failure report locally from the run history.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureReporter;

impl Reporter for FailureReporter {
    fn report(&self, request: &ReportRequest<'_>) -> Result<String> {
        let last = request
            .history
            .last()
            .ok_or_else(|| anyhow!("no attempts to report on"))?;
        let report = &last.report;

        let mut texts: Vec<&str> = vec![report.error_msg.as_str()];
        texts.extend(report.test_results.iter().filter_map(|r| r.error_detail.as_deref()));
        let missing = missing_dependencies(texts);
        let declared = declared_modules(&last.candidate_code);

        let problem = request.problem.lines().next().unwrap_or_default().trim();
        let final_error = report.error_msg.lines().next().unwrap_or("unknown error");
        let mut lines = vec![
            "# Failure Report".to_string(),
            String::new(),
            format!("- Problem: {problem}"),
            format!("- Attempts made: {}/{}", request.history.len(), request.max_attempts),
            "- Final status: FAILED".to_string(),
            format!("- Final error: {final_error}"),
        ];

        if !missing.is_empty() || !declared.is_empty() {
            lines.extend([String::new(), "## Dependencies".to_string(), String::new()]);
            for module in &missing.modules {
                lines.push(format!(
                    "- Module `{module}` could not be imported (`pip install {module}`)"
                ));
            }
            for name in &missing.names {
                lines.push(format!("- Name `{name}` is used but never defined or imported"));
            }
            let others: Vec<String> = declared
                .iter()
                .filter(|module| !missing.modules.contains(*module))
                .map(|module| format!("`{module}`"))
                .collect();
            if !others.is_empty() {
                lines.push(format!("- Imported by the candidate: {}", others.join(", ")));
            }
        }

        lines.extend([String::new(), "## Test Results".to_string(), String::new()]);
        let total = request.test_cases.len();
        if report.test_results.is_empty() {
            lines.push("No tests ran against the last candidate.".to_string());
        } else {
            let (pass, fail, error) = report.tally();
            lines.push(format!("- Passed: {pass}/{total}"));
            lines.push(format!("- Failed: {fail}/{total}"));
            lines.push(format!("- Errors: {error}/{total}"));

            let failing: Vec<(usize, _)> = report
                .test_results
                .iter()
                .enumerate()
                .filter(|(_, result)| !result.passed())
                .collect();
            if !failing.is_empty() {
                lines.extend([String::new(), "### Failing Tests".to_string(), String::new()]);
                for (idx, result) in failing.iter().take(MAX_DETAILED_FAILURES) {
                    lines.push(format!("- {}", describe_failure(idx + 1, result)));
                }
                if failing.len() > MAX_DETAILED_FAILURES {
                    lines.push(String::new());
                    lines.push(format!(
                        "... and {} more failures",
                        failing.len() - MAX_DETAILED_FAILURES
                    ));
                }
            }
        }

        lines.extend([String::new(), "## Last Generated Code".to_string(), String::new()]);
        let (code, cut) = truncate_chars(last.candidate_code.trim_end(), MAX_CODE_CHARS);
        let code = if code.trim().is_empty() { "(no code generated)" } else { code };
        lines.push(format!("```python\n{code}\n```"));
        if cut {
            lines.push(String::new());
            lines.push(format!("(truncated, showing the first {MAX_CODE_CHARS} characters)"));
        }

        lines.extend([String::new(), "## What You Can Do".to_string(), String::new()]);
        let mut recommendations = Vec::new();
        if !missing.modules.is_empty() {
            let modules: Vec<&str> = missing.modules.iter().map(String::as_str).collect();
            recommendations.push(format!("Install missing modules: `pip install {}`", modules.join(" ")));
        }
        recommendations.push("Review the debugger feedback recorded for each attempt".to_string());
        recommendations.push("Fix the code by hand using the failing tests above".to_string());
        recommendations.push("Check that the interpreter has every dependency the code needs".to_string());
        recommendations.push("Try a simpler version of the problem first".to_string());
        for (idx, recommendation) in recommendations.iter().enumerate() {
            lines.push(format!("{}. {recommendation}", idx + 1));
        }
        lines.push(String::new());

        Ok(lines.join("\n"))
    }
}

/// Top-level packages the candidate imports, `__future__` and relative imports excluded.
///
/// Unparsable code declares nothing.
fn declared_modules(code: &str) -> BTreeSet<String> {
    let Ok(tree) = source::parse(code) else {
        return BTreeSet::new();
    };
    let mut modules = BTreeSet::new();
    for statement in source::inventory(&tree, code).imports {
        let names: Vec<&str> = if let Some(rest) = statement.strip_prefix("from ") {
            rest.split_whitespace().next().into_iter().collect()
        } else if let Some(rest) = statement.strip_prefix("import ") {
            rest.split(',')
                .filter_map(|item| item.split_whitespace().next())
                .collect()
        } else {
            Vec::new()
        };
        for name in names {
            let top = name.split('.').next().unwrap_or(name);
            if !top.is_empty() && top != "__future__" {
                modules.insert(top.to_string());
            }
        }
    }
    modules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fault::LoadFailure;
    use crate::core::report::{build_report, fault_report};
    use crate::core::types::{Attempt, Category, TestCase, TestResult, TestStatus};
    use serde_json::json;

    fn case(n: i64) -> TestCase {
        TestCase {
            input: vec![json!(n)],
            expected: json!(n),
            category: Category::HappyPath,
            description: format!("identity {n}"),
        }
    }

    fn attempt(index: u32, report: crate::core::types::VerificationReport, code: &str) -> Attempt {
        Attempt {
            index,
            candidate_code: code.to_string(),
            report,
            debug_feedback: None,
            debug_error: None,
        }
    }

    #[test]
    fn details_first_five_failures_and_counts_the_rest() {
        let cases: Vec<TestCase> = (1..=8).map(case).collect();
        let results = cases
            .iter()
            .map(|c| TestResult {
                test_case: c.clone(),
                status: TestStatus::Fail,
                actual: Some(json!(0)),
                error_detail: None,
            })
            .collect();
        let history = vec![attempt(1, build_report(results).expect("report"), "def f(x):\n    return 0")];

        let text = FailureReporter
            .report(&ReportRequest {
                problem: "Return x.\nMore detail.",
                history: &history,
                max_attempts: 1,
                test_cases: &cases,
            })
            .expect("report");

        assert!(text.contains("- Problem: Return x."));
        assert!(text.contains("- Attempts made: 1/1"));
        assert!(text.contains("- Failed: 8/8"));
        assert!(text.contains("test 5 [happy_path] identity 5"));
        assert!(!text.contains("test 6 [happy_path]"));
        assert!(text.contains("... and 3 more failures"));
        assert!(text.contains("```python\ndef f(x):\n    return 0\n```"));
        assert!(text.contains("1. Review the debugger feedback"));
    }

    #[test]
    fn missing_modules_come_first_in_recommendations() {
        let report = fault_report(
            LoadFailure::LoadError("ModuleNotFoundError: No module named 'numpy'".to_string()).into(),
        );
        let history = vec![attempt(1, report, "import numpy")];
        let text = FailureReporter
            .report(&ReportRequest {
                problem: "p",
                history: &history,
                max_attempts: 3,
                test_cases: &[case(1)],
            })
            .expect("report");

        assert!(text.contains("## Dependencies"));
        assert!(text.contains("Module `numpy`"));
        assert!(text.contains("1. Install missing modules: `pip install numpy`"));
        assert!(text.contains("No tests ran against the last candidate."));
    }

    #[test]
    fn long_code_is_truncated() {
        let code = "a".repeat(2_000);
        let report = fault_report(LoadFailure::SyntaxError("line 1".to_string()).into());
        let history = vec![attempt(1, report, &code)];
        let text = FailureReporter
            .report(&ReportRequest {
                problem: "p",
                history: &history,
                max_attempts: 1,
                test_cases: &[],
            })
            .expect("report");
        assert!(text.contains(&"a".repeat(1500)));
        assert!(!text.contains(&"a".repeat(1501)));
        assert!(text.contains("truncated"));
    }

    #[test]
    fn empty_history_is_an_error() {
        let err = FailureReporter.report(&ReportRequest {
            problem: "p",
            history: &[],
            max_attempts: 1,
            test_cases: &[],
        });
        assert!(err.is_err());
    }

    #[test]
    fn declared_imports_are_named() {
        let code = "from __future__ import annotations\nimport os.path, numpy as np\nfrom scipy.linalg import norm\nfrom . import local\n\ndef f(x):\n    return np.array(x)\n";
        assert_eq!(
            declared_modules(code).into_iter().collect::<Vec<_>>(),
            vec!["numpy", "os", "scipy"]
        );
        assert!(declared_modules("def f(:\n").is_empty());

        let report = fault_report(
            LoadFailure::LoadError("ModuleNotFoundError: No module named 'numpy' (line 2)".to_string())
                .into(),
        );
        let history = vec![attempt(1, report, code)];
        let text = FailureReporter
            .report(&ReportRequest {
                problem: "p",
                history: &history,
                max_attempts: 1,
                test_cases: &[case(1)],
            })
            .expect("report");
        assert!(text.contains("- Module `numpy` could not be imported"), "{text}");
        assert!(text.contains("- Imported by the candidate: `os`, `scipy`"), "{text}");
    }

    #[test]
    fn report_without_dependencies_skips_the_section() {
        let report = fault_report(LoadFailure::SyntaxError("line 1".to_string()).into());
        let history = vec![attempt(1, report, "def f(x):\n    return x +\n")];
        let text = FailureReporter
            .report(&ReportRequest {
                problem: "p",
                history: &history,
                max_attempts: 1,
                test_cases: &[],
            })
            .expect("report");
        assert!(!text.contains("## Dependencies"));
        assert!(text.starts_with("# Failure Report\n\n- Problem: p\n"));
        assert!(text.ends_with("4. Try a simpler version of the problem first\n"));
    }
}
