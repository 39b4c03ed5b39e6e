//! The iteration controller: generate, verify, debug, repeat.
//!
//! ```text
//! AWAITING_TESTS -> GENERATING_CODE -> VERIFYING -> SUCCESS
//!                        ^                 |
//!                        |                 v
//!                        +----------- DEBUGGING    (attempt < max_attempts)
//!                                          |
//!                                          v
//!                                      EXHAUSTED   (attempt == max_attempts)
//! ```
//!
//! The test suite is generated once and held fixed for every attempt. Only a
//! configuration problem ends a run early; every other failure is recorded on
//! the attempt and the loop continues.

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::agents::{Collaborators, DebugRequest, ReportRequest};
use crate::core::fault::Fault;
use crate::core::report::fault_report;
use crate::core::types::{Attempt, RunOutcome, TestCase, TestResult, VerificationReport};
use crate::verify::Verifier;

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub problem: String,
    pub test_count: usize,
    pub max_attempts: u32,
}

/// Problems that abort a run before any attempt is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("max_attempts must be at least 1")]
    NoAttemptBudget,
    #[error("test_count must be at least 1")]
    NoTestsRequested,
    #[error("problem description is empty")]
    EmptyProblem,
    #[error("test generation failed: {0}")]
    TestGeneration(String),
    #[error("test generation produced no test cases")]
    EmptyTestSuite,
}

/// Progress notifications for callers that report as the run advances.
#[derive(Debug, Clone, Copy)]
pub enum LoopEvent<'a> {
    TestsReady {
        cases: &'a [TestCase],
    },
    AttemptStarted {
        index: u32,
        max_attempts: u32,
    },
    CandidateGenerated {
        index: u32,
        code: &'a str,
    },
    GenerationFailed {
        index: u32,
        detail: &'a str,
    },
    Verified {
        index: u32,
        report: &'a VerificationReport,
    },
    FeedbackReady {
        index: u32,
        feedback: Option<&'a str>,
        error: Option<&'a str>,
    },
    Finished {
        success: bool,
        attempts: u32,
    },
}

enum Phase {
    AwaitingTests,
    GeneratingCode { feedback: Option<String> },
    Verifying { index: u32, code: String },
    Judging { attempt: Attempt },
    Debugging { attempt: Attempt },
    Success { code: String },
    Exhausted,
}

/// Drive one run to SUCCESS or EXHAUSTED.
///
/// Returns `Err` only for configuration problems, in which case no attempt
/// was made. Otherwise `history` holds exactly one entry per attempt, in
/// order, and a failed run carries a non-empty `failure_report`.
#[instrument(skip_all, fields(max_attempts = request.max_attempts, test_count = request.test_count))]
pub fn run_verification_loop<V, F>(
    request: &RunRequest,
    collaborators: Collaborators<'_>,
    verifier: &V,
    mut on_event: F,
) -> Result<RunOutcome, ConfigurationError>
where
    V: Verifier + ?Sized,
    F: FnMut(&LoopEvent<'_>),
{
    if request.max_attempts == 0 {
        return Err(ConfigurationError::NoAttemptBudget);
    }
    if request.test_count == 0 {
        return Err(ConfigurationError::NoTestsRequested);
    }
    let problem = request.problem.trim();
    if problem.is_empty() {
        return Err(ConfigurationError::EmptyProblem);
    }

    let mut cases: Vec<TestCase> = Vec::new();
    let mut history: Vec<Attempt> = Vec::new();
    let mut phase = Phase::AwaitingTests;

    loop {
        phase = match phase {
            Phase::AwaitingTests => {
                cases = collaborators
                    .tests
                    .generate_tests(problem, request.test_count)
                    .map_err(|err| ConfigurationError::TestGeneration(format!("{err:#}")))?;
                if cases.is_empty() {
                    return Err(ConfigurationError::EmptyTestSuite);
                }
                info!(cases = cases.len(), "test suite fixed");
                on_event(&LoopEvent::TestsReady { cases: &cases });
                Phase::GeneratingCode { feedback: None }
            }

            Phase::GeneratingCode { feedback } => {
                let index = next_index(&history);
                info!(attempt = index, "generating candidate");
                on_event(&LoopEvent::AttemptStarted {
                    index,
                    max_attempts: request.max_attempts,
                });
                match collaborators.coder.generate_code(problem, feedback.as_deref()) {
                    Ok(code) => {
                        on_event(&LoopEvent::CandidateGenerated { index, code: &code });
                        Phase::Verifying { index, code }
                    }
                    Err(err) => {
                        let detail = format!("{err:#}");
                        warn!(attempt = index, %detail, "code generation failed");
                        on_event(&LoopEvent::GenerationFailed {
                            index,
                            detail: &detail,
                        });
                        let report = fault_report(Fault::Generation { detail });
                        on_event(&LoopEvent::Verified {
                            index,
                            report: &report,
                        });
                        Phase::Judging {
                            attempt: new_attempt(index, String::new(), report),
                        }
                    }
                }
            }

            Phase::Verifying { index, code } => {
                let report = verifier.verify(&code, &cases);
                info!(attempt = index, passed = report.passed, "candidate verified");
                on_event(&LoopEvent::Verified {
                    index,
                    report: &report,
                });
                Phase::Judging {
                    attempt: new_attempt(index, code, report),
                }
            }

            Phase::Judging { attempt } => {
                if attempt.report.passed {
                    let code = attempt.candidate_code.clone();
                    history.push(attempt);
                    Phase::Success { code }
                } else if attempt.index < request.max_attempts {
                    Phase::Debugging { attempt }
                } else {
                    history.push(attempt);
                    Phase::Exhausted
                }
            }

            Phase::Debugging { mut attempt } => {
                let failures: Vec<TestResult> = attempt.report.failures().cloned().collect();
                let previous_feedback = history.last().and_then(|a| a.debug_feedback.as_deref());
                let result = collaborators.debugger.debug(&DebugRequest {
                    problem,
                    code: &attempt.candidate_code,
                    failures: &failures,
                    error_msg: &attempt.report.error_msg,
                    fault: attempt.report.fault.as_ref(),
                    attempt: attempt.index,
                    previous_feedback,
                });
                match result {
                    Ok(feedback) => attempt.debug_feedback = Some(feedback),
                    Err(err) => {
                        let detail = format!("{err:#}");
                        warn!(attempt = attempt.index, %detail, "debugging failed, continuing without feedback");
                        attempt.debug_error = Some(detail);
                    }
                }
                on_event(&LoopEvent::FeedbackReady {
                    index: attempt.index,
                    feedback: attempt.debug_feedback.as_deref(),
                    error: attempt.debug_error.as_deref(),
                });
                let feedback = attempt.debug_feedback.clone();
                history.push(attempt);
                Phase::GeneratingCode { feedback }
            }

            Phase::Success { code } => {
                let attempts = next_index(&history) - 1;
                info!(attempts, "run succeeded");
                on_event(&LoopEvent::Finished {
                    success: true,
                    attempts,
                });
                return Ok(RunOutcome {
                    success: true,
                    final_code: Some(code),
                    test_cases: cases,
                    history,
                    failure_report: None,
                });
            }

            Phase::Exhausted => {
                let attempts = next_index(&history) - 1;
                warn!(attempts, "attempt budget exhausted");
                let report = final_report(problem, request.max_attempts, &history, &cases, collaborators);
                on_event(&LoopEvent::Finished {
                    success: false,
                    attempts,
                });
                let final_code = history.last().map(|attempt| attempt.candidate_code.clone());
                return Ok(RunOutcome {
                    success: false,
                    final_code,
                    test_cases: cases,
                    history,
                    failure_report: Some(report),
                });
            }
        };
    }
}

fn next_index(history: &[Attempt]) -> u32 {
    history.last().map_or(1, |attempt| attempt.index + 1)
}

fn new_attempt(index: u32, candidate_code: String, report: VerificationReport) -> Attempt {
    Attempt {
        index,
        candidate_code,
        report,
        debug_feedback: None,
        debug_error: None,
    }
}

fn final_report(
    problem: &str,
    max_attempts: u32,
    history: &[Attempt],
    cases: &[TestCase],
    collaborators: Collaborators<'_>,
) -> String {
    let request = ReportRequest {
        problem,
        history,
        max_attempts,
        test_cases: cases,
    };
    match collaborators.reporter.report(&request) {
        Ok(report) if !report.trim().is_empty() => report,
        Ok(_) => minimal_report(history, max_attempts, "reporter returned an empty report"),
        Err(err) => {
            let detail = format!("{err:#}");
            warn!(%detail, "failure reporter failed, using minimal report");
            minimal_report(history, max_attempts, &detail)
        }
    }
}

fn minimal_report(history: &[Attempt], max_attempts: u32, reason: &str) -> String {
    let last_error = history
        .last()
        .map_or("no attempt was made", |attempt| attempt.report.error_msg.as_str());
    format!(
        "# Failure Report\n\n- Attempts made: {}/{max_attempts}\n- Final status: FAILED\n\n## Last Error\n\n{last_error}\n\n(detailed report unavailable: {reason})\n",
        history.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        FakeVerifier, ScriptedCoder, ScriptedDebugger, ScriptedReporter, ScriptedTests, case,
    };
    use serde_json::json;

    fn request(max_attempts: u32) -> RunRequest {
        RunRequest {
            problem: "Return the sum of two integers.".to_string(),
            test_count: 2,
            max_attempts,
        }
    }

    fn suite() -> Vec<TestCase> {
        vec![case(vec![json!(2), json!(3)], json!(5)), case(vec![json!(-1), json!(1)], json!(0))]
    }

    #[test]
    fn success_on_first_attempt_skips_debugging() {
        let tests = ScriptedTests::ok(suite());
        let coder = ScriptedCoder::new(vec![Ok("good")]);
        let debugger = ScriptedDebugger::new(vec![]);
        let reporter = ScriptedReporter::ok("unused");
        let verifier = FakeVerifier::passing_code("good");
        let collaborators = Collaborators {
            tests: &tests,
            coder: &coder,
            debugger: &debugger,
            reporter: &reporter,
        };

        let outcome = run_verification_loop(&request(3), collaborators, &verifier, |_| {}).expect("run");

        assert!(outcome.success);
        assert_eq!(outcome.final_code.as_deref(), Some("good"));
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.failure_report, None);
        assert_eq!(debugger.calls(), 0);
        assert_eq!(reporter.calls(), 0);
    }

    #[test]
    fn feedback_flows_into_the_next_generation() {
        let tests = ScriptedTests::ok(suite());
        let coder = ScriptedCoder::new(vec![Ok("bad"), Ok("good")]);
        let debugger = ScriptedDebugger::new(vec![Ok("use plus")]);
        let reporter = ScriptedReporter::ok("unused");
        let verifier = FakeVerifier::passing_code("good");
        let collaborators = Collaborators {
            tests: &tests,
            coder: &coder,
            debugger: &debugger,
            reporter: &reporter,
        };

        let outcome = run_verification_loop(&request(3), collaborators, &verifier, |_| {}).expect("run");

        assert!(outcome.success);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[0].debug_feedback.as_deref(), Some("use plus"));
        assert_eq!(coder.feedback_seen(), vec![None, Some("use plus".to_string())]);
        assert_eq!(verifier.suites_seen(), vec![suite(), suite()]);
    }

    #[test]
    fn last_attempt_is_not_debugged() {
        let tests = ScriptedTests::ok(suite());
        let coder = ScriptedCoder::new(vec![Ok("bad"), Ok("bad")]);
        let debugger = ScriptedDebugger::new(vec![Ok("try again")]);
        let reporter = ScriptedReporter::ok("# report");
        let verifier = FakeVerifier::passing_code("good");
        let collaborators = Collaborators {
            tests: &tests,
            coder: &coder,
            debugger: &debugger,
            reporter: &reporter,
        };

        let outcome = run_verification_loop(&request(2), collaborators, &verifier, |_| {}).expect("run");

        assert!(!outcome.success);
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(debugger.calls(), 1);
        assert_eq!(outcome.history[1].debug_feedback, None);
        assert_eq!(outcome.failure_report.as_deref(), Some("# report"));
    }

    #[test]
    fn previous_feedback_reaches_the_debugger() {
        let tests = ScriptedTests::ok(suite());
        let coder = ScriptedCoder::new(vec![Ok("bad"), Ok("bad"), Ok("bad")]);
        let debugger = ScriptedDebugger::new(vec![Ok("first"), Ok("second")]);
        let reporter = ScriptedReporter::ok("# report");
        let verifier = FakeVerifier::passing_code("good");
        let collaborators = Collaborators {
            tests: &tests,
            coder: &coder,
            debugger: &debugger,
            reporter: &reporter,
        };

        run_verification_loop(&request(3), collaborators, &verifier, |_| {}).expect("run");

        assert_eq!(
            debugger.previous_seen(),
            vec![None, Some("first".to_string())]
        );
        assert_eq!(debugger.attempts_seen(), vec![1, 2]);
    }

    #[test]
    fn configuration_errors_consume_no_attempts() {
        let coder = ScriptedCoder::new(vec![]);
        let debugger = ScriptedDebugger::new(vec![]);
        let reporter = ScriptedReporter::ok("unused");
        let verifier = FakeVerifier::passing_code("good");

        let failing_tests = ScriptedTests::failing("model offline");
        let collaborators = Collaborators {
            tests: &failing_tests,
            coder: &coder,
            debugger: &debugger,
            reporter: &reporter,
        };
        let err = run_verification_loop(&request(3), collaborators, &verifier, |_| {}).unwrap_err();
        assert_eq!(err, ConfigurationError::TestGeneration("model offline".to_string()));

        let empty_tests = ScriptedTests::ok(Vec::new());
        let collaborators = Collaborators {
            tests: &empty_tests,
            ..collaborators
        };
        let err = run_verification_loop(&request(3), collaborators, &verifier, |_| {}).unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyTestSuite);

        let err = run_verification_loop(&request(0), collaborators, &verifier, |_| {}).unwrap_err();
        assert_eq!(err, ConfigurationError::NoAttemptBudget);

        let blank = RunRequest {
            problem: "  \n".to_string(),
            ..request(3)
        };
        let err = run_verification_loop(&blank, collaborators, &verifier, |_| {}).unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyProblem);

        assert_eq!(coder.calls(), 0);
        assert_eq!(verifier.calls(), 0);
    }

    #[test]
    fn reporter_failure_degrades_to_minimal_report() {
        let tests = ScriptedTests::ok(suite());
        let coder = ScriptedCoder::new(vec![Ok("bad")]);
        let debugger = ScriptedDebugger::new(vec![]);
        let reporter = ScriptedReporter::failing("template missing");
        let verifier = FakeVerifier::passing_code("good");
        let collaborators = Collaborators {
            tests: &tests,
            coder: &coder,
            debugger: &debugger,
            reporter: &reporter,
        };

        let outcome = run_verification_loop(&request(1), collaborators, &verifier, |_| {}).expect("run");
        let report = outcome.failure_report.expect("report");
        assert!(report.contains("Attempts made: 1/1"));
        assert!(report.contains("template missing"));
        assert!(report.contains(&outcome.history[0].report.error_msg));
    }

    #[test]
    fn events_follow_the_state_machine() {
        let tests = ScriptedTests::ok(suite());
        let coder = ScriptedCoder::new(vec![Err("rate limited"), Ok("good")]);
        let debugger = ScriptedDebugger::new(vec![Err("debugger down")]);
        let reporter = ScriptedReporter::ok("unused");
        let verifier = FakeVerifier::passing_code("good");
        let collaborators = Collaborators {
            tests: &tests,
            coder: &coder,
            debugger: &debugger,
            reporter: &reporter,
        };

        let mut events = Vec::new();
        let outcome = run_verification_loop(&request(3), collaborators, &verifier, |event| {
            events.push(match event {
                LoopEvent::TestsReady { .. } => "tests",
                LoopEvent::AttemptStarted { .. } => "start",
                LoopEvent::CandidateGenerated { .. } => "generated",
                LoopEvent::GenerationFailed { .. } => "generation-failed",
                LoopEvent::Verified { .. } => "verified",
                LoopEvent::FeedbackReady { .. } => "feedback",
                LoopEvent::Finished { .. } => "finished",
            });
        })
        .expect("run");

        assert_eq!(
            events,
            vec![
                "tests",
                "start",
                "generation-failed",
                "verified",
                "feedback",
                "start",
                "generated",
                "verified",
                "finished",
            ]
        );
        assert!(outcome.success);
        let first = &outcome.history[0];
        assert_eq!(first.report.error_msg, "generation failed: rate limited");
        assert_eq!(first.debug_feedback, None);
        assert_eq!(first.debug_error.as_deref(), Some("debugger down"));
        assert_eq!(coder.feedback_seen(), vec![None, None]);
        assert_eq!(verifier.calls(), 1);
    }
}
