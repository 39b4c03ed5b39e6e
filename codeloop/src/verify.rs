//! One verification pass: load a candidate, run the suite, build the report.

use tracing::{info, instrument};

use crate::core::fault::Fault;
use crate::core::report::{build_report, fault_report};
use crate::core::types::{TestCase, VerificationReport};
use crate::sandbox::Sandbox;
use crate::sandbox::runner::run_tests;

/// Produces a report for a candidate against a fixed suite.
///
/// Implementations must be idempotent: the same code and cases give an
/// equivalent report.
pub trait Verifier {
    fn verify(&self, code: &str, cases: &[TestCase]) -> VerificationReport;
}

/// Verifies candidates in the process sandbox.
#[derive(Debug, Clone)]
pub struct SandboxVerifier {
    sandbox: Sandbox,
}

impl SandboxVerifier {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

impl Verifier for SandboxVerifier {
    #[instrument(skip_all, fields(cases = cases.len()))]
    fn verify(&self, code: &str, cases: &[TestCase]) -> VerificationReport {
        let candidate = match self.sandbox.load(code) {
            Ok(candidate) => candidate,
            Err(failure) => {
                info!(%failure, "candidate rejected before testing");
                return fault_report(Fault::from(failure));
            }
        };
        let results = run_tests(&candidate, cases, self.sandbox.config().test_timeout);
        match build_report(results) {
            Ok(report) => {
                let (pass, fail, error) = report.tally();
                info!(pass, fail, error, passed = report.passed, "verification finished");
                report
            }
            Err(err) => VerificationReport {
                passed: false,
                test_results: Vec::new(),
                error_msg: err.to_string(),
                fault: None,
            },
        }
    }
}
