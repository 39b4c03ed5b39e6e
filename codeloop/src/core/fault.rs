//! Failures that stop a candidate before any test runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The sandbox could not produce a callable from candidate source.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LoadFailure {
    /// The source does not parse. Nothing was executed.
    #[error("syntax error: {0}")]
    SyntaxError(String),
    /// Module-level execution raised or exceeded the load budget.
    #[error("load error: {0}")]
    LoadError(String),
    /// No single target function could be resolved.
    #[error("function not found: {0}")]
    FunctionNotFound(String),
}

impl LoadFailure {
    pub fn detail(&self) -> &str {
        match self {
            LoadFailure::SyntaxError(detail)
            | LoadFailure::LoadError(detail)
            | LoadFailure::FunctionNotFound(detail) => detail,
        }
    }
}

/// Synthetic report entry for a candidate that never reached the test runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Fault {
    /// The code-generation collaborator failed to produce a candidate.
    Generation { detail: String },
    /// The sandbox rejected the candidate.
    Load { failure: LoadFailure },
}

impl Fault {
    /// One-line description used as the report's `error_msg`.
    pub fn describe(&self) -> String {
        match self {
            Fault::Generation { detail } => format!("generation failed: {detail}"),
            Fault::Load { failure } => failure.to_string(),
        }
    }
}

impl From<LoadFailure> for Fault {
    fn from(failure: LoadFailure) -> Self {
        Fault::Load { failure }
    }
}
