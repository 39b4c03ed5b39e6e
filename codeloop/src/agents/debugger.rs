//! Failure analysis through an agent backend.

use anyhow::{Result, bail};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::agents::{DebugRequest, Debugger};
use crate::core::equality::render_value;
use crate::core::fault::{Fault, LoadFailure};
use crate::core::hints::missing_dependencies;
use crate::core::text::truncate_chars;
use crate::core::types::TestResult;
use crate::io::agent::{AgentBackend, AgentRequest};
use crate::io::prompt::{DebugPrompt, FailureLine, PromptBuilder};

/// Failing tests shown to the debugger.
const MAX_FAILURES: usize = 10;
/// Failing tests spelled out in rule-based feedback.
const FALLBACK_FAILURES: usize = 3;
/// Characters of the previous feedback carried into the next analysis.
const PREVIOUS_FEEDBACK_CHARS: usize = 500;

/// Asks the agent to analyze a failed attempt.
///
/// When the agent call fails or returns nothing, the feedback is built from
/// the failure itself so the next attempt is never left without guidance.
pub struct LlmDebugger<B> {
    backend: B,
    prompts: PromptBuilder,
}

impl<B: AgentBackend> LlmDebugger<B> {
    pub fn new(backend: B, prompt_budget_bytes: usize) -> Self {
        Self {
            backend,
            prompts: PromptBuilder::new(prompt_budget_bytes),
        }
    }

    fn analyze(&self, request: &DebugRequest<'_>) -> Result<String> {
        let previous_feedback = request.previous_feedback.map(|text| {
            let (kept, cut) = truncate_chars(text.trim(), PREVIOUS_FEEDBACK_CHARS);
            if cut { format!("{kept}...") } else { kept.to_string() }
        });
        let prompt = self.prompts.build_debug(&DebugPrompt {
            problem: request.problem,
            code: request.code,
            error_msg: request.error_msg,
            attempt: request.attempt,
            previous_feedback,
            failures: failure_lines(request.failures, MAX_FAILURES),
            omitted: request.failures.len().saturating_sub(MAX_FAILURES),
        })?;
        let reply = self.backend.complete(&AgentRequest {
            role: "debug",
            prompt,
        })?;
        let feedback = reply.trim();
        if feedback.is_empty() {
            bail!("debugger returned empty feedback");
        }
        Ok(feedback.to_string())
    }
}

impl<B: AgentBackend> Debugger for LlmDebugger<B> {
    #[instrument(skip_all, fields(attempt = request.attempt, failures = request.failures.len()))]
    fn debug(&self, request: &DebugRequest<'_>) -> Result<String> {
        match self.analyze(request) {
            Ok(feedback) => {
                info!(bytes = feedback.len(), "received debug feedback");
                Ok(feedback)
            }
            Err(err) => {
                warn!(err = %err, "debug analysis failed, using rule-based feedback");
                Ok(fallback_feedback(request))
            }
        }
    }
}

/// Feedback derived from the failure class alone.
pub fn fallback_feedback(request: &DebugRequest<'_>) -> String {
    let mut texts: Vec<&str> = vec![request.error_msg];
    texts.extend(request.fault.map(|fault| match fault {
        Fault::Generation { detail } => detail.as_str(),
        Fault::Load { failure } => failure.detail(),
    }));
    texts.extend(request.failures.iter().filter_map(|r| r.error_detail.as_deref()));
    let missing = missing_dependencies(texts);

    let mut lines = vec!["**ROOT CAUSE ANALYSIS:**".to_string()];
    let recommendations: &[&str] = match request.fault {
        Some(Fault::Generation { .. }) | Some(Fault::Load {
            failure: LoadFailure::FunctionNotFound(_),
        }) => {
            lines.push("No usable function was produced for this problem.".to_string());
            &[
                "Start from a single top-level function definition",
                "Name the function after what the problem asks for",
                "Keep helpers private (leading underscore) so the target is unambiguous",
            ]
        }
        Some(Fault::Load {
            failure: LoadFailure::SyntaxError(detail),
        }) => {
            lines.push(format!("The code does not parse ({detail})."));
            &[
                "Check for missing colons, parentheses or brackets",
                "Verify the indentation of every block",
                "Ensure all strings are properly quoted",
            ]
        }
        _ if !missing.is_empty() => {
            let mut names: Vec<&str> = missing.modules.iter().map(String::as_str).collect();
            names.extend(missing.names.iter().map(String::as_str));
            lines.push(format!(
                "The code uses names or modules that are not available: {}.",
                names.join(", ")
            ));
            &[
                "Add the necessary import statements at the top",
                "Check for typos in variable and function names",
                "Prefer the standard library over third-party modules",
            ]
        }
        Some(Fault::Load {
            failure: LoadFailure::LoadError(detail),
        }) => {
            lines.push(format!("Module-level code failed while loading: {detail}."));
            &[
                "Remove top-level statements other than imports and definitions",
                "Move example calls out of the module",
            ]
        }
        None => {
            lines.push(format!(
                "The code ran but {} test case(s) did not pass.",
                request.failures.len()
            ));
            lines.push(String::new());
            lines.push("**FAILED TESTS:**".to_string());
            for failure in failure_lines(request.failures, FALLBACK_FAILURES) {
                lines.push(String::new());
                lines.push(format!("Test {}: {}", failure.number, failure.description));
                lines.push(format!("  Input: {}", failure.input));
                lines.push(format!("  Expected: {}", failure.expected));
                lines.push(format!("  Got: {}", failure.actual));
            }
            &[
                "Review the function logic against each failing input",
                "Check that every edge case is handled",
                "Verify the return value has the expected type and shape",
            ]
        }
    };
    lines.push(String::new());
    lines.push("**FIX RECOMMENDATIONS:**".to_string());
    lines.extend(recommendations.iter().map(|item| format!("- {item}")));
    lines.join("\n")
}

fn failure_lines(failures: &[TestResult], limit: usize) -> Vec<FailureLine> {
    failures
        .iter()
        .take(limit)
        .enumerate()
        .map(|(idx, result)| {
            let case = &result.test_case;
            let actual = match (&result.actual, &result.error_detail) {
                (_, Some(detail)) => format!("ERROR: {detail}"),
                (Some(value), None) => render_value(value),
                (None, None) => "ERROR".to_string(),
            };
            FailureLine {
                number: idx + 1,
                status: result.status.as_str().to_string(),
                category: case.category.to_string(),
                description: case.description.clone(),
                input: render_value(&Value::Array(case.input.clone())),
                expected: render_value(&case.expected),
                actual,
            }
        })
        .collect()
}
