//! Test-suite generation through an agent backend.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::{Draft, Validator};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::agents::TestGenerator;
use crate::core::types::{Category, TestCase};
use crate::io::agent::{AgentBackend, AgentRequest};
use crate::io::prompt::{PromptBuilder, TestsPrompt};

const TEST_CASE_SCHEMA: &str = include_str!("../../schemas/test_case.schema.json");

static JSON_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("static regex"));

/// Coarse kind of value a problem asks for, inferred from its wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    Sequence,
    Number,
    Index,
    Boolean,
}

impl OutputShape {
    pub fn infer(problem: &str) -> Option<Self> {
        let lower = problem.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|word| lower.contains(word));
        if mentions(&["sort", "arrange", "order"]) {
            Some(Self::Sequence)
        } else if mentions(&["sum", "total", "count", "add"]) {
            Some(Self::Number)
        } else if mentions(&["search", "find", "index", "position"]) {
            Some(Self::Index)
        } else if mentions(&["is_", "check", "valid", "palindrome", "verify"]) {
            Some(Self::Boolean)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::Number => "number",
            Self::Index => "index",
            Self::Boolean => "boolean",
        }
    }

    fn admits(self, expected: &Value) -> bool {
        match self {
            Self::Sequence => expected.is_array(),
            Self::Number => expected.is_number(),
            Self::Index => expected.is_i64() || expected.is_u64(),
            Self::Boolean => expected.is_boolean(),
        }
    }
}

/// Asks the agent for a JSON array of test cases and normalizes it.
pub struct LlmTestGenerator<B> {
    backend: B,
    prompts: PromptBuilder,
    validator: Validator,
}

impl<B: AgentBackend> LlmTestGenerator<B> {
    pub fn new(backend: B, prompt_budget_bytes: usize) -> Result<Self> {
        let schema: Value =
            serde_json::from_str(TEST_CASE_SCHEMA).context("parse test case schema")?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .map_err(|err| anyhow!("compile test case schema: {err}"))?;
        Ok(Self {
            backend,
            prompts: PromptBuilder::new(prompt_budget_bytes),
            validator,
        })
    }

    /// Extract and normalize test cases from a raw completion.
    pub fn parse_reply(&self, reply: &str) -> Result<Vec<TestCase>> {
        let raw = JSON_ARRAY
            .find(reply)
            .ok_or_else(|| anyhow!("no JSON array in test generator reply"))?;
        let items: Vec<Value> =
            serde_json::from_str(raw.as_str()).context("parse test case array")?;

        let mut cases = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let problems: Vec<String> = self
                .validator
                .iter_errors(&item)
                .map(|err| err.to_string())
                .collect();
            if !problems.is_empty() {
                warn!(item = idx + 1, problems = %problems.join("; "), "dropping invalid test case");
                continue;
            }
            cases.push(to_test_case(item, cases.len() + 1));
        }
        if cases.is_empty() {
            bail!("test generator reply contained no valid test cases");
        }
        Ok(cases)
    }
}

impl<B: AgentBackend> TestGenerator for LlmTestGenerator<B> {
    #[instrument(skip_all, fields(count = count))]
    fn generate_tests(&self, problem: &str, count: usize) -> Result<Vec<TestCase>> {
        let shape = OutputShape::infer(problem);
        let prompt = self.prompts.build_tests(&TestsPrompt {
            problem,
            test_count: count,
            shape: shape.map(OutputShape::as_str),
        })?;
        let reply = self.backend.complete(&AgentRequest {
            role: "tests",
            prompt,
        })?;

        let mut cases = self.parse_reply(&reply)?;
        if let Some(shape) = shape {
            cases = keep_matching_shape(cases, shape);
        }
        if cases.len() > count {
            debug!(returned = cases.len(), count, "dropping surplus test cases");
            cases.truncate(count);
        }
        info!(cases = cases.len(), "generated test suite");
        Ok(cases)
    }
}

fn to_test_case(mut item: Value, number: usize) -> TestCase {
    let input = match item.get_mut("input").map(Value::take) {
        Some(Value::Array(args)) => args,
        Some(single) => vec![single],
        None => Vec::new(),
    };
    let expected = item.get_mut("expected").map(Value::take).unwrap_or(Value::Null);
    let category = item
        .get("category")
        .and_then(Value::as_str)
        .map_or(Category::Special, Category::from_label);
    let description = item
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map_or_else(|| format!("test case {number}"), str::to_string);
    TestCase {
        input,
        expected,
        category,
        description,
    }
}

/// Drop cases whose expected value contradicts the inferred shape, unless
/// that would drop them all.
fn keep_matching_shape(cases: Vec<TestCase>, shape: OutputShape) -> Vec<TestCase> {
    let matching: Vec<TestCase> = cases
        .iter()
        .filter(|case| shape.admits(&case.expected))
        .cloned()
        .collect();
    if matching.is_empty() {
        warn!(shape = shape.as_str(), "no case matches the inferred output shape, keeping all");
        return cases;
    }
    if matching.len() < cases.len() {
        warn!(
            shape = shape.as_str(),
            dropped = cases.len() - matching.len(),
            "dropping cases with mismatched expected values"
        );
    }
    matching
}
