//! Prompt rendering for the agent-backed collaborators.
//!
//! Templates are embedded at compile time and split into sections by HTML
//! comment markers so a byte budget can drop the least critical context first.

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;
use tracing::debug;

use crate::core::text::truncate_bytes;

const TESTS_TEMPLATE: &str = include_str!("prompts/tests.md");
const CODE_TEMPLATE: &str = include_str!("prompts/code.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const DEBUG_TEMPLATE: &str = include_str!("prompts/debug.md");

const TRUNCATION_NOTE: &str = "\n[truncated]";

/// Inputs for the test-design prompt.
#[derive(Debug, Clone, Serialize)]
pub struct TestsPrompt<'a> {
    pub problem: &'a str,
    pub test_count: usize,
    /// Inferred output shape (`sequence`, `number`, `index`, `boolean`), if any.
    pub shape: Option<&'a str>,
}

/// Inputs for the code-generation prompts.
#[derive(Debug, Clone, Serialize)]
pub struct CodePrompt<'a> {
    pub problem: &'a str,
    /// Debug feedback from the previous attempt; selects the fix template.
    pub feedback: Option<&'a str>,
}

/// One failing test as shown to the debugger.
#[derive(Debug, Clone, Serialize)]
pub struct FailureLine {
    pub number: usize,
    pub status: String,
    pub category: String,
    pub description: String,
    pub input: String,
    pub expected: String,
    pub actual: String,
}

/// Inputs for the debugging prompt.
#[derive(Debug, Clone, Serialize)]
pub struct DebugPrompt<'a> {
    pub problem: &'a str,
    pub code: &'a str,
    pub error_msg: &'a str,
    pub attempt: u32,
    pub previous_feedback: Option<String>,
    pub failures: Vec<FailureLine>,
    /// Failing tests left out of `failures`.
    pub omitted: usize,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("tests", TESTS_TEMPLATE)
            .context("parse tests template")?;
        env.add_template("code", CODE_TEMPLATE)
            .context("parse code template")?;
        env.add_template("fix", FIX_TEMPLATE)
            .context("parse fix template")?;
        env.add_template("debug", DEBUG_TEMPLATE)
            .context("parse debug template")?;
        Ok(Self { env })
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("static regex")
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.start(),
                whole.end(),
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str() == "required",
            ))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map_or(rendered.len(), |(next_start, ..)| *next_start);
        let content = rendered[*start..end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Apply budget to parsed sections: drop droppable sections in `drop_order`,
/// then truncate the largest remaining section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize, drop_order: &[&str]) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in drop_order {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(largest) = sections.iter_mut().max_by_key(|s| s.content.len()) else {
        return;
    };
    let before_len = largest.content.len();
    let allowed = before_len.saturating_sub(total - budget);
    let kept = truncate_bytes(&largest.content, allowed.saturating_sub(TRUNCATION_NOTE.len()));
    let mut content = kept.to_string();
    if allowed > TRUNCATION_NOTE.len() {
        content.push_str(TRUNCATION_NOTE);
    }
    largest.content = content;
    debug!(
        section = largest.key,
        before_len,
        after_len = largest.content.len(),
        "truncated section for budget"
    );
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build_tests(&self, input: &TestsPrompt<'_>) -> Result<String> {
        self.build("tests", input, &["guidance"])
    }

    /// Initial prompt without feedback, fix prompt with it.
    pub fn build_code(&self, input: &CodePrompt<'_>) -> Result<String> {
        match input.feedback.map(str::trim).filter(|f| !f.is_empty()) {
            Some(feedback) => self.build(
                "fix",
                &CodePrompt {
                    problem: input.problem,
                    feedback: Some(feedback),
                },
                &[],
            ),
            None => self.build("code", input, &[]),
        }
    }

    pub fn build_debug(&self, input: &DebugPrompt<'_>) -> Result<String> {
        self.build("debug", input, &["attempt", "error", "failures"])
    }

    fn build<S: Serialize>(&self, template: &str, ctx: &S, drop_order: &[&str]) -> Result<String> {
        let engine = PromptEngine::new()?;
        let rendered = engine.render(template, ctx)?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes, drop_order);
        Ok(render_sections(&sections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debug_input<'a>(code: &'a str, attempt: u32) -> DebugPrompt<'a> {
        DebugPrompt {
            problem: "Return the sum of two integers.",
            code,
            error_msg: "1 of 2 tests did not pass",
            attempt,
            previous_feedback: Some("Check the operator.".to_string()),
            failures: vec![FailureLine {
                number: 2,
                status: "FAIL".to_string(),
                category: "edge_case".to_string(),
                description: "negative plus positive".to_string(),
                input: "[-1, 1]".to_string(),
                expected: "0".to_string(),
                actual: "-2".to_string(),
            }],
            omitted: 0,
        }
    }

    #[test]
    fn tests_prompt_carries_count_problem_and_guidance() {
        let prompt = PromptBuilder::new(10_000)
            .build_tests(&TestsPrompt {
                problem: "Sort a list of integers.",
                test_count: 6,
                shape: Some("sequence"),
            })
            .expect("render");
        assert!(prompt.contains("Design 6 test cases"));
        assert!(prompt.contains("<problem>\nSort a list of integers.\n</problem>"));
        assert!(prompt.contains("### Output Shape"));
        assert!(!prompt.contains("section:"));
    }

    #[test]
    fn unknown_shape_omits_guidance_section() {
        let prompt = PromptBuilder::new(10_000)
            .build_tests(&TestsPrompt {
                problem: "Reverse a string.",
                test_count: 3,
                shape: None,
            })
            .expect("render");
        assert!(!prompt.contains("### Output Shape"));
        assert!(prompt.contains("### Output Format"));
    }

    #[test]
    fn feedback_selects_the_fix_template() {
        let builder = PromptBuilder::new(10_000);
        let initial = builder
            .build_code(&CodePrompt {
                problem: "p",
                feedback: None,
            })
            .expect("render");
        assert!(!initial.contains("### Debugging Feedback"));
        assert!(!initial.contains("previous Python function failed"));

        let fix = builder
            .build_code(&CodePrompt {
                problem: "p",
                feedback: Some("ROOT CAUSE: uses minus"),
            })
            .expect("render");
        assert!(fix.contains("previous Python function failed"));
        assert!(fix.contains("ROOT CAUSE: uses minus"));

        let blank = builder
            .build_code(&CodePrompt {
                problem: "p",
                feedback: Some("   "),
            })
            .expect("render");
        assert_eq!(blank, initial);
    }

    #[test]
    fn debug_prompt_sections_are_ordered() {
        let prompt = PromptBuilder::new(10_000)
            .build_debug(&debug_input("def add(a, b):\n    return a - b", 2))
            .expect("render");
        let problem = prompt.find("### Problem").expect("problem");
        let history = prompt.find("### Attempt History").expect("history");
        let code = prompt.find("### Candidate Code").expect("code");
        let failures = prompt.find("### Failing Tests").expect("failures");
        let format = prompt.find("**ROOT CAUSE ANALYSIS:**").expect("format");
        assert!(problem < history && history < code && code < failures && failures < format);
        assert!(prompt.contains("Test 2 (FAIL, edge_case): negative plus positive"));
        assert!(prompt.contains("Check the operator."));
    }

    #[test]
    fn first_attempt_has_no_history_section() {
        let prompt = PromptBuilder::new(10_000)
            .build_debug(&debug_input("def f(): pass", 1))
            .expect("render");
        assert!(!prompt.contains("### Attempt History"));
    }

    #[test]
    fn budget_drops_context_before_truncating_required_sections() {
        let code = "x = 1\n".repeat(40);
        let prompt = PromptBuilder::new(900)
            .build_debug(&debug_input(&code, 3))
            .expect("render");
        assert!(!prompt.contains("### Attempt History"));
        assert!(prompt.contains("### Candidate Code"));
        assert!(prompt.contains("### Output Format"));
    }

    #[test]
    fn oversized_required_section_is_truncated() {
        let code = "y = 2\n".repeat(2_000);
        let prompt = PromptBuilder::new(2_000)
            .build_debug(&debug_input(&code, 1))
            .expect("render");
        assert!(prompt.contains("[truncated]"));
        assert!(prompt.len() <= 2_000 + 16);
    }
}
