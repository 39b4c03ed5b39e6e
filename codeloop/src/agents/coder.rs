//! Candidate generation through an agent backend.

use anyhow::{Result, bail};
use tracing::{debug, info, instrument};

use crate::agents::CodeGenerator;
use crate::io::agent::{AgentBackend, AgentRequest};
use crate::io::prompt::{CodePrompt, PromptBuilder};
use crate::sandbox::source::{node_text, parse};

/// Asks the agent for a function and strips everything that is not code.
pub struct LlmCodeGenerator<B> {
    backend: B,
    prompts: PromptBuilder,
}

impl<B: AgentBackend> LlmCodeGenerator<B> {
    pub fn new(backend: B, prompt_budget_bytes: usize) -> Self {
        Self {
            backend,
            prompts: PromptBuilder::new(prompt_budget_bytes),
        }
    }
}

impl<B: AgentBackend> CodeGenerator for LlmCodeGenerator<B> {
    #[instrument(skip_all, fields(with_feedback = feedback.is_some()))]
    fn generate_code(&self, problem: &str, feedback: Option<&str>) -> Result<String> {
        let prompt = self.prompts.build_code(&CodePrompt { problem, feedback })?;
        let reply = self.backend.complete(&AgentRequest {
            role: "code",
            prompt,
        })?;
        let code = clean_code(&reply);
        if code.trim().is_empty() {
            bail!("code generator returned no code");
        }
        info!(bytes = code.len(), "generated candidate");
        Ok(code)
    }
}

/// Strip Markdown fences and top-level demo code from a completion.
///
/// Imports, definitions, assignments and comments survive; top-level calls,
/// asserts and `if __name__ == ...` blocks are removed. Source that does not
/// parse is returned fence-stripped so the sandbox can report the error.
pub fn clean_code(reply: &str) -> String {
    let code = strip_fences(reply);
    let Ok(tree) = parse(&code) else {
        return code.trim().to_string();
    };

    let root = tree.root_node();
    let mut cursor = root.walk();
    let mut dropped = Vec::new();
    for node in root.named_children(&mut cursor) {
        let demo = match node.kind() {
            "if_statement" => node
                .child_by_field_name("condition")
                .is_some_and(|cond| node_text(cond, &code).contains("__name__")),
            "assert_statement" | "print_statement" => true,
            "expression_statement" => {
                let mut inner = node.walk();
                let keep = node.named_children(&mut inner).all(|child| {
                    matches!(
                        child.kind(),
                        "assignment" | "augmented_assignment" | "string"
                    )
                });
                !keep
            }
            _ => false,
        };
        if demo {
            dropped.push(node.start_byte()..node.end_byte());
        }
    }
    if dropped.is_empty() {
        return code.trim().to_string();
    }
    debug!(statements = dropped.len(), "dropping top-level demo code");

    let mut kept = String::with_capacity(code.len());
    let mut pos = 0;
    for range in dropped {
        kept.push_str(&code[pos..range.start]);
        pos = range.end;
    }
    kept.push_str(&code[pos..]);
    collapse_blank_runs(&kept)
}

fn strip_fences(reply: &str) -> String {
    let trimmed = reply.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_open = &trimmed[open + 3..];
    // The rest of the opening line is a language tag.
    let body_start = after_open.find('\n').map_or(after_open.len(), |idx| idx + 1);
    let body = &after_open[body_start..];
    let body = body.find("```").map_or(body, |close| &body[..close]);
    body.to_string()
}

fn collapse_blank_runs(code: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank_run = 0;
    for line in code.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line.trim_end());
    }
    out.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBackend;

    #[test]
    fn strips_fences_and_language_tag() {
        let reply = "Here is the code:\n```python\ndef add(a, b):\n    return a + b\n```\nDone.";
        assert_eq!(clean_code(reply), "def add(a, b):\n    return a + b");
    }

    #[test]
    fn drops_demo_code_but_keeps_constants_and_imports() {
        let reply = r#"import math

LIMIT = 10

def area(r):
    """Circle area."""
    return math.pi * r * r

print(area(2))
assert area(0) == 0

if __name__ == "__main__":
    print(area(1))
"#;
        assert_eq!(
            clean_code(reply),
            "import math\n\nLIMIT = 10\n\ndef area(r):\n    \"\"\"Circle area.\"\"\"\n    return math.pi * r * r"
        );
    }

    #[test]
    fn unparseable_code_is_returned_for_the_sandbox_to_reject() {
        assert_eq!(clean_code("def f(:\n  pass\n"), "def f(:\n  pass");
    }

    #[test]
    fn feedback_switches_to_the_fix_prompt() {
        let backend = ScriptedBackend::new(vec!["def f():\n    return 1\n", "def f():\n    return 2\n"]);
        let coder = LlmCodeGenerator::new(backend, 40_000);

        assert_eq!(coder.generate_code("p", None).expect("code"), "def f():\n    return 1");
        assert_eq!(
            coder.generate_code("p", Some("return 2")).expect("code"),
            "def f():\n    return 2"
        );

        let prompts = coder.backend.prompts();
        assert!(!prompts[0].contains("### Debugging Feedback"));
        assert!(prompts[1].contains("### Debugging Feedback"));
    }

    #[test]
    fn empty_completion_is_a_failure() {
        let coder = LlmCodeGenerator::new(ScriptedBackend::new(vec!["```\n```"]), 40_000);
        assert!(coder.generate_code("p", None).is_err());
    }
}
