//! Sandboxed execution of candidate source.
//!
//! A candidate is checked statically first (parse, inventory, target
//! resolution, import completion) and then loaded once in a fresh interpreter
//! process. Every test invocation gets its own process as well, so no state
//! leaks between tests, attempts or runs.

pub mod imports;
pub mod runner;
pub mod source;

use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::fault::LoadFailure;
use crate::io::process::{CommandOutput, run_command_with_timeout};
use crate::sandbox::runner::{Invocation, Invoke};
use crate::sandbox::source::FunctionDef;

const HARNESS: &str = include_str!("harness.py");
const RESULT_MARKER: &str = "@@codeloop-result@@ ";

/// Detail used when module-level execution overruns the load budget.
pub const LOAD_TIMEOUT_DETAIL: &str = "timeout during load";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Interpreter executable, resolved through `PATH`.
    pub python: String,
    pub load_timeout: Duration,
    pub test_timeout: Duration,
    pub output_limit_bytes: usize,
    /// Largest harness reply accepted, encoded return value included.
    pub reply_limit_bytes: usize,
    /// Explicit function under test; `None` resolves by convention.
    pub target_function: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            load_timeout: Duration::from_secs(10),
            test_timeout: Duration::from_secs(5),
            output_limit_bytes: 100_000,
            reply_limit_bytes: 10_000_000,
            target_function: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Turn candidate source into a callable, or explain why it cannot be.
    #[instrument(skip_all, fields(source_bytes = source.len()))]
    pub fn load(&self, source: &str) -> Result<LoadedCandidate, LoadFailure> {
        let tree = source::parse(source)?;
        let inventory = source::inventory(&tree, source);
        let function = source::resolve_target(&inventory, self.config.target_function.as_deref())?
            .clone();

        let added_imports = imports::missing_imports(&tree, source);
        if !added_imports.is_empty() {
            debug!(imports = ?added_imports, "completing imports");
        }
        let prelude = added_imports.join("\n");

        let warnings: Vec<String> = inventory
            .suspicious
            .iter()
            .map(|stmt| format!("top-level statement runs at load: {stmt}"))
            .collect();
        for warning in &warnings {
            warn!(%warning, "candidate has top-level side effects");
        }

        let interpreter = Interpreter {
            python: self.config.python.clone(),
            output_limit_bytes: self.config.output_limit_bytes,
            reply_limit_bytes: self.config.reply_limit_bytes,
        };
        let payload = json!({
            "mode": "load",
            "prelude": prelude,
            "source": source,
            "function": function.name,
            "args": [],
        });
        let output = interpreter
            .run(&payload, self.config.load_timeout)
            .map_err(|err| LoadFailure::LoadError(format!("cannot start interpreter: {err:#}")))?;
        if output.timed_out {
            return Err(LoadFailure::LoadError(LOAD_TIMEOUT_DETAIL.to_string()));
        }
        match parse_reply(&output) {
            Ok(Reply::Loaded) => {}
            Ok(Reply::SyntaxError { detail }) => return Err(LoadFailure::SyntaxError(detail)),
            Ok(Reply::LoadError { detail }) => return Err(LoadFailure::LoadError(detail)),
            Ok(Reply::NotFound { detail }) => return Err(LoadFailure::FunctionNotFound(detail)),
            Ok(other) => {
                return Err(LoadFailure::LoadError(format!(
                    "unexpected harness reply during load: {other:?}"
                )));
            }
            Err(detail) => return Err(LoadFailure::LoadError(detail)),
        }

        info!(function = %function.name, line = function.line, "candidate loaded");
        Ok(LoadedCandidate {
            source: source.to_string(),
            prelude,
            function,
            added_imports,
            warnings,
            interpreter,
        })
    }
}

/// A candidate that parsed, resolved a target and loaded cleanly.
#[derive(Debug, Clone)]
pub struct LoadedCandidate {
    source: String,
    /// Synthesized imports, run in the module namespace before `source`.
    prelude: String,
    function: FunctionDef,
    added_imports: Vec<String>,
    warnings: Vec<String>,
    interpreter: Interpreter,
}

impl LoadedCandidate {
    pub fn function(&self) -> &FunctionDef {
        &self.function
    }

    pub fn added_imports(&self) -> &[String] {
        &self.added_imports
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl Invoke for LoadedCandidate {
    /// Reload the module in a fresh process and call the target once.
    ///
    /// The budget covers the whole process, module load included.
    fn invoke(&self, args: &[Value], budget: Duration) -> Invocation {
        let payload = json!({
            "mode": "call",
            "prelude": self.prelude,
            "source": self.source,
            "function": self.function.name,
            "args": args,
        });
        let output = match self.interpreter.run(&payload, budget) {
            Ok(output) => output,
            Err(err) => return Invocation::Raised(format!("sandbox unavailable: {err:#}")),
        };
        if output.timed_out {
            return Invocation::TimedOut;
        }
        match parse_reply(&output) {
            Ok(Reply::Returned { value }) => Invocation::Returned(value),
            Ok(Reply::Raised { detail }) => Invocation::Raised(detail),
            // The module loaded once already; failing now means it is not deterministic.
            Ok(Reply::SyntaxError { detail } | Reply::LoadError { detail } | Reply::NotFound { detail }) => {
                Invocation::Raised(format!("candidate failed to reload: {detail}"))
            }
            Ok(Reply::Loaded) => Invocation::Raised("harness skipped the call".to_string()),
            Err(detail) => Invocation::Raised(detail),
        }
    }
}

#[derive(Debug, Clone)]
struct Interpreter {
    python: String,
    output_limit_bytes: usize,
    reply_limit_bytes: usize,
}

impl Interpreter {
    fn run(&self, payload: &Value, timeout: Duration) -> anyhow::Result<CommandOutput> {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-I").arg("-c").arg(HARNESS);
        cmd.current_dir(std::env::temp_dir());
        let mut payload = payload.clone();
        payload["reply_limit"] = json!(self.reply_limit_bytes);
        let input = serde_json::to_vec(&payload)?;
        // The harness keeps its reply line within `reply_limit_bytes`; candidate
        // output that bypasses the capture still counts against the stream cap.
        let stream_limit = self.output_limit_bytes.saturating_add(self.reply_limit_bytes);
        run_command_with_timeout(cmd, Some(&input), timeout, stream_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Reply {
    SyntaxError { detail: String },
    LoadError { detail: String },
    NotFound { detail: String },
    Loaded,
    Raised { detail: String },
    Returned { value: Value },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(flatten)]
    reply: Reply,
    #[serde(default)]
    stdout: String,
}

/// Extract the harness reply from the last marker line of stdout.
fn parse_reply(output: &CommandOutput) -> Result<Reply, String> {
    let stdout = output.stdout_lossy();
    let Some(line) = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_MARKER))
    else {
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        let mut detail = format!("candidate process exited without a result (exit code {code})");
        if let Some(tail) = output.stderr_tail() {
            detail.push_str(": ");
            detail.push_str(&tail);
        }
        return Err(detail);
    };
    let envelope: Envelope = serde_json::from_str(line)
        .map_err(|err| format!("malformed harness reply: {err}"))?;
    if !envelope.stdout.is_empty() {
        debug!(stdout = %envelope.stdout, "candidate wrote to stdout");
    }
    Ok(envelope.reply)
}
