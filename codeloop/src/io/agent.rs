//! Agent backend abstraction for prompt completion.
//!
//! The [`AgentBackend`] trait decouples the collaborators from the actual
//! model invocation. Tests use scripted backends that return predetermined
//! completions without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentSettings;
use crate::io::process::run_command_with_timeout;

/// Parameters for one completion.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Which collaborator is asking (`tests`, `code`, `debug`), for logs.
    pub role: &'static str,
    /// Prompt text fed to the agent.
    pub prompt: String,
}

/// Abstraction over completion backends.
pub trait AgentBackend {
    /// Return the raw completion text for `request.prompt`.
    fn complete(&self, request: &AgentRequest) -> Result<String>;
}

impl<B: AgentBackend + ?Sized> AgentBackend for &B {
    fn complete(&self, request: &AgentRequest) -> Result<String> {
        (**self).complete(request)
    }
}

/// Backend that pipes the prompt into a configured command and reads stdout.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandBackend {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self::new(
            settings.command.clone(),
            Duration::from_secs(settings.timeout_secs),
            settings.output_limit_bytes,
        )
    }
}

impl AgentBackend for CommandBackend {
    #[instrument(skip_all, fields(role = request.role, prompt_bytes = request.prompt.len()))]
    fn complete(&self, request: &AgentRequest) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        info!(%program, "starting agent");

        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "agent timed out");
            return Err(anyhow!("agent timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            let tail = output.stderr_tail().unwrap_or_default();
            return Err(anyhow!(
                "agent failed with status {:?}: {tail}",
                output.status.code()
            ));
        }
        if output.stdout_truncated > 0 {
            warn!(
                truncated = output.stdout_truncated,
                "agent completion truncated"
            );
        }

        let completion = output.stdout_lossy();
        debug!(bytes = completion.len(), "agent completed");
        Ok(completion)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn backend(script: &str) -> CommandBackend {
        CommandBackend::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(5),
            10_000,
        )
    }

    fn request(prompt: &str) -> AgentRequest {
        AgentRequest {
            role: "code",
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn completion_is_stdout_of_the_command() {
        let completion = backend("tr a-z A-Z").complete(&request("hello")).expect("complete");
        assert_eq!(completion, "HELLO");
    }

    #[test]
    fn non_zero_exit_is_an_error_with_stderr_tail() {
        let err = backend("echo quota exceeded >&2; exit 3")
            .complete(&request("x"))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Some(3)"), "{message}");
        assert!(message.contains("quota exceeded"), "{message}");
    }

    #[test]
    fn timeout_is_an_error() {
        let slow = CommandBackend::new(
            vec!["sh".to_string(), "-c".to_string(), "exec sleep 5".to_string()],
            Duration::from_millis(100),
            100,
        );
        let err = slow.complete(&request("x")).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let empty = CommandBackend::new(Vec::new(), Duration::from_secs(1), 100);
        assert!(empty.complete(&request("x")).is_err());
    }
}
