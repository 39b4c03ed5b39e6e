//! Loop configuration stored in `codeloop.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::sandbox::SandboxConfig;

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE: &str = "codeloop.toml";

/// Loop configuration (TOML).
///
/// Edited by humans; missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Upper bound on code-generation attempts per run.
    pub max_attempts: u32,

    /// Number of test cases requested from the test generator.
    pub test_count: usize,

    pub sandbox: SandboxSettings,

    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxSettings {
    /// Interpreter used for load checks and test invocations.
    pub python: String,

    /// Budget for module-level execution of a candidate.
    pub load_timeout_secs: u64,

    /// Budget for one test invocation, load included.
    pub test_timeout_secs: u64,

    /// Truncate interpreter stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Largest encoded reply (return value included) accepted from a test.
    pub reply_limit_bytes: usize,

    /// Function under test. Resolved by convention when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_function: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentSettings {
    /// Command that reads a prompt on stdin and writes a completion to stdout.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    pub output_limit_bytes: usize,

    /// Rendered prompts are cut down to this many bytes.
    pub prompt_budget_bytes: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            test_count: 8,
            sandbox: SandboxSettings::default(),
            agent: AgentSettings::default(),
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            load_timeout_secs: 10,
            test_timeout_secs: 5,
            output_limit_bytes: 100_000,
            reply_limit_bytes: 10_000_000,
            target_function: None,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 120,
            output_limit_bytes: 200_000,
            prompt_budget_bytes: 40_000,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.test_count == 0 {
            return Err(anyhow!("test_count must be > 0"));
        }
        if self.sandbox.python.trim().is_empty() {
            return Err(anyhow!("sandbox.python must be non-empty"));
        }
        if self.sandbox.load_timeout_secs == 0 {
            return Err(anyhow!("sandbox.load_timeout_secs must be > 0"));
        }
        if self.sandbox.test_timeout_secs == 0 {
            return Err(anyhow!("sandbox.test_timeout_secs must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        if self.sandbox.reply_limit_bytes == 0 {
            return Err(anyhow!("sandbox.reply_limit_bytes must be > 0"));
        }
        if self
            .sandbox
            .target_function
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(anyhow!("sandbox.target_function must be non-empty when set"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.agent.prompt_budget_bytes == 0 {
            return Err(anyhow!("agent.prompt_budget_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            python: self.sandbox.python.clone(),
            load_timeout: Duration::from_secs(self.sandbox.load_timeout_secs),
            test_timeout: Duration::from_secs(self.sandbox.test_timeout_secs),
            output_limit_bytes: self.sandbox.output_limit_bytes,
            reply_limit_bytes: self.sandbox.reply_limit_bytes,
            target_function: self.sandbox.target_function.clone(),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LoopConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join(CONFIG_FILE);
        let mut cfg = LoopConfig::default();
        cfg.sandbox.target_function = Some("solve".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "max_attempts = 3\n\n[sandbox]\ntest_timeout_secs = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.test_count, 8);
        assert_eq!(cfg.sandbox.test_timeout_secs, 2);
        assert_eq!(cfg.sandbox.python, "python3");
        assert_eq!(cfg.agent, AgentSettings::default());
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "max_attempts = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_attempts must be > 0"));
    }

    #[test]
    fn sandbox_config_converts_seconds() {
        let cfg = LoopConfig::default().sandbox_config();
        assert_eq!(cfg.test_timeout, Duration::from_secs(5));
        assert_eq!(cfg.load_timeout, Duration::from_secs(10));
        assert_eq!(cfg.target_function, None);
    }
}
