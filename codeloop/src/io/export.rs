//! Run artifacts written to an output directory.
//!
//! Layout:
//!
//! ```text
//! <out>/tests.json
//! <out>/attempts/<n>/candidate.py
//! <out>/attempts/<n>/report.json
//! <out>/attempts/<n>/feedback.md      (when the debugger produced feedback)
//! <out>/solution.py                   (success)
//! <out>/last_candidate.py             (exhausted, unverified)
//! <out>/failure_report.md             (exhausted)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{Attempt, RunOutcome};

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub candidate_path: PathBuf,
    pub report_path: PathBuf,
    pub feedback_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(out: &Path, index: u32) -> Self {
        let dir = out.join("attempts").join(index.to_string());
        Self {
            candidate_path: dir.join("candidate.py"),
            report_path: dir.join("report.json"),
            feedback_path: dir.join("feedback.md"),
            dir,
        }
    }
}

/// Write every artifact of a finished run under `out`.
pub fn write_outcome(out: &Path, outcome: &RunOutcome) -> Result<()> {
    fs::create_dir_all(out).with_context(|| format!("create output dir {}", out.display()))?;
    write_json(&out.join("tests.json"), &outcome.test_cases)?;
    for attempt in &outcome.history {
        write_attempt(out, attempt)?;
    }
    if let Some(code) = &outcome.final_code {
        let name = if outcome.success { "solution.py" } else { "last_candidate.py" };
        write_text(&out.join(name), &with_newline(code))?;
    }
    if let Some(report) = &outcome.failure_report {
        write_text(&out.join("failure_report.md"), &with_newline(report))?;
    }
    debug!(out = %out.display(), attempts = outcome.history.len(), "wrote run artifacts");
    Ok(())
}

fn write_attempt(out: &Path, attempt: &Attempt) -> Result<AttemptPaths> {
    let paths = AttemptPaths::new(out, attempt.index);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;
    write_text(&paths.candidate_path, &with_newline(&attempt.candidate_code))?;
    write_json(&paths.report_path, &attempt.report)?;
    if let Some(feedback) = &attempt.debug_feedback {
        write_text(&paths.feedback_path, &with_newline(feedback))?;
    }
    Ok(paths)
}

fn with_newline(text: &str) -> String {
    let mut buf = text.to_string();
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
