//! Stable exit codes for codeloop CLI commands.

/// Command succeeded: the run or verification passed, or init wrote its file.
pub const OK: i32 = 0;
/// Invalid input, configuration or environment; no verdict was reached.
pub const INVALID: i32 = 1;
/// Verification failed or the attempt budget was exhausted.
pub const FAILED: i32 = 2;
