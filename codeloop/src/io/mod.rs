//! I/O helpers for the loop and the CLI.

pub mod agent;
pub mod config;
pub mod export;
pub mod process;
pub mod prompt;
