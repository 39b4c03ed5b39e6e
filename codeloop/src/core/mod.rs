//! Deterministic, pure logic shared by the controller and the sandbox.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod equality;
pub mod fault;
pub mod hints;
pub mod report;
pub mod text;
pub mod types;
