//! Self-verifying code generation loop.
//!
//! A problem description is turned into a fixed test suite, then candidate
//! implementations are generated, verified in a sandbox and debugged until one
//! passes every test or the attempt budget runs out.
//!
//! - **[`core`]**: Pure, deterministic logic (value equality, report building,
//!   failure hints). No I/O.
//! - **[`sandbox`]**: Static inspection of candidate source and isolated
//!   execution, one interpreter process per invocation.
//! - **[`io`]**: Side-effecting operations (configuration, agent processes,
//!   prompt rendering, artifact export).
//! - **[`agents`]**: The collaborators the controller depends on.
//!
//! [`looping`] drives the state machine; [`verify`] is the seam between the
//! controller and the sandbox.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod sandbox;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod verify;
