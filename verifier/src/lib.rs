//! Workflow verification engine.
//!
//! A workflow is four ordered step lists (setup, verification, agentic,
//! completion). Verification and agentic alternate until a terminal gate
//! reports every required check passing, bounded by `max_iterations`. The
//! crate validates workflows, hardens drafts into ones whose verification is
//! deterministic, and executes them. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (validator, hardener, gate,
//!   phase transitions). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (processes, UI-bridge HTTP calls,
//!   agent invocation, config and run records). Isolated behind traits so
//!   tests can script them.
//!
//! Orchestration modules ([`prepare`], [`scheduler`]) combine core logic with
//! I/O to implement the CLI commands and the HTTP service.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod prepare;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
