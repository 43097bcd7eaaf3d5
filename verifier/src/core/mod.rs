//! Deterministic, pure logic shared by the verifier.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! workflows and return deterministic outputs suitable for tests.

pub mod coverage;
pub mod gate;
pub mod hardener;
pub mod ids;
pub mod phases;
pub mod shell;
pub mod substance;
pub mod types;
pub mod validator;
