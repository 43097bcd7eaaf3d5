//! Stable exit codes for verifier CLI commands.

/// Command succeeded; for `run`, the workflow completed.
pub const OK: i32 = 0;
/// Invalid input: unreadable files, bad config, or fatal diagnostics.
pub const INVALID: i32 = 1;
/// A required setup step failed.
pub const SETUP_FAILED: i32 = 2;
/// The gate never passed within `max_iterations`.
pub const EXHAUSTED: i32 = 3;
/// A required completion step failed after the gate passed.
pub const COMPLETION_FAILED: i32 = 4;
/// The run was interrupted between steps.
pub const CANCELLED: i32 = 5;
