//! I/O seams for the verifier: processes, HTTP, files and locks.

pub mod agent;
pub mod command;
pub mod config;
pub mod process;
pub mod run_log;
pub mod session;
pub mod ui_bridge;
pub mod workflow_store;
