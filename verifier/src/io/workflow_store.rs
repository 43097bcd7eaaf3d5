//! Workflow load/save helpers with schema validation.
//!
//! The schema only rejects shape errors (wrong JSON types, steps without
//! `id`/`type`). Everything semantic is left to the validator so that it can
//! be reported as diagnostics instead of load failures.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::io::config::write_atomic;
use crate::workflow::Workflow;

const WORKFLOW_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/workflow.v1.schema.json"
));

/// Load a workflow from disk (schema check, then typed parse).
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read workflow {}", path.display()))?;
    parse_workflow(&contents).with_context(|| format!("load workflow {}", path.display()))
}

/// Parse workflow JSON text.
pub fn parse_workflow(contents: &str) -> Result<Workflow> {
    let value: Value = serde_json::from_str(contents).context("parse workflow json")?;
    workflow_from_value(value)
}

/// Typed workflow from an already-parsed JSON value.
pub fn workflow_from_value(value: Value) -> Result<Workflow> {
    validate_schema(&value)?;
    let workflow: Workflow = serde_json::from_value(value).context("deserialize workflow")?;
    debug!(workflow = %workflow.name, "workflow loaded");
    Ok(workflow)
}

/// Write a workflow as pretty JSON with a trailing newline.
pub fn write_workflow(path: &Path, workflow: &Workflow) -> Result<()> {
    write_atomic(path, &render_workflow(workflow)?)
}

pub fn render_workflow(workflow: &Workflow) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(workflow).context("serialize workflow")?;
    buf.push('\n');
    Ok(buf)
}

fn validate_schema(workflow: &Value) -> Result<()> {
    let schema_value: Value =
        serde_json::from_str(WORKFLOW_SCHEMA).context("parse embedded workflow schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema_value)
        .context("compile workflow schema")?;
    if !compiled.is_valid(workflow) {
        let messages = compiled
            .iter_errors(workflow)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "workflow schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
