//! Run records under the configured record directory.
//!
//! Layout: `<record_dir>/<run_id>/report.json` plus one
//! `iterations/<n>.json` per verification pass.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::scheduler::RunReport;
use crate::workflow::Workflow;

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub report_path: PathBuf,
    pub iterations_dir: PathBuf,
}

impl RunPaths {
    pub fn new(record_dir: &Path, run_id: &str) -> Self {
        let dir = record_dir.join(run_id);
        Self {
            report_path: dir.join("report.json"),
            iterations_dir: dir.join("iterations"),
            dir,
        }
    }

    pub fn iteration_path(&self, iteration: u32) -> PathBuf {
        self.iterations_dir.join(format!("{iteration}.json"))
    }
}

/// Index entry for a stored run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub workflow: String,
    pub outcome: String,
    pub iterations: usize,
    pub started_at: DateTime<Utc>,
}

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// `run-<utc timestamp>-<8 hex>`.
///
/// The hex digest covers the workflow, the process id and a per-process
/// sequence number, so two runs started in the same millisecond differ.
pub fn generate_run_id(workflow: &Workflow, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(workflow).unwrap_or_default());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hasher.finalize();
    format!(
        "run-{}-{}",
        now.format("%Y%m%dT%H%M%S%3fZ"),
        &hex::encode(digest)[..8]
    )
}

/// Id for a run of `workflow` starting now.
pub fn new_run_id(workflow: &Workflow) -> String {
    generate_run_id(workflow, Utc::now())
}

/// Persist a report and its per-iteration records.
///
/// Fails rather than overwrite when a record for the run id already exists.
pub fn write_run(record_dir: &Path, report: &RunReport) -> Result<RunPaths> {
    let paths = RunPaths::new(record_dir, &report.run_id);
    fs::create_dir_all(record_dir)
        .with_context(|| format!("create record dir {}", record_dir.display()))?;
    match fs::create_dir(&paths.dir) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            bail!("run record {} already exists", paths.dir.display())
        }
        Err(err) => {
            return Err(err).with_context(|| format!("create run dir {}", paths.dir.display()));
        }
    }
    fs::create_dir(&paths.iterations_dir)
        .with_context(|| format!("create {}", paths.iterations_dir.display()))?;

    for iteration in &report.iterations {
        write_json(&paths.iteration_path(iteration.iteration), iteration)?;
    }
    write_json(&paths.report_path, report)?;
    debug!(run_id = %report.run_id, dir = %paths.dir.display(), "run record written");
    Ok(paths)
}

/// Stored report for `run_id`, or `None` when no such run exists.
pub fn load_report(record_dir: &Path, run_id: &str) -> Result<Option<RunReport>> {
    if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id.starts_with('.') {
        return Ok(None);
    }
    let path = RunPaths::new(record_dir, run_id).report_path;
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read report {}", path.display()))?;
    let report = serde_json::from_str(&contents)
        .with_context(|| format!("parse report {}", path.display()))?;
    Ok(Some(report))
}

/// Summaries of every readable run, newest first.
pub fn list_runs(record_dir: &Path) -> Result<Vec<RunSummary>> {
    if !record_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(record_dir)
        .with_context(|| format!("read record dir {}", record_dir.display()))?;

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", record_dir.display()))?;
        let Some(run_id) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        match load_report(record_dir, &run_id) {
            Ok(Some(report)) => runs.push(RunSummary {
                run_id: report.run_id.clone(),
                workflow: report.workflow.clone(),
                outcome: report.outcome.label().to_string(),
                iterations: report.iterations.len(),
                started_at: report.started_at,
            }),
            Ok(None) => {}
            Err(err) => warn!(run_id = %run_id, err = %format!("{err:#}"), "skipping unreadable run"),
        }
    }
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.run_id.cmp(&a.run_id)));
    Ok(runs)
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecutionRecord, GateOutcome};
    use crate::scheduler::{IterationRecord, RunOutcome};
    use chrono::TimeZone;

    fn report(run_id: &str, started_at: DateTime<Utc>) -> RunReport {
        RunReport {
            run_id: run_id.to_string(),
            workflow: "lint".to_string(),
            started_at,
            finished_at: started_at,
            advisories: Vec::new(),
            setup: ExecutionRecord::new(),
            iterations: vec![IterationRecord {
                iteration: 1,
                verification: ExecutionRecord::new(),
                gate: GateOutcome::Pass,
                agentic: ExecutionRecord::new(),
            }],
            completion: ExecutionRecord::new(),
            outcome: RunOutcome::Success { iterations: 1 },
        }
    }

    #[test]
    fn run_ids_are_timestamped_and_hashed() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).single().expect("time");
        let id = generate_run_id(&Workflow::new("wf"), now);
        assert!(id.starts_with("run-20260304T050607000Z-"), "{id}");
        assert_eq!(id.len(), "run-20260304T050607000Z-".len() + 8);
        assert_ne!(id, generate_run_id(&Workflow::new("other"), now));
    }

    #[test]
    fn same_workflow_in_the_same_millisecond_gets_distinct_ids() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).single().expect("time");
        let workflow = Workflow::new("wf");
        let ids: std::collections::HashSet<String> =
            (0..64).map(|_| generate_run_id(&workflow, now)).collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn existing_run_record_is_never_overwritten() {
        let temp = tempfile::tempdir().expect("tempdir");
        let now = Utc::now();
        write_run(temp.path(), &report("run-a", now)).expect("write");

        let mut second = report("run-a", now);
        second.workflow = "other".to_string();
        let err = write_run(temp.path(), &second).expect_err("duplicate id");
        assert!(format!("{err:#}").contains("already exists"));

        let stored = load_report(temp.path(), "run-a").expect("load").expect("present");
        assert_eq!(stored.workflow, "lint");
    }

    #[test]
    fn writes_report_and_iterations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let now = Utc::now();
        let paths = write_run(temp.path(), &report("run-a", now)).expect("write");

        assert!(paths.report_path.is_file());
        assert!(paths.iteration_path(1).is_file());
        let raw = fs::read_to_string(&paths.report_path).expect("read");
        assert!(raw.ends_with("}\n"));
        assert!(raw.contains("\"kind\": \"success\""));

        let loaded = load_report(temp.path(), "run-a").expect("load").expect("present");
        assert_eq!(loaded, report("run-a", now));
    }

    #[test]
    fn missing_and_hostile_run_ids_load_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(load_report(temp.path(), "run-missing").expect("load").is_none());
        assert!(load_report(temp.path(), "../etc").expect("load").is_none());
    }

    #[test]
    fn lists_runs_newest_first_skipping_junk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let older = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("time");
        let newer = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("time");
        write_run(temp.path(), &report("run-old", older)).expect("write");
        write_run(temp.path(), &report("run-new", newer)).expect("write");
        fs::create_dir(temp.path().join("stray")).expect("mkdir");

        let runs = list_runs(temp.path()).expect("list");
        let ids: Vec<&str> = runs.iter().map(|run| run.run_id.as_str()).collect();
        assert_eq!(ids, vec!["run-new", "run-old"]);
        assert_eq!(runs[0].outcome, "success");
        assert_eq!(runs[0].iterations, 1);
    }
}
