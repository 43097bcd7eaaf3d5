//! Shared application state for the API server.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use verifier::io::config::VerifierConfig;
use verifier::io::session::BrowserSession;
use verifier::scheduler::CancelFlag;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Working directory for command and agent steps.
    pub project_dir: PathBuf,
    pub config: Arc<VerifierConfig>,
    /// One browser shared by every run this server executes.
    pub session: BrowserSession,
    pub active_runs: ActiveRuns,
}

/// Cancel flags of the runs currently executing, by run id.
#[derive(Clone, Default)]
pub struct ActiveRuns {
    runs: Arc<Mutex<HashMap<String, CancelFlag>>>,
}

impl ActiveRuns {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancelFlag>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `run_id` and return the flag its run must observe.
    pub fn start(&self, run_id: &str) -> CancelFlag {
        let cancel = CancelFlag::new();
        self.lock().insert(run_id.to_string(), cancel.clone());
        cancel
    }

    pub fn finish(&self, run_id: &str) {
        self.lock().remove(run_id);
    }

    /// Request cancellation; false when no such run is executing.
    pub fn stop(&self, run_id: &str) -> bool {
        match self.lock().get(run_id) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of executing runs, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl AppState {
    pub fn new(project_dir: PathBuf, config: VerifierConfig) -> Self {
        Self {
            project_dir,
            config: Arc::new(config),
            session: BrowserSession::new(),
            active_runs: ActiveRuns::default(),
        }
    }

    /// Run record directory, resolved against the project directory.
    pub fn record_dir(&self) -> PathBuf {
        self.project_dir.join(&self.config.record_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_dir_is_relative_to_the_project() {
        let state = AppState::new(PathBuf::from("/srv/app"), VerifierConfig::default());
        assert_eq!(state.record_dir(), PathBuf::from("/srv/app/.verifier/runs"));

        let mut config = VerifierConfig::default();
        config.record_dir = PathBuf::from("/var/runs");
        let state = AppState::new(PathBuf::from("/srv/app"), config);
        assert_eq!(state.record_dir(), PathBuf::from("/var/runs"));
    }

    #[test]
    fn stopping_flags_only_registered_runs() {
        let runs = ActiveRuns::default();
        let cancel = runs.start("run-a");
        assert_eq!(runs.ids(), vec!["run-a"]);

        assert!(!runs.stop("run-b"));
        assert!(!cancel.is_cancelled());
        assert!(runs.stop("run-a"));
        assert!(cancel.is_cancelled());

        runs.finish("run-a");
        assert!(runs.ids().is_empty());
        assert!(!runs.stop("run-a"));
    }
}
