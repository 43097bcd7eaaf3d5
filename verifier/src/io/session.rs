//! Process-wide lock on the shared browser session.
//!
//! The UI bridge drives one browser. Concurrent workflow runs in the same
//! process that touch it take turns through a [`BrowserSession`].

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct BrowserSession {
    lock: Arc<Mutex<()>>,
}

/// Held for the duration of a run; dropping it releases the browser.
pub type SessionGuard<'a> = MutexGuard<'a, ()>;

impl BrowserSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the browser is free.
    pub fn acquire(&self) -> SessionGuard<'_> {
        debug!("waiting for browser session");
        // The mutex guards no data, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
