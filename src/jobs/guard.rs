//! Run guard: at most one running job per task name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// A claim was refused because the name is already running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Job {name} is already running")]
pub struct Conflict {
    pub name: String,
}

/// Snapshot entry of a running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningJob {
    pub name: String,
    pub since: DateTime<Utc>,
}

/// Set of task names with an in-flight job.
#[derive(Debug, Default)]
pub struct RunGuard {
    running: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RunGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claim `name`. The returned `Claim` releases it when dropped.
    pub fn try_claim(self: &Arc<Self>, name: &str) -> Result<Claim, Conflict> {
        let mut running = self.lock();
        if running.contains_key(name) {
            return Err(Conflict {
                name: name.to_string(),
            });
        }
        running.insert(name.to_string(), Utc::now());
        debug!(job = %name, "Claimed job name");

        Ok(Claim {
            guard: Arc::clone(self),
            name: name.to_string(),
            released: false,
        })
    }

    /// Remove `name`. Returns `false` if it was not claimed.
    pub fn release(&self, name: &str) -> bool {
        let removed = self.lock().remove(name).is_some();
        if removed {
            debug!(job = %name, "Released job name");
        }
        removed
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Running jobs sorted by name.
    pub fn running(&self) -> Vec<RunningJob> {
        let mut jobs: Vec<RunningJob> = self
            .lock()
            .iter()
            .map(|(name, since)| RunningJob {
                name: name.clone(),
                since: *since,
            })
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }
}

/// Exclusive hold on a task name. Released exactly once: explicitly or on drop.
#[derive(Debug)]
pub struct Claim {
    guard: Arc<RunGuard>,
    name: String,
    released: bool,
}

impl Claim {
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.guard.release(&self.name);
        }
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.release_once();
    }
}
