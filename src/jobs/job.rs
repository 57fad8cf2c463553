//! Job: one execution of a task.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EnvError;
use crate::tasks::Task;

/// Prefix of every job container name.
pub const CONTAINER_NAME_PREFIX: &str = "steved-job-";

/// Label carrying the job name on every job container.
pub const JOB_LABEL: &str = "steved.job";

/// A task snapshot plus the environment it runs with.
#[derive(Debug, Clone)]
pub struct Job {
    /// Correlates log lines of one execution; not used for admission control.
    pub id: Uuid,
    /// Task name this job was spawned from.
    pub name: String,
    /// Task definition as resolved at spawn time.
    pub task: Task,
    /// `KEY=VALUE` pairs passed to the container.
    pub env: Vec<String>,
    pub spawned_at: DateTime<Utc>,
}

impl Job {
    pub fn new(name: impl Into<String>, task: Task, env: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            task,
            env,
            spawned_at: Utc::now(),
        }
    }

    /// Deterministic container name for this job.
    pub fn container_name(&self) -> String {
        format!("{CONTAINER_NAME_PREFIX}{}", self.name)
    }

    pub fn notify_target(&self) -> Option<&str> {
        self.task.notify_target.as_deref()
    }
}

/// Turn a request's variable mapping into `KEY=VALUE` strings, sorted by key.
pub fn build_env(vars: &HashMap<String, String>) -> Result<Vec<String>, EnvError> {
    let mut keys: Vec<&String> = vars.keys().collect();
    keys.sort();

    keys.into_iter()
        .map(|key| {
            if key.is_empty() {
                return Err(EnvError::EmptyKey);
            }
            if key.contains('=') {
                return Err(EnvError::InvalidKey { key: key.clone() });
            }
            Ok(format!("{key}={}", vars[key]))
        })
        .collect()
}
