//! Task registry loading.
//!
//! The registry file is read again for every resolution, so edits take
//! effect without a restart. Nothing is cached between requests.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use super::model::Task;
use crate::error::ConfigError;

/// Location of the task definitions.
#[derive(Debug, Clone)]
pub struct TaskSource {
    path: PathBuf,
}

impl TaskSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read and parse the registry as it is right now.
    pub async fn load(&self) -> Result<TaskRegistry, ConfigError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigError::Unreadable {
                path: self.path.display().to_string(),
                source,
            })?;
        let registry = TaskRegistry::from_json(&raw)?;
        debug!(
            path = %self.path.display(),
            tasks = registry.len(),
            names = ?registry.names(),
            "Loaded task registry"
        );
        Ok(registry)
    }

    /// Look up `name` in a freshly loaded registry. `Ok(None)` when absent.
    pub async fn resolve(&self, name: &str) -> Result<Option<Task>, ConfigError> {
        Ok(self.load().await?.take(name))
    }
}

/// One loaded snapshot of the task definitions.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Task>,
}

impl TaskRegistry {
    /// Parse a JSON object of `name -> task`. Every task must name an image.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let tasks: HashMap<String, Task> = serde_json::from_str(raw)?;
        Self::from_tasks(tasks)
    }

    pub fn from_tasks(tasks: HashMap<String, Task>) -> Result<Self, ConfigError> {
        if let Some(name) = tasks
            .iter()
            .find(|(_, task)| task.image.trim().is_empty())
            .map(|(name, _)| name.clone())
        {
            return Err(ConfigError::MissingImage { name });
        }
        Ok(Self { tasks })
    }

    /// Move one task out of the snapshot.
    pub fn take(mut self, name: &str) -> Option<Task> {
        self.tasks.remove(name)
    }

    /// Task names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}
