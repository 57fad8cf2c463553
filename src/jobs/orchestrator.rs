//! Job orchestrator: the `spawn` entry point.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use super::guard::RunGuard;
use super::job::{Job, build_env};
use super::lifecycle::LifecycleController;
use crate::error::Result;
use crate::notify::{LifecycleEvent, NotificationDispatcher};
use crate::runtime::ContainerHandle;
use crate::tasks::TaskSource;

/// A job whose container has been started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub job_id: Uuid,
    pub container: ContainerHandle,
}

/// Non-error results of `spawn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    Accepted(Accepted),
    /// No task with that name.
    NotFound,
    /// A job with that name is already running.
    Conflict,
}

/// Resolves, admits and launches jobs.
pub struct JobOrchestrator {
    tasks: TaskSource,
    guard: Arc<RunGuard>,
    controller: Arc<LifecycleController>,
    notifier: NotificationDispatcher,
}

impl JobOrchestrator {
    pub fn new(
        tasks: TaskSource,
        controller: LifecycleController,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            tasks,
            guard: RunGuard::new(),
            controller: Arc::new(controller),
            notifier,
        }
    }

    pub fn tasks(&self) -> &TaskSource {
        &self.tasks
    }

    pub fn guard(&self) -> &Arc<RunGuard> {
        &self.guard
    }

    /// Start a job for task `name` with extra environment `env`.
    ///
    /// Returns once the container is running; log streaming and completion
    /// handling continue on background tasks. The run-guard claim is held
    /// until the container finishes and is released on every path.
    pub async fn spawn(&self, name: &str, env: &HashMap<String, String>) -> Result<SpawnOutcome> {
        let Some(task) = self.tasks.resolve(name).await? else {
            info!(job = %name, "Unknown task");
            return Ok(SpawnOutcome::NotFound);
        };
        let env = build_env(env)?;

        let claim = match self.guard.try_claim(name) {
            Ok(claim) => claim,
            Err(conflict) => {
                info!(job = %name, "{conflict}");
                return Ok(SpawnOutcome::Conflict);
            }
        };

        let job = Job::new(name, task, env);
        info!(job = %job.name, job_id = %job.id, image = %job.task.image, "Spawning job");
        self.notifier.notify(&job, LifecycleEvent::Started);

        let mut running = match self.controller.launch(&job).await {
            Ok(running) => running,
            Err(e) => {
                error!(job = %job.name, job_id = %job.id, error = %e, "Failed to launch job");
                self.notifier.notify(&job, LifecycleEvent::failed(&e));
                claim.release();
                return Err(e.into());
            }
        };

        let accepted = Accepted {
            job_id: job.id,
            container: running.handle().clone(),
        };

        info!(job = %job.name, job_id = %job.id, container = %accepted.container, state = %running.state(), "Job accepted");
        running.spawn_log_stream();

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let outcome = running.wait().await;
            let elapsed = Utc::now() - job.spawned_at;
            info!(
                job = %job.name,
                job_id = %job.id,
                state = %outcome.state(),
                elapsed_ms = elapsed.num_milliseconds(),
                "Job finished"
            );
            notifier.notify(&job, LifecycleEvent::from(&outcome));
            claim.release();
        });

        Ok(SpawnOutcome::Accepted(accepted))
    }
}
