//! Container lifecycle controller.
//!
//! Per job: `Created → Started → {Succeeded | Failed} → Reaped`. Image pull
//! (and registry authentication) happens before anything is created, so a
//! failed pull leaves no container behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::job::{JOB_LABEL, Job};
use crate::error::RuntimeError;
use crate::runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ExitWatch, LogChunk, LogStream,
    RegistryCredentials,
};

/// State of a job container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Started,
    Succeeded,
    Failed,
    /// Container removed after reaching a terminal state.
    Reaped,
}

impl JobState {
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Created, Started)
                | (Created, Failed)
                | (Started, Succeeded)
                | (Started, Failed)
                | (Succeeded, Reaped)
                | (Failed, Reaped)
        )
    }

    /// Succeeded or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Reaped => "reaped",
        };
        write!(f, "{s}")
    }
}

/// Why a job failed.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error("Container exited with non-zero code {0}")]
    NonZeroExit(i64),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Container did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Terminal result of a job.
#[derive(Debug)]
pub enum JobOutcome {
    Succeeded,
    Failed(Failure),
}

impl JobOutcome {
    pub fn from_exit_code(code: i64) -> Self {
        if code == 0 {
            Self::Succeeded
        } else {
            Self::Failed(Failure::NonZeroExit(code))
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            Self::Succeeded => JobState::Succeeded,
            Self::Failed(_) => JobState::Failed,
        }
    }
}

/// Drives containers through their lifecycle on a `ContainerRuntime`.
pub struct LifecycleController {
    runtime: Arc<dyn ContainerRuntime>,
    credentials: Option<Arc<RegistryCredentials>>,
    timeout: Option<Duration>,
}

impl LifecycleController {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            credentials: None,
            timeout: None,
        }
    }

    /// Authenticate with these credentials before every pull.
    pub fn with_credentials(mut self, credentials: Arc<RegistryCredentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Remove containers still running after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Authenticate (when configured) and pull `image`.
    pub async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        if let Some(credentials) = &self.credentials {
            self.runtime.authenticate(credentials).await?;
        }
        self.runtime.pull(image, self.credentials.as_deref()).await
    }

    /// Create the job's container, configured to remove itself on exit.
    pub async fn create(&self, job: &Job) -> Result<ContainerHandle, RuntimeError> {
        let spec = ContainerSpec {
            name: job.container_name(),
            image: job.task.image.clone(),
            command: job.task.command.clone(),
            env: job.env.clone(),
            labels: HashMap::from([(JOB_LABEL.to_string(), job.name.clone())]),
            auto_remove: true,
        };
        self.runtime.create(&spec).await
    }

    pub async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.runtime.start(handle).await
    }

    /// Pull, create and start the job's container.
    ///
    /// The exit watch and the output attachment are set up between create
    /// and start, so a container that exits and removes itself immediately
    /// is still observed. If anything fails after create the container is
    /// removed before returning.
    pub async fn launch(&self, job: &Job) -> Result<RunningContainer, RuntimeError> {
        self.ensure_image(&job.task.image).await?;

        let handle = self.create(job).await?;
        info!(job = %job.name, job_id = %job.id, container = %handle, state = %JobState::Created, "Container created");

        let exit = match self.runtime.watch(&handle).await {
            Ok(exit) => exit,
            Err(e) => {
                self.discard(job, &handle).await;
                return Err(e);
            }
        };

        let logs = match self.runtime.attach(&handle).await {
            Ok(logs) => Some(logs),
            Err(e) => {
                warn!(job = %job.name, container = %handle, error = %e, "Running without container output");
                None
            }
        };

        if let Err(e) = self.start(&handle).await {
            self.discard(job, &handle).await;
            return Err(e);
        }

        let mut running = RunningContainer {
            runtime: Arc::clone(&self.runtime),
            handle,
            job_name: job.name.clone(),
            timeout: self.timeout,
            state: JobState::Created,
            exit,
            logs,
        };
        running.transition(JobState::Started);
        Ok(running)
    }

    async fn discard(&self, job: &Job, handle: &ContainerHandle) {
        if let Err(e) = self.runtime.remove(handle).await {
            warn!(
                job = %job.name,
                container = %handle,
                error = %e,
                "Failed to remove container after launch failure"
            );
        }
    }
}

/// A started container, owned by one job until it is reaped.
pub struct RunningContainer {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
    job_name: String,
    timeout: Option<Duration>,
    state: JobState,
    exit: ExitWatch,
    logs: Option<LogStream>,
}

impl RunningContainer {
    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn transition(&mut self, to: JobState) {
        advance(&self.job_name, &self.handle, &mut self.state, to);
    }

    /// Copy the container's output to this process's stdout/stderr on a
    /// detached task. `None` when there is no output to copy.
    pub fn spawn_log_stream(&mut self) -> Option<JoinHandle<()>> {
        let stream = self.logs.take()?;
        let job = self.job_name.clone();

        Some(tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            let mut stderr = tokio::io::stderr();
            match stream_logs(stream, &mut stdout, &mut stderr).await {
                Ok(()) => debug!(job = %job, "Log stream ended"),
                Err(e) => warn!(job = %job, error = %e, "Log streaming stopped"),
            }
        }))
    }

    /// Wait for the container to stop and classify the result.
    pub async fn wait(self) -> JobOutcome {
        let Self {
            runtime,
            handle,
            job_name,
            timeout,
            mut state,
            exit,
            ..
        } = self;

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, exit).await {
                Ok(result) => result.map_err(Failure::Runtime),
                Err(_) => {
                    warn!(job = %job_name, container = %handle, timeout = ?limit, "Job timed out; removing container");
                    if let Err(e) = runtime.remove(&handle).await {
                        error!(job = %job_name, error = %e, "Failed to remove timed-out container");
                    }
                    Err(Failure::TimedOut(limit))
                }
            },
            None => exit.await.map_err(Failure::Runtime),
        };

        let outcome = match waited {
            Ok(code) => {
                debug!(job = %job_name, exit_code = code, "Container exited");
                JobOutcome::from_exit_code(code)
            }
            Err(failure) => {
                error!(job = %job_name, error = %failure, "Job did not complete normally");
                JobOutcome::Failed(failure)
            }
        };

        advance(&job_name, &handle, &mut state, outcome.state());
        // Auto-remove (or the timeout path) has disposed of the container.
        if state.is_terminal() {
            advance(&job_name, &handle, &mut state, JobState::Reaped);
        }
        outcome
    }
}

fn advance(job: &str, handle: &ContainerHandle, state: &mut JobState, to: JobState) {
    if !state.can_transition_to(to) {
        warn!(job = %job, from = %state, to = %to, "Ignoring invalid job state transition");
        return;
    }
    info!(job = %job, container = %handle, state = %to, "Job state changed");
    *state = to;
}

/// Copy a log stream into separate stdout/stderr sinks until it ends.
pub async fn stream_logs<O, E>(
    mut stream: LogStream,
    stdout: &mut O,
    stderr: &mut E,
) -> anyhow::Result<()>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    while let Some(chunk) = stream.next().await {
        match chunk? {
            LogChunk::Stdout(bytes) => {
                stdout.write_all(&bytes).await.context("writing stdout")?;
                stdout.flush().await.context("flushing stdout")?;
            }
            LogChunk::Stderr(bytes) => {
                stderr.write_all(&bytes).await.context("writing stderr")?;
                stderr.flush().await.context("flushing stderr")?;
            }
        }
    }
    Ok(())
}
