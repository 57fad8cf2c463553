//! In-process fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tempfile::NamedTempFile;
use tokio::sync::oneshot;

use steved::error::{NotificationError, RuntimeError};
use steved::jobs::{JobOrchestrator, LifecycleController};
use steved::notify::{Message, NotificationDispatcher, Notifier};
use steved::runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ExitWatch, LogChunk, LogStream,
    RegistryCredentials,
};
use steved::tasks::TaskSource;

/// Maximum time any test is allowed to wait for background work.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const TASKS: &str = r#"{
    "build": {"image": "alpine:latest", "command": ["echo", "hi"], "notify": "https://hooks.example/services/build"},
    "quiet": {"image": "alpine:latest"}
}"#;

struct FakeContainer {
    id: String,
    name: String,
    exit_tx: Option<oneshot::Sender<i64>>,
    removed: bool,
}

/// Container runtime whose containers exit when the test says so.
///
/// Containers behave as if auto-removed: once one exits it is gone, and a
/// `watch` issued afterwards fails with "No such container".
#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<ContainerSpec>>,
    next_id: AtomicUsize,
    containers: Mutex<Vec<FakeContainer>>,
    exit_on_start: Mutex<Option<i64>>,
    pub fail_pull: AtomicBool,
    pub fail_start: AtomicBool,
}

fn no_such_container(id: &str) -> RuntimeError {
    RuntimeError::Wait {
        id: id.to_string(),
        reason: format!("No such container: {id}"),
    }
}

impl FakeRuntime {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<ContainerSpec> {
        self.created.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Make every container exit with `code` before `start` returns.
    pub fn exit_on_start(&self, code: i64) {
        *self.exit_on_start.lock().unwrap() = Some(code);
    }

    /// Make the live container named `name` exit with `code`.
    pub fn exit(&self, name: &str, code: i64) {
        self.finish(|c| c.name == name, Some(code));
    }

    /// Drop the container's exit channel, as if the engine connection died.
    pub fn lose(&self, name: &str) {
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| c.name == name && !c.removed)
            .unwrap_or_else(|| panic!("no running container named {name}"));
        container.exit_tx.take();
    }

    fn finish(&self, matches: impl Fn(&FakeContainer) -> bool, code: Option<i64>) {
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| !c.removed && matches(c))
            .expect("no matching live container");
        container.removed = true;
        if let (Some(tx), Some(code)) = (container.exit_tx.take(), code) {
            let _ = tx.send(code);
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn authenticate(&self, _: &RegistryCredentials) -> Result<(), RuntimeError> {
        self.record("authenticate".to_string());
        Ok(())
    }

    async fn pull(
        &self,
        image: &str,
        _: Option<&RegistryCredentials>,
    ) -> Result<(), RuntimeError> {
        self.record(format!("pull {image}"));
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(RuntimeError::Pull {
                image: image.to_string(),
                reason: "pull access denied".to_string(),
            });
        }
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        self.record(format!("create {}", spec.name));
        let id = format!("ctr-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.containers.lock().unwrap().push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            exit_tx: None,
            removed: false,
        });
        self.created.lock().unwrap().push(spec.clone());
        Ok(ContainerHandle::new(id))
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.record(format!("start {handle}"));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RuntimeError::Start {
                id: handle.id().to_string(),
                reason: "OCI runtime create failed".to_string(),
            });
        }
        let exit_on_start = *self.exit_on_start.lock().unwrap();
        if let Some(code) = exit_on_start {
            self.finish(|c| c.id == handle.id(), Some(code));
        }
        Ok(())
    }

    async fn watch(&self, handle: &ContainerHandle) -> Result<ExitWatch, RuntimeError> {
        self.record(format!("watch {handle}"));
        let id = handle.id().to_string();
        let rx = {
            let mut containers = self.containers.lock().unwrap();
            let container = containers
                .iter_mut()
                .find(|c| c.id == id && !c.removed)
                .ok_or_else(|| no_such_container(&id))?;
            let (tx, rx) = oneshot::channel();
            container.exit_tx = Some(tx);
            rx
        };
        Ok(async move {
            rx.await.map_err(|_| RuntimeError::Wait {
                id,
                reason: "connection to engine lost".to_string(),
            })
        }
        .boxed())
    }

    async fn attach(&self, handle: &ContainerHandle) -> Result<LogStream, RuntimeError> {
        self.record(format!("attach {handle}"));
        Ok(futures::stream::iter(vec![Ok(LogChunk::Stdout(b"hi\n".to_vec()))]).boxed())
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.record(format!("remove {handle}"));
        let mut containers = self.containers.lock().unwrap();
        if let Some(container) = containers.iter_mut().find(|c| c.id == handle.id()) {
            container.removed = true;
            container.exit_tx.take();
        }
        Ok(())
    }
}

/// Notifier recording every delivery attempt.
#[derive(Default)]
pub struct RecordingNotifier {
    attempts: Mutex<Vec<Message>>,
    pub unreachable: bool,
}

impl RecordingNotifier {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.title).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, _target: &str, message: &Message) -> Result<(), NotificationError> {
        self.attempts.lock().unwrap().push(message.clone());
        if self.unreachable {
            return Err(NotificationError::RequestFailed {
                endpoint: "hooks.example".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

/// An orchestrator wired to fakes and a temporary task file.
pub struct Harness {
    pub orchestrator: Arc<JobOrchestrator>,
    pub runtime: Arc<FakeRuntime>,
    pub notifier: Arc<RecordingNotifier>,
    tasks: NamedTempFile,
}

impl Harness {
    pub fn new(tasks_json: &str) -> Self {
        Self::with_notifier(tasks_json, RecordingNotifier::default())
    }

    /// Must be called inside a tokio runtime (starts the notification worker).
    pub fn with_notifier(tasks_json: &str, notifier: RecordingNotifier) -> Self {
        let mut tasks = NamedTempFile::new().unwrap();
        tasks.write_all(tasks_json.as_bytes()).unwrap();
        tasks.flush().unwrap();

        let runtime = Arc::new(FakeRuntime::default());
        let notifier = Arc::new(notifier);
        let orchestrator = JobOrchestrator::new(
            TaskSource::new(tasks.path()),
            LifecycleController::new(runtime.clone()),
            NotificationDispatcher::spawn(notifier.clone()),
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            runtime,
            notifier,
            tasks,
        }
    }

    pub fn tasks_path(&self) -> &Path {
        self.tasks.path()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.orchestrator.guard().is_running(name)
    }
}

/// Poll `condition` until it holds, panicking after `TEST_TIMEOUT`.
pub async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let result = tokio::time::timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for: {what}");
}

pub fn no_env() -> HashMap<String, String> {
    HashMap::new()
}
