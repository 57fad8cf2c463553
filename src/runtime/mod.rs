//! Container runtime port.
//!
//! The job core only talks to `ContainerRuntime`; `DockerRuntime` is the
//! production implementation.

pub mod docker;

pub use docker::DockerRuntime;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::RuntimeError;

/// Runtime-assigned container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for creating one job container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Empty means the image's default command.
    pub command: Vec<String>,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub auto_remove: bool,
}

/// One chunk of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Follows container output until the container exits.
pub type LogStream = BoxStream<'static, Result<LogChunk, RuntimeError>>;

/// Resolves to the exit code once a watched container stops.
pub type ExitWatch = BoxFuture<'static, Result<i64, RuntimeError>>;

/// Registry credentials, in the shape of Docker's `AuthConfig` JSON.
#[derive(Debug, Deserialize)]
pub struct RegistryCredentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "serveraddress")]
    pub server_address: Option<String>,
    #[serde(default, alias = "identitytoken")]
    pub identity_token: Option<SecretString>,
}

impl RegistryCredentials {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// A username with a password, or an identity token.
    pub fn is_complete(&self) -> bool {
        (self.username.is_some() && self.password.is_some()) || self.identity_token.is_some()
    }
}

/// Container engine operations used by the job lifecycle.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check registry credentials before pulling.
    async fn authenticate(&self, credentials: &RegistryCredentials) -> Result<(), RuntimeError>;

    /// Pull `image`, authenticating with `credentials` when given.
    async fn pull(
        &self,
        image: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<(), RuntimeError>;

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError>;

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Register for the container's next exit.
    ///
    /// Called before `start`: an auto-removed container may be gone by the
    /// time `start` returns, and only a watch registered earlier still
    /// learns its exit code.
    async fn watch(&self, handle: &ContainerHandle) -> Result<ExitWatch, RuntimeError>;

    /// Attach to the container's output, stdout and stderr interleaved as
    /// produced. Called before `start` so no early output is lost.
    async fn attach(&self, handle: &ContainerHandle) -> Result<LogStream, RuntimeError>;

    /// Force-remove the container. A container that is already gone is not an error.
    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;
}
