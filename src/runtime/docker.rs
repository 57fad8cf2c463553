//! Docker runtime adapter built on bollard.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use futures::{FutureExt, StreamExt};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ExitWatch, LogChunk, LogStream,
    RegistryCredentials,
};
use crate::error::RuntimeError;

/// Talks to the local Docker engine.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the local defaults (`DOCKER_HOST` or the platform socket).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        info!("Docker runtime client initialized");
        Ok(Self { docker })
    }
}

fn docker_credentials(credentials: &RegistryCredentials) -> DockerCredentials {
    DockerCredentials {
        username: credentials.username.clone(),
        password: credentials
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_string()),
        email: credentials.email.clone(),
        serveraddress: credentials.server_address.clone(),
        identitytoken: credentials
            .identity_token
            .as_ref()
            .map(|t| t.expose_secret().to_string()),
        ..Default::default()
    }
}

fn is_not_found(error: &DockerError) -> bool {
    matches!(
        error,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn authenticate(&self, credentials: &RegistryCredentials) -> Result<(), RuntimeError> {
        // The engine verifies the credentials themselves when they are sent
        // with the pull; here we only refuse credentials that cannot work.
        if !credentials.is_complete() {
            return Err(RuntimeError::Auth {
                reason: "credentials need a username and password or an identity token"
                    .to_string(),
            });
        }
        self.docker.ping().await.map_err(|e| RuntimeError::Auth {
            reason: format!("engine unreachable: {e}"),
        })?;
        debug!(
            registry = credentials.server_address.as_deref().unwrap_or("default"),
            "Registry credentials accepted"
        );
        Ok(())
    }

    async fn pull(
        &self,
        image: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream =
            self.docker
                .create_image(Some(options), None, credentials.map(docker_credentials));

        while let Some(progress) = stream.next().await {
            progress.map_err(|e| RuntimeError::Pull {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }

        debug!(image, "Image pulled");
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            host_config: Some(HostConfig {
                auto_remove: Some(spec.auto_remove),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::Create {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, warning = %warning, "Docker create warning");
        }

        Ok(ContainerHandle::new(response.id))
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.docker
            .start_container(handle.id(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::Start {
                id: handle.id().to_string(),
                reason: e.to_string(),
            })
    }

    async fn watch(&self, handle: &ContainerHandle) -> Result<ExitWatch, RuntimeError> {
        let docker = self.docker.clone();
        let id = handle.id().to_string();

        // `next-exit` on a created container waits for the exit after start;
        // `not-running` would return at once. The request goes out from its
        // own task now, ahead of the attach round trip and the start call.
        let waiter = tokio::spawn(async move {
            let options = WaitContainerOptions {
                condition: "next-exit",
            };
            let mut stream = docker.wait_container(&id, Some(options));
            exit_code(&id, stream.next().await)
        });

        let id = handle.id().to_string();
        Ok(async move {
            waiter.await.map_err(|e| RuntimeError::Wait {
                id,
                reason: format!("wait task ended abnormally: {e}"),
            })?
        }
        .boxed())
    }

    async fn attach(&self, handle: &ContainerHandle) -> Result<LogStream, RuntimeError> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            ..Default::default()
        };
        let AttachContainerResults { output, .. } = self
            .docker
            .attach_container(handle.id(), Some(options))
            .await
            .map_err(|e| RuntimeError::Logs {
                id: handle.id().to_string(),
                reason: e.to_string(),
            })?;

        let id = handle.id().to_string();
        Ok(output
            .map(move |item| match item {
                Ok(LogOutput::StdErr { message }) => Ok(LogChunk::Stderr(message.to_vec())),
                Ok(output) => Ok(LogChunk::Stdout(output.into_bytes().to_vec())),
                Err(e) => Err(RuntimeError::Logs {
                    id: id.clone(),
                    reason: e.to_string(),
                }),
            })
            .boxed())
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(handle.id(), Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(RuntimeError::Remove {
                id: handle.id().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Exit code from the first item of a wait stream.
fn exit_code(
    id: &str,
    item: Option<Result<bollard::models::ContainerWaitResponse, DockerError>>,
) -> Result<i64, RuntimeError> {
    match item {
        Some(Ok(response)) => Ok(response.status_code),
        // bollard reports a non-zero exit as an error carrying the code.
        Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
        Some(Err(e)) => Err(RuntimeError::Wait {
            id: id.to_string(),
            reason: e.to_string(),
        }),
        None => Err(RuntimeError::Wait {
            id: id.to_string(),
            reason: "wait stream ended without an exit status".to_string(),
        }),
    }
}
