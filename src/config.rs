//! Configuration types.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::runtime::RegistryCredentials;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default task registry location, relative to the working directory.
pub const DEFAULT_TASKS_PATH: &str = "./tasks.json";

/// Default timeout for a single webhook request.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind (all interfaces when unset).
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Path of the JSON task registry, re-read on every request.
    pub tasks_path: PathBuf,
    /// Registry credentials used before every image pull.
    pub registry_auth: Option<Arc<RegistryCredentials>>,
    /// Deadline after which a running job container is removed.
    pub job_timeout: Option<Duration>,
    /// Timeout for one notification delivery.
    pub notify_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tasks_path: PathBuf::from(DEFAULT_TASKS_PATH),
            registry_auth: None,
            job_timeout: None,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("HOST")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or(defaults.host);

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("{raw:?} is not a valid port"),
            })?,
            None => defaults.port,
        };

        let tasks_path = lookup("STEVED_TASKS")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.tasks_path);

        let registry_auth = match lookup("DOCKER_AUTH") {
            Some(raw) if !raw.trim().is_empty() => {
                let credentials =
                    RegistryCredentials::from_json(&raw).map_err(|e| ConfigError::InvalidValue {
                        key: "DOCKER_AUTH".to_string(),
                        message: e.to_string(),
                    })?;
                Some(Arc::new(credentials))
            }
            _ => None,
        };

        // Zero disables the job deadline.
        let job_timeout = seconds(&lookup, "STEVED_JOB_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let notify_timeout = match seconds(&lookup, "STEVED_NOTIFY_TIMEOUT_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "STEVED_NOTIFY_TIMEOUT_SECS".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.notify_timeout,
        };

        Ok(Self {
            host,
            port,
            tasks_path,
            registry_auth,
            job_timeout,
            notify_timeout,
        })
    }

    /// Address string for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Whole seconds from `key`; unset or blank is `None`.
fn seconds<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{raw:?} is not a whole number of seconds"),
                })
        }
        _ => Ok(None),
    }
}
