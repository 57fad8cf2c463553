//! Error types for steved.

/// Top-level error returned by job spawning.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Invalid environment: {0}")]
    Environment(#[from] EnvError),
}

/// Configuration and task-registry errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read task registry {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse task registry: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Task {name} has no image")]
    MissingImage { name: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Container runtime errors (pull, create, start, wait, ...).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Failed to connect to container runtime: {0}")]
    Connect(String),

    #[error("Registry authentication failed: {reason}")]
    Auth { reason: String },

    #[error("Failed to pull image '{image}': {reason}")]
    Pull { image: String, reason: String },

    #[error("Failed to create container '{name}': {reason}")]
    Create { name: String, reason: String },

    #[error("Failed to start container '{id}': {reason}")]
    Start { id: String, reason: String },

    #[error("Failed to read logs of container '{id}': {reason}")]
    Logs { id: String, reason: String },

    #[error("Failed to wait for container '{id}': {reason}")]
    Wait { id: String, reason: String },

    #[error("Failed to remove container '{id}': {reason}")]
    Remove { id: String, reason: String },
}

/// Notification delivery errors. Never propagated past the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Notification endpoint {endpoint} rejected message with status {status}")]
    Rejected { endpoint: String, status: u16 },
}

/// Request environment errors.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("environment variable name must not be empty")]
    EmptyKey,

    #[error("environment variable name {key:?} must not contain '='")]
    InvalidKey { key: String },
}

/// Result type alias for steved.
pub type Result<T> = std::result::Result<T, Error>;
