//! Lifecycle notifications.
//!
//! Notification is strictly observational: `NotificationDispatcher::notify`
//! never blocks and never fails, and delivery errors stay inside this module.

pub mod dispatcher;
pub mod slack;

pub use dispatcher::NotificationDispatcher;
pub use slack::SlackWebhook;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::NotificationError;
use crate::jobs::JobOutcome;

/// Notification-worthy job transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started,
    Succeeded,
    Failed { detail: String },
}

impl LifecycleEvent {
    pub fn failed(detail: impl ToString) -> Self {
        Self::Failed {
            detail: detail.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed { .. } => "FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Started => Severity::Info,
            Self::Succeeded => Severity::Positive,
            Self::Failed { .. } => Severity::Negative,
        }
    }
}

impl From<&JobOutcome> for LifecycleEvent {
    fn from(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Succeeded => Self::Succeeded,
            JobOutcome::Failed(failure) => Self::failed(failure),
        }
    }
}

/// Color coding of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Positive,
    Negative,
}

impl Severity {
    /// Slack attachment color.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Info => "#28d7e5",
            Self::Positive => "good",
            Self::Negative => "danger",
        }
    }
}

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub title: String,
    pub body: Option<String>,
    pub severity: Severity,
}

impl Message {
    pub fn for_event(event: &LifecycleEvent, job_name: &str) -> Self {
        let body = match event {
            LifecycleEvent::Failed { detail } => Some(detail.clone()),
            _ => None,
        };
        Self {
            title: format!("[{}] {job_name}", event.label()),
            body,
            severity: event.severity(),
        }
    }
}

/// Delivers a message to an external destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, target: &str, message: &Message) -> Result<(), NotificationError>;
}
