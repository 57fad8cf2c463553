//! Task definition.

use serde::{Deserialize, Deserializer, Serialize};

/// What to run for a named job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Container image reference.
    #[serde(alias = "Image")]
    pub image: String,
    /// Command arguments; empty means the image's default command.
    #[serde(
        default,
        alias = "cmd",
        alias = "Cmd",
        deserialize_with = "null_as_empty"
    )]
    pub command: Vec<String>,
    /// Notification destination (Slack webhook URL). `None` disables notifications.
    #[serde(
        default,
        rename = "notify",
        alias = "notifyTarget",
        alias = "slack",
        alias = "Slack",
        skip_serializing_if = "Option::is_none"
    )]
    pub notify_target: Option<String>,
}

impl Task {
    /// Create a task for `image` with the image's default command.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: Vec::new(),
            notify_target: None,
        }
    }

    /// Set the command arguments.
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set the notification target.
    pub fn with_notify_target(mut self, target: impl Into<String>) -> Self {
        self.notify_target = Some(target.into());
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_fields() {
        let task: Task = serde_json::from_str(
            r#"{"image": "alpine:latest", "command": ["echo", "hi"], "notify": "https://hooks.example/x"}"#,
        )
        .unwrap();
        assert_eq!(
            task,
            Task::new("alpine:latest")
                .with_command(["echo", "hi"])
                .with_notify_target("https://hooks.example/x")
        );
    }

    #[test]
    fn parses_legacy_capitalized_fields() {
        let task: Task = serde_json::from_str(
            r#"{"Image": "busybox", "Cmd": ["true"], "Slack": "https://hooks.slack.com/services/T/B/X"}"#,
        )
        .unwrap();
        assert_eq!(task.image, "busybox");
        assert_eq!(task.command, vec!["true"]);
        assert_eq!(
            task.notify_target.as_deref(),
            Some("https://hooks.slack.com/services/T/B/X")
        );
    }

    #[test]
    fn null_or_missing_command_means_image_default() {
        let task: Task = serde_json::from_str(r#"{"image": "busybox", "Cmd": null}"#).unwrap();
        assert!(task.command.is_empty());

        let task: Task = serde_json::from_str(r#"{"image": "busybox"}"#).unwrap();
        assert!(task.command.is_empty());
        assert!(task.notify_target.is_none());
    }

    #[test]
    fn image_is_required() {
        let result = serde_json::from_str::<Task>(r#"{"command": ["echo"]}"#);
        assert!(result.is_err());
    }
}
