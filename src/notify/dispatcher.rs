//! Fire-and-forget notification dispatch.
//!
//! `notify` enqueues onto an unbounded channel drained by one background
//! worker, so callers never wait on the network and events for a job are
//! delivered in the order they were raised.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{LifecycleEvent, Message, Notifier};
use crate::jobs::Job;

struct Delivery {
    job: String,
    target: String,
    message: Message,
}

/// Handle for queueing lifecycle notifications.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl NotificationDispatcher {
    /// Start the delivery worker on the current tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver_loop(notifier, rx));
        Self { tx }
    }

    /// Queue `event` for `job`. A job without a notification target is skipped.
    pub fn notify(&self, job: &Job, event: LifecycleEvent) {
        let Some(target) = job.notify_target() else {
            debug!(job = %job.name, event = event.label(), "No notification target configured");
            return;
        };

        let delivery = Delivery {
            job: job.name.clone(),
            target: target.to_string(),
            message: Message::for_event(&event, &job.name),
        };
        if self.tx.send(delivery).is_err() {
            warn!(job = %job.name, event = event.label(), "Notification worker has stopped; dropping event");
        }
    }
}

async fn deliver_loop(notifier: Arc<dyn Notifier>, mut rx: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(delivery) = rx.recv().await {
        match notifier.deliver(&delivery.target, &delivery.message).await {
            Ok(()) => debug!(job = %delivery.job, title = %delivery.message.title, "Notification delivered"),
            Err(e) => warn!(job = %delivery.job, error = %e, "Failed to deliver notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::NotificationError;
    use crate::tasks::Task;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
        fail_first: Mutex<bool>,
    }

    impl Recorder {
        fn titles(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn deliver(&self, target: &str, message: &Message) -> Result<(), NotificationError> {
            // Uneven latency must not reorder deliveries.
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut fail = self.fail_first.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(NotificationError::RequestFailed {
                    endpoint: "hooks.example".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), message.title.clone()));
            Ok(())
        }
    }

    async fn wait_for_count(recorder: &Recorder, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while recorder.sent.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("notifications not delivered in time");
    }

    fn job_with_target() -> Job {
        Job::new(
            "build",
            Task::new("alpine").with_notify_target("https://hooks.example/abc"),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = NotificationDispatcher::spawn(recorder.clone());
        let job = job_with_target();

        dispatcher.notify(&job, LifecycleEvent::Started);
        dispatcher.notify(&job, LifecycleEvent::Succeeded);
        wait_for_count(&recorder, 2).await;

        assert_eq!(recorder.titles(), vec!["[STARTED] build", "[SUCCEEDED] build"]);
        assert_eq!(
            recorder.sent.lock().unwrap()[0].0,
            "https://hooks.example/abc"
        );
    }

    #[tokio::test]
    async fn no_target_means_no_delivery() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = NotificationDispatcher::spawn(recorder.clone());
        let silent = Job::new("quiet", Task::new("alpine"), Vec::new());

        dispatcher.notify(&silent, LifecycleEvent::Started);
        dispatcher.notify(&job_with_target(), LifecycleEvent::Started);
        wait_for_count(&recorder, 1).await;

        assert_eq!(recorder.titles(), vec!["[STARTED] build"]);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_the_worker() {
        let recorder = Arc::new(Recorder {
            fail_first: Mutex::new(true),
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::spawn(recorder.clone());
        let job = job_with_target();

        dispatcher.notify(&job, LifecycleEvent::Started);
        dispatcher.notify(&job, LifecycleEvent::failed("exit 1"));
        wait_for_count(&recorder, 1).await;

        assert_eq!(recorder.titles(), vec!["[FAILED] build"]);
    }
}
