use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::clients::notifier::NotificationPublisher;

const PROMPT_PREVIEW_CHARS: usize = 100;

/// Fire-and-forget user notifications. Without a publisher every send is a no-op.
#[derive(Clone, Default)]
pub struct Notifier {
    publisher: Option<Arc<dyn NotificationPublisher>>,
}

impl Notifier {
    #[must_use]
    pub fn new(publisher: Option<Arc<dyn NotificationPublisher>>) -> Self {
        Self { publisher }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    pub fn welcome(&self, username: &str) -> Option<JoinHandle<()>> {
        self.send(
            "Welcome to AI Image Generator",
            format!("Welcome {username}! Your account has been created successfully."),
        )
    }

    pub fn generation_complete(&self, prompt: &str) -> Option<JoinHandle<()>> {
        let preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        self.send(
            "Image Generation Complete",
            format!("Your image has been generated successfully!\nPrompt: {preview}..."),
        )
    }

    /// Spawns the publish. The returned handle is only useful to tests; callers drop it.
    fn send(&self, subject: &'static str, message: String) -> Option<JoinHandle<()>> {
        let publisher = self.publisher.clone()?;

        Some(tokio::spawn(async move {
            if let Err(e) = publisher.publish(subject, &message).await {
                warn!(subject, error = %e, "Failed to send notification");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl NotificationPublisher for RecordingPublisher {
        async fn publish(&self, subject: &str, message: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), message.to_string()));
            Ok(())
        }
    }

    struct BrokenPublisher;

    #[async_trait]
    impl NotificationPublisher for BrokenPublisher {
        async fn publish(&self, _: &str, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("topic does not exist")
        }
    }

    #[tokio::test]
    async fn test_unconfigured_is_noop() {
        let notifier = Notifier::default();
        assert!(!notifier.is_enabled());
        assert!(notifier.welcome("alice").is_none());
    }

    #[tokio::test]
    async fn test_messages_are_published() {
        let publisher = Arc::new(RecordingPublisher::default());
        let notifier = Notifier::new(Some(publisher.clone() as Arc<dyn NotificationPublisher>));

        notifier.welcome("alice").unwrap().await.unwrap();
        let long_prompt = "x".repeat(150);
        notifier
            .generation_complete(&long_prompt)
            .unwrap()
            .await
            .unwrap();

        let sent = publisher.sent.lock().unwrap();
        assert_eq!(sent[0].0, "Welcome to AI Image Generator");
        assert!(sent[0].1.contains("alice"));
        assert_eq!(sent[1].0, "Image Generation Complete");
        assert!(sent[1].1.ends_with(&format!("{}...", "x".repeat(100))));
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let notifier = Notifier::new(Some(Arc::new(BrokenPublisher)));
        notifier.welcome("bob").unwrap().await.unwrap();
    }
}
