use async_trait::async_trait;
use tracing::info;

/// One-shot message delivery to a subscriber topic.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> anyhow::Result<()>;
}

pub struct SnsPublisher {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsPublisher {
    pub async fn from_env(topic_arn: impl Into<String>, region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_sns::config::Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: aws_sdk_sns::Client::new(&sdk_config),
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl NotificationPublisher for SnsPublisher {
    async fn publish(&self, subject: &str, message: &str) -> anyhow::Result<()> {
        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "SNS publish failed: {}",
                    aws_sdk_sns::error::DisplayErrorContext(&e)
                )
            })?;

        info!(
            message_id = output.message_id().unwrap_or_default(),
            "Notification sent"
        );
        Ok(())
    }
}
