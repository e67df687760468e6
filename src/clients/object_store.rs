use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

/// Write side of a bucket-style object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> anyhow::Result<()>;
}

/// S3 implementation. Credentials come from the default AWS provider chain
/// (environment, profile, instance role).
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn from_env(bucket: impl Into<String>, region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .load()
            .await;

        let bucket = bucket.into();
        info!(bucket = %bucket, region = %region, "Object storage client initialized");

        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> anyhow::Result<()> {
        let len = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "PutObject {key} failed: {}",
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                )
            })?;

        debug!(bucket = %self.bucket, key = %key, bytes = len, "Object uploaded");
        Ok(())
    }
}
