// S3 object store
// Works against AWS and S3-compatible services (MinIO, ECS, Ceph) through a custom endpoint

use super::{ObjectStore, ObjectSummary, StorageError};
use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// S3-backed object store bound to one bucket
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a client with static credentials and path-style addressing
    pub async fn connect(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "environment",
        );

        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .load()
            .await;

        // Most S3-compatible services don't support virtual-hosted buckets
        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Verify the bucket exists and the credentials can reach it
    pub async fn check_bucket(&self) -> Result<(), StorageError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| classify(&format!("head bucket {}", self.bucket), e))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body));

        for (name, value) in metadata {
            request = request.metadata(name, value);
        }

        request
            .send()
            .await
            .map_err(|e| classify(&format!("put {}", key), e))?;

        debug!(bucket = %self.bucket, key = %key, "Stored object");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify(&format!("list {}", prefix), e))?;

            for object in response.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let Some(last_modified) = object.last_modified().and_then(to_utc) else {
                    warn!(key = %key, "Listed object has no last-modified time, ignoring");
                    continue;
                };
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    last_modified,
                    size: object.size().unwrap_or(0).max(0) as u64,
                });
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(&format!("delete {}", key), e))?;

        debug!(bucket = %self.bucket, key = %key, "Deleted object");
        Ok(())
    }
}

fn to_utc(timestamp: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

/// Split SDK failures into transient and permanent ones
fn classify<E>(operation: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = format!("{}: {}", operation, DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::Transient(message)
        }
        SdkError::ServiceError(context) => status_error(context.raw().status().as_u16(), message),
        _ => StorageError::Permanent(message),
    }
}

fn status_error(status: u16, message: String) -> StorageError {
    match status {
        404 => StorageError::NotFound(message),
        408 | 429 | 500..=599 => StorageError::Transient(message),
        _ => StorageError::Permanent(message),
    }
}
