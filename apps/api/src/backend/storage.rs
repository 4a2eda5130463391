use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;

use crate::backend::BackendError;

/// Object storage for uploaded documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, path: &str, body: Bytes, content_type: &str)
        -> Result<(), BackendError>;

    async fn remove(&self, path: &str) -> Result<(), BackendError>;

    /// Public URL a browser or renderer can fetch the object from.
    fn public_url(&self, path: &str) -> String;
}

/// S3 / MinIO object store.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BackendError::Storage(DisplayErrorContext(e).to_string()))?;

        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, path);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| BackendError::Storage(DisplayErrorContext(e).to_string()))?;

        info!("Removed s3://{}/{}", self.bucket, path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket, path)
    }
}
