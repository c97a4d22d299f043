use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::Client as S3Client;

use crate::store::{PhotoStore, StoreError, StoreResult};

/// S3-compatible bucket holding listing photos and avatars.
#[derive(Clone)]
pub struct ObjectStorage {
    client: S3Client,
    bucket: String,
    public_url: String,
}

impl ObjectStorage {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str, bucket: &str, public_url: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "market");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        tracing::info!(endpoint = %endpoint, bucket = %bucket, "object storage client initialized");

        Self {
            client: S3Client::from_conf(config),
            bucket: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket, key)
    }

    pub async fn remove(&self, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Storage(format!("delete failed: {e}")))?;
        Ok(())
    }
}

impl PhotoStore for ObjectStorage {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> StoreResult<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Storage(format!("upload failed: {e}")))?;

        Ok(self.public_url_for(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_urls_are_path_style() {
        let storage = ObjectStorage::new("http://localhost:9000", "k", "s", "market-photos", "https://cdn.example.edu/");
        assert_eq!(
            storage.public_url_for("1700000000-abc.jpg"),
            "https://cdn.example.edu/market-photos/1700000000-abc.jpg"
        );
    }
}
