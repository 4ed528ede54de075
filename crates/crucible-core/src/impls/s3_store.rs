//! S3ArtifactStore - MinIO / S3 の ArtifactStore（feature `s3`）
//!
//! path-style でアクセスする（MinIO の既定）。バケットは `connect` 時に 1 回だけ確認し、
//! 無ければ作成する。

use std::time::Duration;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};
use tracing::{debug, info};

use crate::domain::{ArtifactKey, StoreError};
use crate::ports::{ArtifactBody, ArtifactStore};

#[derive(Debug, Clone)]
pub struct S3Config {
    /// `host:port`, without scheme.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
    pub region: String,
    pub bucket: String,
}

pub struct S3ArtifactStore {
    bucket: Box<Bucket>,
}

fn backend<E: std::fmt::Display>(err: E) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Content type from the key's extension.
pub fn content_type_for(key: &str) -> &'static str {
    mime_guess::from_path(key)
        .first_raw()
        .unwrap_or("application/octet-stream")
}

impl S3ArtifactStore {
    pub async fn connect(config: &S3Config) -> Result<Self, StoreError> {
        let scheme = if config.use_ssl { "https" } else { "http" };
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: format!("{}://{}", scheme, config.endpoint),
        };
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(backend)?;

        let bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(backend)?
            .with_path_style();

        if !bucket.exists().await.map_err(backend)? {
            Bucket::create_with_path_style(
                &config.bucket,
                region,
                credentials,
                BucketConfiguration::default(),
            )
            .await
            .map_err(backend)?;
            info!(bucket = %config.bucket, "created bucket");
        }

        Ok(Self { bucket })
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn upload(
        &self,
        key: &ArtifactKey,
        mut body: ArtifactBody,
        size: u64,
    ) -> Result<ArtifactKey, StoreError> {
        let content_type = content_type_for(key.as_str());
        self.bucket
            .put_object_stream_with_content_type(&mut body, key.as_str(), content_type)
            .await
            .map_err(backend)?;
        debug!(key = %key, bytes = size, content_type, "artifact uploaded");
        Ok(key.clone())
    }

    async fn presign(&self, key: &ArtifactKey, ttl: Duration) -> Result<String, StoreError> {
        let secs = u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX);
        self.bucket
            .presign_get(key.as_str(), secs, None)
            .await
            .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::json("tasks/t1/out.json", "application/json")]
    #[case::upper("tasks/t1/OUT.JSON", "application/json")]
    #[case::csv("tasks/t1/table.csv", "text/csv")]
    #[case::svg("tasks/t1/plot.svg", "image/svg+xml")]
    #[case::unknown("tasks/t1/weights.zzq", "application/octet-stream")]
    #[case::no_extension("tasks/t1/result", "application/octet-stream")]
    fn content_type_by_extension(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(content_type_for(key), expected);
    }
}
