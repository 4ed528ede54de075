//! LocalArtifactStore - ローカルディレクトリをバケットとして使う ArtifactStore
//!
//! `{root}/{bucket}/{key}` に保存する。書き込みは `.part` に流してから rename するので、
//! 途中で失敗しても中途半端なオブジェクトは残らない。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::domain::{ArtifactKey, StoreError};
use crate::ports::{ArtifactBody, ArtifactStore};

#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    bucket_dir: PathBuf,
}

impl LocalArtifactStore {
    /// Open the store, creating the bucket directory if absent.
    pub async fn open(root: impl AsRef<Path>, bucket: &str) -> Result<Self, StoreError> {
        let bucket_dir = root.as_ref().join(bucket);
        if !fs::try_exists(&bucket_dir).await? {
            fs::create_dir_all(&bucket_dir).await?;
            info!(bucket, path = %bucket_dir.display(), "created bucket");
        }
        Ok(Self { bucket_dir })
    }

    pub fn object_path(&self, key: &ArtifactKey) -> PathBuf {
        self.bucket_dir.join(key.as_str())
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(
        &self,
        key: &ArtifactKey,
        mut body: ArtifactBody,
        size: u64,
    ) -> Result<ArtifactKey, StoreError> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let part = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.part", ext.to_string_lossy()),
            None => "part".to_string(),
        });
        let mut file = fs::File::create(&part).await?;
        let written = match tokio::io::copy(&mut body, &mut file).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&part).await;
                return Err(err.into());
            }
        };
        file.flush().await?;
        drop(file);

        if written != size {
            let _ = fs::remove_file(&part).await;
            return Err(StoreError::SizeMismatch {
                expected: size,
                actual: written,
            });
        }

        fs::rename(&part, &path).await?;
        debug!(key = %key, bytes = written, "artifact stored");
        Ok(key.clone())
    }

    async fn presign(&self, key: &ArtifactKey, ttl: Duration) -> Result<String, StoreError> {
        let path = self.object_path(key);
        if !fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let path = fs::canonicalize(&path).await?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|err| StoreError::Backend(format!("invalid ttl: {}", err)))?;
        let expires = (Utc::now() + ttl).timestamp();
        Ok(format!("file://{}?expires={}", path.display(), expires))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(value: &str) -> ArtifactKey {
        ArtifactKey::parse(value).unwrap()
    }

    #[tokio::test]
    async fn open_creates_bucket() {
        let dir = TempDir::new().unwrap();
        LocalArtifactStore::open(dir.path(), "results").await.unwrap();
        assert!(dir.path().join("results").is_dir());
    }

    #[tokio::test]
    async fn upload_then_presign() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::open(dir.path(), "results").await.unwrap();
        let key = key("tasks/t1/out.json");
        let body = br#"{"ok":true}"#;

        let stored = store
            .upload(&key, Box::new(&body[..]), body.len() as u64)
            .await
            .unwrap();
        assert_eq!(stored, key);
        assert_eq!(
            std::fs::read(dir.path().join("results/tasks/t1/out.json")).unwrap(),
            body
        );
        assert!(!dir.path().join("results/tasks/t1/out.json.part").exists());

        let url = store.presign(&key, Duration::from_secs(600)).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.contains("/results/tasks/t1/out.json?expires="));
    }

    #[tokio::test]
    async fn size_mismatch_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::open(dir.path(), "results").await.unwrap();
        let key = key("tasks/t1/out.json");

        let err = store
            .upload(&key, Box::new(&b"abc"[..]), 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::SizeMismatch {
                expected: 10,
                actual: 3
            }
        ));
        assert!(!store.object_path(&key).exists());
    }

    #[tokio::test]
    async fn presign_unknown_key_fails() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::open(dir.path(), "results").await.unwrap();
        let err = store
            .presign(&key("tasks/t9/none.json"), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
