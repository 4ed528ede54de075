//! ArtifactStore port - 成果物ストレージ（MinIO/S3/Local）
//!
//! ArtifactStore はタスクの成果物ファイルを保存し、期限付きのダウンロード URL を発行します。
//!
//! # 実装
//! - **LocalArtifactStore**: ローカルディレクトリをバケットとして使う
//! - **S3ArtifactStore**: MinIO / S3（feature `s3`）

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::domain::{ArtifactKey, StoreError};

/// Upload body; streamed, never buffered whole by the caller.
pub type ArtifactBody = Box<dyn AsyncRead + Send + Unpin>;

/// ArtifactStore は成果物を Blob に保存
///
/// # 設計原則
/// - バケットの存在確認（なければ作成）は構築時に 1 回だけ
/// - upload はストリームとサイズを受け取り、保存したキーを返す
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(
        &self,
        key: &ArtifactKey,
        body: ArtifactBody,
        size: u64,
    ) -> Result<ArtifactKey, StoreError>;

    /// Time-limited download URL for `key`.
    async fn presign(&self, key: &ArtifactKey, ttl: Duration) -> Result<String, StoreError>;
}
