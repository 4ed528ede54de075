//! ContainerEngine port - コンテナエンジン API（Docker など）
//!
//! LifecycleManager が使うエンジン操作の最小集合。
//!
//! # 実装
//! - **DockerEngine**: bollard 経由（本番用）
//! - **InMemoryEngine**: 開発・テスト用

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::{
    ContainerExit, ContainerHandle, ContainerRequest, ContainerStateSnapshot, EngineError,
    LogChunk, PullProgress,
};

/// Stream of image pull progress messages.
pub type PullStream<'a> = BoxStream<'a, Result<PullProgress, EngineError>>;

/// Demultiplexed stdout/stderr stream. Dropping it closes the underlying request.
pub type LogStream<'a> = BoxStream<'a, Result<LogChunk, EngineError>>;

/// ContainerEngine はコンテナエンジンへのクライアント
///
/// # 設計原則
/// - エンジンの API をそのまま薄く写す（方針・リトライは LifecycleManager 側）
/// - 非ゼロ終了コードはエラーではなく `ContainerExit` として返す
/// - `Send + Sync`（複数パイプラインから共有される）
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// `Ok(false)` only on an explicit "not found".
    async fn image_exists(&self, image: &str) -> Result<bool, EngineError>;

    /// Pull an image, yielding progress as the engine reports it.
    fn pull_image<'a>(&'a self, image: &'a str) -> PullStream<'a>;

    async fn create_container(
        &self,
        request: &ContainerRequest,
    ) -> Result<ContainerHandle, EngineError>;

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), EngineError>;

    /// Block until the container leaves the running state.
    async fn wait_container(&self, handle: &ContainerHandle) -> Result<ContainerExit, EngineError>;

    fn container_logs<'a>(&'a self, handle: &'a ContainerHandle, follow: bool) -> LogStream<'a>;

    async fn inspect_container(
        &self,
        handle: &ContainerHandle,
    ) -> Result<ContainerStateSnapshot, EngineError>;

    /// `force` also removes a running container.
    async fn remove_container(&self, handle: &ContainerHandle, force: bool)
    -> Result<(), EngineError>;

    /// Names of the runtimes registered with the engine.
    async fn runtimes(&self) -> Result<Vec<String>, EngineError>;

    async fn ping(&self) -> Result<(), EngineError>;
}
