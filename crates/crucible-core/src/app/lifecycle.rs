//! LifecycleManager - コンテナのライフサイクル管理
//!
//! # 状態遷移
//! ```text
//! absent → pulling → created → starting → running → exited
//!                               │
//!                               └─ (GPU driver 選択失敗) → gpu_retry → created → starting → running
//! ```
//!
//! # GPU fallback
//! - GPU 要求あり & capability=false: device request を付けずに作成（リトライ無し）
//! - GPU 要求あり & capability=true & start が driver 選択失敗:
//!   1. 作成したコンテナを削除
//!   2. capability を false に降格（プロセス終了まで戻らない）
//!   3. GPU なしで作成・起動し直す（1 回だけ）
//! - それ以外の start 失敗: コンテナを削除してエラーを返す
//!
//! # キャンセル
//! pull / create / start / wait は RunContext に従う。
//! 削除だけは RunContext を使わず `cleanup_timeout` で打ち切る。

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, info, warn};

use super::context::RunContext;
use super::gpu::GpuCapability;
use crate::domain::{
    ContainerExit, ContainerHandle, ContainerRequest, ContainerRunSpec, ContainerStateSnapshot,
    EngineError, LifecycleError, LifecycleState, LogChunk,
};
use crate::impls::LogProgressSink;
use crate::ports::{ContainerEngine, PullProgressSink};

pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct LifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    gpu: GpuCapability,
    progress: Arc<dyn PullProgressSink>,
    cleanup_timeout: Duration,
}

impl LifecycleManager {
    /// Build a manager, probing the engine for GPU support once.
    pub async fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        let gpu = GpuCapability::probe(engine.as_ref()).await;
        Self::with_capability(engine, gpu)
    }

    /// Build a manager with a known capability (no probe).
    pub fn with_capability(engine: Arc<dyn ContainerEngine>, gpu: GpuCapability) -> Self {
        Self {
            engine,
            gpu,
            progress: Arc::new(LogProgressSink),
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }

    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn PullProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn gpu_available(&self) -> bool {
        self.gpu.is_available()
    }

    /// Ensure the image, then create and start a container for `spec`.
    pub async fn start_container(
        &self,
        spec: &ContainerRunSpec,
        ctx: &RunContext,
    ) -> Result<ContainerHandle, LifecycleError> {
        debug!(image = spec.image(), state = %LifecycleState::Absent, "lifecycle transition");
        self.ensure_image(spec.image(), ctx).await?;

        let attach_gpu = spec.gpu() && self.gpu.is_available();
        if spec.gpu() && !attach_gpu {
            warn!(
                image = spec.image(),
                "GPU requested but not available, running without GPU"
            );
        }
        let request = ContainerRequest::from_spec(spec, attach_gpu);

        match self.create_and_start(&request, ctx).await {
            Err(err) if request.gpu.is_some() && err.is_driver_selection_failure() => {
                debug!(state = %LifecycleState::GpuRetry, error = %err, "lifecycle transition");
                if self.gpu.downgrade() {
                    warn!(error = %err, "GPU driver unavailable, falling back to CPU for this process");
                }
                self.create_and_start(&request.without_gpu(), ctx).await
            }
            other => other,
        }
    }

    /// Block until the container leaves the running state.
    ///
    /// A non-zero exit is returned as data. Cancellation yields `Interrupted`.
    pub async fn wait_container(
        &self,
        handle: &ContainerHandle,
        ctx: &RunContext,
    ) -> Result<ContainerExit, LifecycleError> {
        let exit = ctx
            .run(self.engine.wait_container(handle))
            .await?
            .map_err(LifecycleError::Wait)?;

        debug!(
            container_id = handle.short(),
            state = %LifecycleState::Exited,
            exit_code = exit.code,
            "lifecycle transition"
        );
        Ok(exit)
    }

    /// Demultiplexed stdout/stderr. Dropping the stream closes it.
    pub fn container_logs<'a>(
        &'a self,
        handle: &'a ContainerHandle,
        follow: bool,
    ) -> BoxStream<'a, Result<LogChunk, LifecycleError>> {
        self.engine
            .container_logs(handle, follow)
            .map(|chunk| chunk.map_err(LifecycleError::Logs))
            .boxed()
    }

    pub async fn inspect_container(
        &self,
        handle: &ContainerHandle,
    ) -> Result<ContainerStateSnapshot, LifecycleError> {
        self.engine
            .inspect_container(handle)
            .await
            .map_err(LifecycleError::Inspect)
    }

    /// Best-effort removal bounded by the cleanup timeout. Never fails.
    ///
    /// Consumes the handle. Returns true when the container is known to be gone.
    pub async fn remove_container(&self, handle: ContainerHandle, force: bool) -> bool {
        let removal = self.engine.remove_container(&handle, force);
        match tokio::time::timeout(self.cleanup_timeout, removal).await {
            Ok(Ok(())) => {
                debug!(container_id = handle.short(), "container removed");
                true
            }
            Ok(Err(err)) if err.is_not_found() => {
                warn!(container_id = handle.short(), error = %err, "container already removed");
                true
            }
            Ok(Err(err)) => {
                warn!(
                    container_id = handle.short(),
                    error = %LifecycleError::Remove(err),
                    "container cleanup failed, leaving it behind"
                );
                false
            }
            Err(_) => {
                warn!(
                    container_id = handle.short(),
                    timeout_secs = self.cleanup_timeout.as_secs(),
                    "container cleanup timed out, leaving it behind"
                );
                false
            }
        }
    }

    /// Engine reachability only.
    pub async fn check_status(&self) -> Result<(), LifecycleError> {
        self.engine.ping().await.map_err(LifecycleError::Unreachable)
    }

    async fn ensure_image(&self, image: &str, ctx: &RunContext) -> Result<(), LifecycleError> {
        let image_pull = |source: EngineError| LifecycleError::ImagePull {
            image: image.to_string(),
            source,
        };

        let present = ctx
            .run(self.engine.image_exists(image))
            .await?
            .map_err(image_pull)?;
        if present {
            debug!(image, "image present locally");
            return Ok(());
        }

        info!(image, state = %LifecycleState::Pulling, "pulling image");
        let pull = async {
            let mut stream = self.engine.pull_image(image);
            while let Some(progress) = stream.next().await {
                self.progress.on_progress(image, &progress?);
            }
            Ok::<(), EngineError>(())
        };
        ctx.run(pull).await?.map_err(image_pull)?;
        info!(image, "image pulled");
        Ok(())
    }

    /// Create then start. A container that fails to start is removed before returning.
    async fn create_and_start(
        &self,
        request: &ContainerRequest,
        ctx: &RunContext,
    ) -> Result<ContainerHandle, LifecycleError> {
        let handle = ctx
            .run(self.engine.create_container(request))
            .await?
            .map_err(LifecycleError::Create)?;
        debug!(
            container_id = handle.short(),
            image = %request.image,
            gpu = request.gpu.is_some(),
            state = %LifecycleState::Created,
            "lifecycle transition"
        );

        debug!(container_id = handle.short(), state = %LifecycleState::Starting, "lifecycle transition");
        let started = match ctx.run(self.engine.start_container(&handle)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(LifecycleError::Start(err)),
            Err(interrupt) => Err(LifecycleError::Interrupted(interrupt)),
        };

        match started {
            Ok(()) => {
                info!(
                    container_id = handle.short(),
                    state = %LifecycleState::Running,
                    "container started"
                );
                Ok(handle)
            }
            Err(err) => {
                debug!(
                    container_id = handle.short(),
                    state = %LifecycleState::Failed,
                    error = %err,
                    "lifecycle transition"
                );
                self.remove_container(handle, true).await;
                Err(err)
            }
        }
    }
}
