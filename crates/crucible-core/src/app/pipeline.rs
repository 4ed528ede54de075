//! TaskPipeline - 1 タスクの実行パイプライン
//!
//! # ステージ
//! ```text
//! queued → staging → running → collecting → uploading → cleaned_up
//!    └──────────┴─────────┴──────────┴────────────┴──→ failed
//! ```
//!
//! # 保証
//! - 1 回の呼び出しにつき結果は 1 つ（成果物キー or 分類済みエラー）
//! - コンテナは start に成功したら必ず削除を試みる（wait が中断されても）
//! - ステージング領域はどの経路でも削除を試みる
//! - cleanup の失敗はログのみ（結果を上書きしない）
//! - 非ゼロ終了はエラーではない（警告を出して成果物の回収に進む）

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::config::PipelineConfig;
use super::context::RunContext;
use super::lifecycle::LifecycleManager;
use super::staging::StagingLayout;
use crate::domain::{
    ArtifactKey, ContainerExit, ContainerHandle, LifecycleError, LogSource, PipelineStage,
    StoreError, TaskError, TaskId, TaskOutcome,
};
use crate::ports::{ArtifactStore, InputSource};

/// Log target for forwarded container output.
pub const WORKLOAD_LOG_TARGET: &str = "crucible::workload";

pub struct TaskPipeline {
    manager: Arc<LifecycleManager>,
    store: Arc<dyn ArtifactStore>,
    inputs: Arc<dyn InputSource>,
    config: PipelineConfig,
}

impl TaskPipeline {
    pub fn new(
        manager: Arc<LifecycleManager>,
        store: Arc<dyn ArtifactStore>,
        inputs: Arc<dyn InputSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            manager,
            store,
            inputs,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    /// Run one task to a single terminal outcome.
    pub async fn run_task(&self, task_id: &TaskId, ctx: &RunContext) -> TaskOutcome {
        let layout = StagingLayout::for_task(&self.config.staging_root, task_id);
        let span = info_span!("task", task_id = %task_id);

        async {
            enter(PipelineStage::Queued);
            let outcome = self.execute(task_id, &layout, ctx).await;
            self.remove_staging(&layout).await;

            match &outcome {
                Ok(key) => info!(stage = %PipelineStage::CleanedUp, key = %key, "task succeeded"),
                Err(err) => error!(
                    stage = %PipelineStage::Failed,
                    failed_stage = %err.stage(),
                    kind = ?err.kind(),
                    error = %err,
                    "task failed"
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Time-limited download URL for a stored artifact.
    pub async fn download_url(&self, key: &ArtifactKey) -> Result<String, StoreError> {
        self.store.presign(key, self.config.download_url_ttl()).await
    }

    /// Engine liveness.
    pub async fn check_status(&self) -> Result<(), LifecycleError> {
        self.manager.check_status().await
    }

    async fn execute(
        &self,
        task_id: &TaskId,
        layout: &StagingLayout,
        ctx: &RunContext,
    ) -> TaskOutcome {
        enter(PipelineStage::Staging);
        if layout.create().await.map_err(TaskError::Staging)? {
            warn!(path = %layout.root().display(), "discarded leftover staging tree");
        }
        self.inputs
            .populate(task_id, layout)
            .await
            .map_err(TaskError::Inputs)?;

        enter(PipelineStage::Running);
        let spec = self.config.workload.run_spec(layout);
        let handle = self.manager.start_container(&spec, ctx).await?;

        let exit = self.await_exit(&handle, ctx).await;
        // a container that did not exit cleanly may still be running
        self.manager.remove_container(handle, exit.is_err()).await;
        exit?;

        enter(PipelineStage::Collecting);
        let artifact = layout
            .find_artifact()
            .await
            .map_err(TaskError::Collect)?
            .ok_or_else(|| TaskError::MissingArtifact(layout.result().to_path_buf()))?;

        enter(PipelineStage::Uploading);
        self.upload(task_id, &artifact).await
    }

    async fn await_exit(
        &self,
        handle: &ContainerHandle,
        ctx: &RunContext,
    ) -> Result<ContainerExit, LifecycleError> {
        let exit = self.manager.wait_container(handle, ctx).await?;

        if exit.is_success() {
            info!(container_id = handle.short(), exit_code = exit.code, "container exited");
        } else {
            warn!(
                container_id = handle.short(),
                exit_code = exit.code,
                error = exit.error.as_deref().unwrap_or(""),
                "container exited with non-zero status, collecting results anyway"
            );
            match self.manager.inspect_container(handle).await {
                Ok(state) => warn!(
                    container_id = handle.short(),
                    status = %state.status,
                    oom_killed = state.oom_killed,
                    error = state.error.as_deref().unwrap_or(""),
                    "container state at exit"
                ),
                Err(err) => warn!(error = %err, "inspecting exited container failed"),
            }
        }

        if self.config.capture_logs {
            self.forward_logs(handle, ctx).await;
        }
        Ok(exit)
    }

    /// Replay container output into the log, line by line. Best effort.
    async fn forward_logs(&self, handle: &ContainerHandle, ctx: &RunContext) {
        let forward = async {
            let mut logs = self.manager.container_logs(handle, false);
            while let Some(chunk) = logs.next().await {
                let chunk = chunk?;
                let text = String::from_utf8_lossy(&chunk.bytes);
                for line in text.lines().filter(|line| !line.trim().is_empty()) {
                    match chunk.source {
                        LogSource::Stderr => warn!(target: WORKLOAD_LOG_TARGET, "{}", line),
                        LogSource::Stdout | LogSource::Console => {
                            info!(target: WORKLOAD_LOG_TARGET, "{}", line)
                        }
                    }
                }
            }
            Ok::<(), LifecycleError>(())
        };

        match ctx.run(forward).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(container_id = handle.short(), error = %err, "log capture failed"),
            Err(interrupt) => {
                debug!(container_id = handle.short(), %interrupt, "log capture skipped")
            }
        }
    }

    async fn upload(&self, task_id: &TaskId, artifact: &Path) -> TaskOutcome {
        let file_name = artifact
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| TaskError::InvalidArtifactName(artifact.display().to_string()))?;
        let key = ArtifactKey::for_task(task_id, file_name)
            .map_err(|_| TaskError::InvalidArtifactName(file_name.to_string()))?;

        let file = tokio::fs::File::open(artifact)
            .await
            .map_err(TaskError::Collect)?;
        let size = file.metadata().await.map_err(TaskError::Collect)?.len();
        debug!(key = %key, bytes = size, "uploading artifact");

        let stored = self
            .store
            .upload(&key, Box::new(file), size)
            .await
            .map_err(TaskError::Upload)?;
        info!(key = %stored, bytes = size, "artifact uploaded");
        Ok(stored)
    }

    async fn remove_staging(&self, layout: &StagingLayout) {
        match layout.remove().await {
            Ok(()) => debug!(path = %layout.root().display(), "staging removed"),
            Err(err) => warn!(
                path = %layout.root().display(),
                error = %err,
                "staging cleanup failed, leaving it behind"
            ),
        }
    }
}

fn enter(stage: PipelineStage) {
    debug!(stage = %stage, "pipeline stage");
}
