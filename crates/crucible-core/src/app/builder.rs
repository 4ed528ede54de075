//! PipelineBuilder - TaskPipeline の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 足りないコンポーネントはまとめて報告する
//! - GPU capability の probe は build() の中で 1 回だけ

use std::sync::Arc;

use super::config::PipelineConfig;
use super::gpu::GpuCapability;
use super::lifecycle::LifecycleManager;
use super::pipeline::TaskPipeline;
use crate::ports::{ArtifactStore, ContainerEngine, InputSource, PullProgressSink};

/// PipelineBuilder は TaskPipeline を構築
///
/// # 使用例
/// ```ignore
/// let pipeline = PipelineBuilder::new()
///     .engine(Arc::new(DockerEngine::connect()?))
///     .store(Arc::new(LocalArtifactStore::open("/srv/artifacts", "results").await?))
///     .inputs(Arc::new(SeedDirectory::new("demos/seed")))
///     .build()
///     .await?;
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    engine: Option<Arc<dyn ContainerEngine>>,
    store: Option<Arc<dyn ArtifactStore>>,
    inputs: Option<Arc<dyn InputSource>>,
    progress: Option<Arc<dyn PullProgressSink>>,
    gpu: Option<bool>,
    config: PipelineConfig,
}

/// BuildError はパイプライン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be set before build().")]
    MissingComponents(Vec<&'static str>),
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine(mut self, engine: Arc<dyn ContainerEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn inputs(mut self, inputs: Arc<dyn InputSource>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    /// Where pull progress goes. Defaults to the log.
    pub fn progress_sink(mut self, sink: Arc<dyn PullProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Skip the engine probe and use a known GPU capability.
    pub fn gpu_capability(mut self, available: bool) -> Self {
        self.gpu = Some(available);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Wire everything together.
    ///
    /// # 検証
    /// - engine / store / inputs が全て設定されているかチェック
    /// - 不足があれば BuildError::MissingComponents を返す
    pub async fn build(self) -> Result<TaskPipeline, BuildError> {
        let missing: Vec<&'static str> = [
            ("engine", self.engine.is_none()),
            ("store", self.store.is_none()),
            ("inputs", self.inputs.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (Some(engine), Some(store), Some(inputs)) = (self.engine, self.store, self.inputs)
        else {
            return Err(BuildError::MissingComponents(missing));
        };

        let manager = match self.gpu {
            Some(available) => {
                LifecycleManager::with_capability(engine, GpuCapability::new(available))
            }
            None => LifecycleManager::new(engine).await,
        }
        .with_cleanup_timeout(self.config.cleanup_timeout());
        let manager = match self.progress {
            Some(sink) => manager.with_progress_sink(sink),
            None => manager,
        };

        Ok(TaskPipeline::new(
            Arc::new(manager),
            store,
            inputs,
            self.config,
        ))
    }
}
