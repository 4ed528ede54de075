//! crucible-core
//!
//! Container task pipeline: stage inputs, run one container (GPU when the engine
//! has it, CPU otherwise), collect the single result artifact, upload it, and
//! clean up on every path.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, run_spec, container, state, errors, outcome）
//! - **ports**: 抽象化レイヤー（ContainerEngine, ArtifactStore, InputSource, PullProgressSink）
//! - **app**: アプリケーションロジック（gpu, lifecycle, staging, pipeline, builder）
//! - **impls**: 実装（DockerEngine, InMemoryEngine, LocalArtifactStore, SeedDirectory など）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{PipelineBuilder, PipelineConfig, RunContext, TaskPipeline};
pub use domain::{ArtifactKey, TaskError, TaskId, TaskOutcome, TaskReport};
