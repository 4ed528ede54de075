//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてパイプラインを実装します。
//!
//! # 主要コンポーネント
//! - **GpuCapability**: GPU ランタイムの有無（probe と降格）
//! - **LifecycleManager**: コンテナの作成・起動・待機・削除と GPU fallback
//! - **StagingLayout**: タスクごとのローカル作業領域
//! - **TaskPipeline**: staging → running → collecting → uploading → cleanup
//! - **RunContext**: キャンセルと期限
//! - **PipelineBuilder**: 構築とワイヤリング

pub mod builder;
pub mod config;
pub mod context;
pub mod gpu;
pub mod lifecycle;
pub mod pipeline;
pub mod staging;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, PipelineBuilder};
pub use self::config::{PipelineConfig, WorkloadConfig};
pub use self::context::RunContext;
pub use self::gpu::GpuCapability;
pub use self::lifecycle::LifecycleManager;
pub use self::pipeline::TaskPipeline;
pub use self::staging::StagingLayout;
