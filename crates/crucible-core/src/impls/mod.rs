//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **DockerEngine**: bollard 経由の ContainerEngine（本番用）
//! - **InMemoryEngine**: 開発・テスト用の ContainerEngine
//! - **LocalArtifactStore**: ローカルディレクトリをバケットとして使う
//! - **S3ArtifactStore**: MinIO / S3（feature `s3`）
//! - **SeedDirectory**: 固定シードファイルの InputSource
//! - **LogProgressSink**: pull 進捗を tracing に出す

pub mod docker;
pub mod inmem_engine;
pub mod local_store;
pub mod progress;
#[cfg(feature = "s3")]
pub mod s3_store;
pub mod seed;

// 主要な型を再エクスポート
pub use self::docker::DockerEngine;
pub use self::inmem_engine::{EngineCall, InMemoryEngine, Workload};
pub use self::local_store::LocalArtifactStore;
pub use self::progress::LogProgressSink;
#[cfg(feature = "s3")]
pub use self::s3_store::{S3ArtifactStore, S3Config};
pub use self::seed::SeedDirectory;
