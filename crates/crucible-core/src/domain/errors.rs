//! Errors - エラー型と分類
//!
//! レイヤーごとにエラー型を分ける:
//! - **EngineError**: ContainerEngine アダプタが返す生のエラー
//! - **LifecycleError**: LifecycleManager の操作ごとのエラー
//! - **StoreError**: ArtifactStore のエラー
//! - **TaskError**: パイプラインの終端エラー（段階ごと）
//!
//! cleanup の失敗はどの型にも現れない（ログのみ）。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::ids::InvalidId;
use super::state::PipelineStage;

/// Text the engine uses when the requested GPU driver cannot be selected.
pub const DRIVER_SELECTION_PATTERN: &str = "could not select device driver";

/// EngineError はコンテナエンジンとの通信エラー
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("engine responded with status {status}: {message}")]
    Api { status: u16, message: String },

    /// Connection-level failure; the engine may be unreachable.
    #[error("engine transport error: {0}")]
    Transport(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

/// Classify a start failure as "GPU driver could not be selected".
///
/// Matches on the engine's message text. Kept as the only place that knows the
/// pattern so it can be replaced by a structured code if the engine grows one.
pub fn is_driver_selection_failure(err: &EngineError) -> bool {
    let message = match err {
        EngineError::Api { message, .. } => message.as_str(),
        EngineError::NotFound(message) | EngineError::Transport(message) => message.as_str(),
    };
    message.contains(DRIVER_SELECTION_PATTERN)
}

/// Interrupt は呼び出し側による中断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupt {
    #[error("cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// LifecycleError は LifecycleManager の操作エラー
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("container engine unreachable: {0}")]
    Unreachable(#[source] EngineError),

    #[error("pulling image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("creating container: {0}")]
    Create(#[source] EngineError),

    #[error("starting container: {0}")]
    Start(#[source] EngineError),

    #[error("waiting for container: {0}")]
    Wait(#[source] EngineError),

    #[error("inspecting container: {0}")]
    Inspect(#[source] EngineError),

    #[error("reading container logs: {0}")]
    Logs(#[source] EngineError),

    #[error("removing container: {0}")]
    Remove(#[source] EngineError),

    #[error("interrupted: {0}")]
    Interrupted(#[from] Interrupt),
}

impl LifecycleError {
    /// Start failure caused by GPU driver selection.
    pub fn is_driver_selection_failure(&self) -> bool {
        matches!(self, LifecycleError::Start(err) if is_driver_selection_failure(err))
    }

    pub fn interrupt(&self) -> Option<Interrupt> {
        match self {
            LifecycleError::Interrupted(interrupt) => Some(*interrupt),
            _ => None,
        }
    }
}

/// StoreError は ArtifactStore のエラー
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid artifact key: {0}")]
    InvalidKey(#[from] InvalidId),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("artifact size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("artifact store i/o: {0}")]
    Io(#[from] io::Error),

    #[error("artifact store backend: {0}")]
    Backend(String),
}

/// ErrorKind は失敗の運用分類
///
/// - Infrastructure: エンジン・ストレージ側の障害
/// - Workload: コンテナは動いたが成果物を出さなかった
/// - Local: ローカルファイルシステムの問題
/// - Interrupted: キャンセル・期限切れ
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Infrastructure,
    Workload,
    Local,
    Interrupted,
}

/// TaskError はパイプラインの終端エラー（1 回の実行につき 1 つ）
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("preparing staging directories: {0}")]
    Staging(#[source] io::Error),

    #[error("populating task inputs: {0}")]
    Inputs(#[source] io::Error),

    #[error("running container: {0}")]
    Container(#[from] LifecycleError),

    #[error("reading result directory: {0}")]
    Collect(#[source] io::Error),

    #[error("no result artifact found in {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("artifact name {0:?} is not a valid key segment")]
    InvalidArtifactName(String),

    #[error("uploading artifact: {0}")]
    Upload(#[source] StoreError),
}

impl TaskError {
    /// Stage the pipeline was in when it failed.
    pub fn stage(&self) -> PipelineStage {
        match self {
            TaskError::Staging(_) | TaskError::Inputs(_) => PipelineStage::Staging,
            TaskError::Container(_) => PipelineStage::Running,
            TaskError::Collect(_) | TaskError::MissingArtifact(_) => PipelineStage::Collecting,
            TaskError::InvalidArtifactName(_) | TaskError::Upload(_) => PipelineStage::Uploading,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Container(err) if err.interrupt().is_some() => ErrorKind::Interrupted,
            TaskError::Container(_) | TaskError::Upload(_) => ErrorKind::Infrastructure,
            TaskError::MissingArtifact(_) | TaskError::InvalidArtifactName(_) => {
                ErrorKind::Workload
            }
            TaskError::Staging(_) | TaskError::Inputs(_) | TaskError::Collect(_) => {
                ErrorKind::Local
            }
        }
    }
}
