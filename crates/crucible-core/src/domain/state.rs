//! State - コンテナとパイプラインの状態
//!
//! 状態はログ出力とエラー分類のためのもので、永続化はしない。

use std::fmt;

use serde::{Deserialize, Serialize};

/// LifecycleState は 1 回の start_container の中の状態
///
/// # 状態遷移
/// - absent → pulling → created → starting → running → exited
/// - starting で GPU ドライバ選択に失敗した場合のみ: starting → gpu_retry → created → starting
/// - それ以外の失敗はその場で failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Absent,
    Pulling,
    Created,
    Starting,
    GpuRetry,
    Running,
    Exited,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Absent => "absent",
            LifecycleState::Pulling => "pulling",
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::GpuRetry => "gpu_retry",
            LifecycleState::Running => "running",
            LifecycleState::Exited => "exited",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PipelineStage はタスクパイプラインの段階
///
/// # 状態遷移
/// - queued → staging → running → collecting → uploading → cleaned_up
/// - どの段階からでも failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Queued,
    Staging,
    Running,
    Collecting,
    Uploading,
    CleanedUp,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Queued => "queued",
            PipelineStage::Staging => "staging",
            PipelineStage::Running => "running",
            PipelineStage::Collecting => "collecting",
            PipelineStage::Uploading => "uploading",
            PipelineStage::CleanedUp => "cleaned_up",
            PipelineStage::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
