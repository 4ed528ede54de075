//! Container - エンジンとの間でやり取りする値
//!
//! ContainerRunSpec（利用者の意図）から ContainerRequest（エンジンに渡す内容）を作る。
//! GPU を付けるかどうかはこの変換の時点で LifecycleManager が決める。

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run_spec::{BindMount, ContainerRunSpec};

/// GPU runtime name looked up in the engine's runtime registry.
pub const GPU_DRIVER: &str = "nvidia";

/// GPU device request attached to a create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuRequest {
    pub driver: String,

    /// -1 = all available devices.
    pub count: i64,

    pub capabilities: Vec<Vec<String>>,
}

impl GpuRequest {
    pub fn all_devices() -> Self {
        Self {
            driver: GPU_DRIVER.to_string(),
            count: -1,
            capabilities: vec![vec!["gpu".to_string()]],
        }
    }
}

/// What actually reaches the engine's create call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRequest {
    pub image: String,

    /// `NAME=value`, in order.
    pub env: Vec<String>,

    pub command: Vec<String>,
    pub mounts: Vec<BindMount>,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub gpu: Option<GpuRequest>,
}

impl ContainerRequest {
    pub fn from_spec(spec: &ContainerRunSpec, attach_gpu: bool) -> Self {
        Self {
            image: spec.image().to_string(),
            env: spec.env().iter().map(|e| e.assignment()).collect(),
            command: spec.command().to_vec(),
            mounts: spec.mounts().to_vec(),
            memory_bytes: spec.memory_bytes(),
            nano_cpus: spec.nano_cpus(),
            gpu: attach_gpu.then(GpuRequest::all_devices),
        }
    }

    /// Same request with the GPU device request dropped.
    pub fn without_gpu(&self) -> Self {
        Self {
            gpu: None,
            ..self.clone()
        }
    }

    pub fn host_path(&self, target: &str) -> Option<&Path> {
        self.mounts
            .iter()
            .find(|m| m.target == target)
            .map(|m| m.source.as_path())
    }
}

/// Exit report of a container that left the running state.
///
/// A non-zero `code` is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerExit {
    pub code: i64,

    /// Abnormal-termination message reported by the engine, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContainerExit {
    pub fn code(code: i64) -> Self {
        Self { code, error: None }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0 && self.error.is_none()
    }
}

/// Point-in-time view of a container's state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerStateSnapshot {
    pub status: String,
    pub exit_code: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub running: bool,
    pub oom_killed: bool,
    pub error: Option<String>,
}

/// Parse an engine timestamp. Engines report the zero time for "never".
pub fn parse_engine_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    if value.is_empty() || value.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Stdout,
    Stderr,
    Console,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Stdout => "stdout",
            LogSource::Stderr => "stderr",
            LogSource::Console => "console",
        }
    }
}

/// One demultiplexed piece of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub source: LogSource,
    pub bytes: Vec<u8>,
}

impl LogChunk {
    pub fn stdout(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: LogSource::Stdout,
            bytes: bytes.into(),
        }
    }

    pub fn stderr(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: LogSource::Stderr,
            bytes: bytes.into(),
        }
    }
}

/// One image pull progress message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullProgress {
    /// Layer id, when the message is about a layer.
    pub id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
}
