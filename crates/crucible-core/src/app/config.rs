//! PipelineConfig - パイプラインの設定
//!
//! すべてのフィールドに既定値がある（JSON で一部だけ上書きできる）。
//!
//! # コンテナ内のレイアウト（固定）
//! - `/app/data`   (ro) ← `{staging}/data`
//! - `/app/input`  (ro) ← `{staging}/input`
//! - `/app/result` (rw) ← `{staging}/result`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::staging::StagingLayout;
use crate::domain::{BindMount, ContainerRunSpec, EnvVar, RunOptions};

pub const CONTAINER_DATA_DIR: &str = "/app/data";
pub const CONTAINER_INPUT_DIR: &str = "/app/input";
pub const CONTAINER_RESULT_DIR: &str = "/app/result";

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const INPUT_DIR_ENV: &str = "INPUT_DIR";
pub const RESULT_DIR_ENV: &str = "RESULT_DIR";

pub const DEFAULT_IMAGE: &str = "python:3.9-slim";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parent of all per-task staging trees.
    pub staging_root: PathBuf,

    pub workload: WorkloadConfig,

    /// Bound on container removal during cleanup; independent of the run's deadline.
    pub cleanup_timeout_secs: u64,

    /// Forward container stdout/stderr to the log after exit.
    pub capture_logs: bool,

    pub download_url_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staging_root: std::env::temp_dir().join("crucible"),
            workload: WorkloadConfig::default(),
            cleanup_timeout_secs: 10,
            capture_logs: true,
            download_url_ttl_secs: 600,
        }
    }
}

impl PipelineConfig {
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    pub fn download_url_ttl(&self) -> Duration {
        Duration::from_secs(self.download_url_ttl_secs)
    }
}

/// The container each task runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub image: String,
    pub command: Vec<String>,

    /// Appended after the staging directory variables.
    pub env: Vec<EnvVar>,

    pub memory_mib: Option<u64>,
    pub cpu_limit: Option<u32>,
    pub gpu: bool,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            command: vec!["python3".to_string(), "/app/data/main.py".to_string()],
            env: Vec::new(),
            memory_mib: None,
            cpu_limit: None,
            gpu: false,
        }
    }
}

impl WorkloadConfig {
    /// Bind `layout` at the fixed container paths and point the workload at them.
    pub fn run_spec(&self, layout: &StagingLayout) -> ContainerRunSpec {
        let mounts = vec![
            BindMount::read_only(layout.data(), CONTAINER_DATA_DIR),
            BindMount::read_only(layout.input(), CONTAINER_INPUT_DIR),
            BindMount::writable(layout.result(), CONTAINER_RESULT_DIR),
        ];

        let mut env = vec![
            EnvVar::new(DATA_DIR_ENV, CONTAINER_DATA_DIR),
            EnvVar::new(INPUT_DIR_ENV, CONTAINER_INPUT_DIR),
            EnvVar::new(RESULT_DIR_ENV, CONTAINER_RESULT_DIR),
        ];
        env.extend(self.env.iter().cloned());

        ContainerRunSpec::new(
            self.image.clone(),
            RunOptions {
                env: Some(env),
                command: Some(self.command.clone()),
                mounts: Some(mounts),
                memory_mib: self.memory_mib,
                cpu_limit: self.cpu_limit,
                gpu: Some(self.gpu),
            },
        )
    }
}
