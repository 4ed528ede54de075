//! Run specification for a single container (image, env, command, mounts, limits).
//!
//! `RunOptions` is the user-facing record: every field is optional and named, and
//! `ContainerRunSpec::new` resolves it into an immutable spec with the defaults
//! applied. No option depends on the order in which the others were set.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default memory limit in MiB.
pub const DEFAULT_MEMORY_MIB: u64 = 100;

/// Default CPU limit, in hundredths of a core (100 = 1.0 core).
pub const DEFAULT_CPU_LIMIT: u32 = 100;

/// Engine nano-CPUs per CPU-limit unit (100 units = 1e9 nano-CPUs).
const NANO_CPUS_PER_UNIT: i64 = 10_000_000;

/// One `NAME=value` assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// `NAME=value` form expected by the engine.
    pub fn assignment(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// A host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Host path.
    pub source: PathBuf,

    /// Absolute path inside the container.
    pub target: String,

    #[serde(default)]
    pub read_only: bool,
}

impl BindMount {
    pub fn read_only(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: true,
        }
    }

    pub fn writable(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }
}

/// Named, independently optional run options.
///
/// Unset fields fall back to the documented defaults:
/// - `env`, `command`, `mounts`: empty
/// - `memory_mib`: [`DEFAULT_MEMORY_MIB`] (also used when set to 0)
/// - `cpu_limit`: [`DEFAULT_CPU_LIMIT`] (also used when set to 0)
/// - `gpu`: false
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub env: Option<Vec<EnvVar>>,
    pub command: Option<Vec<String>>,
    pub mounts: Option<Vec<BindMount>>,
    pub memory_mib: Option<u64>,
    pub cpu_limit: Option<u32>,
    pub gpu: Option<bool>,
}

/// Immutable run specification handed to the lifecycle manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRunSpec {
    image: String,
    env: Vec<EnvVar>,
    command: Vec<String>,
    mounts: Vec<BindMount>,
    memory_mib: u64,
    cpu_limit: u32,
    gpu: bool,
}

impl ContainerRunSpec {
    pub fn new(image: impl Into<String>, options: RunOptions) -> Self {
        Self {
            image: image.into(),
            env: options.env.unwrap_or_default(),
            command: options.command.unwrap_or_default(),
            mounts: options.mounts.unwrap_or_default(),
            memory_mib: options
                .memory_mib
                .filter(|mib| *mib > 0)
                .unwrap_or(DEFAULT_MEMORY_MIB),
            cpu_limit: options
                .cpu_limit
                .filter(|limit| *limit > 0)
                .unwrap_or(DEFAULT_CPU_LIMIT),
            gpu: options.gpu.unwrap_or(false),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn env(&self) -> &[EnvVar] {
        &self.env
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn mounts(&self) -> &[BindMount] {
        &self.mounts
    }

    pub fn memory_mib(&self) -> u64 {
        self.memory_mib
    }

    pub fn cpu_limit(&self) -> u32 {
        self.cpu_limit
    }

    pub fn gpu(&self) -> bool {
        self.gpu
    }

    pub fn memory_bytes(&self) -> i64 {
        i64::try_from(self.memory_mib)
            .unwrap_or(i64::MAX)
            .saturating_mul(1024 * 1024)
    }

    pub fn nano_cpus(&self) -> i64 {
        i64::from(self.cpu_limit).saturating_mul(NANO_CPUS_PER_UNIT)
    }

    /// Host path bound at `target`, if any.
    pub fn host_path(&self, target: &str) -> Option<&Path> {
        self.mounts
            .iter()
            .find(|m| m.target == target)
            .map(|m| m.source.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_apply_when_options_are_unset() {
        let spec = ContainerRunSpec::new("python:3.9-slim", RunOptions::default());
        assert_eq!(spec.image(), "python:3.9-slim");
        assert!(spec.env().is_empty());
        assert!(spec.command().is_empty());
        assert!(spec.mounts().is_empty());
        assert_eq!(spec.memory_mib(), DEFAULT_MEMORY_MIB);
        assert_eq!(spec.cpu_limit(), DEFAULT_CPU_LIMIT);
        assert!(!spec.gpu());
    }

    #[rstest]
    #[case::zero_memory(Some(0), None, DEFAULT_MEMORY_MIB, DEFAULT_CPU_LIMIT)]
    #[case::zero_cpu(None, Some(0), DEFAULT_MEMORY_MIB, DEFAULT_CPU_LIMIT)]
    #[case::explicit(Some(512), Some(250), 512, 250)]
    fn non_positive_limits_fall_back_to_defaults(
        #[case] memory_mib: Option<u64>,
        #[case] cpu_limit: Option<u32>,
        #[case] expected_memory: u64,
        #[case] expected_cpu: u32,
    ) {
        let spec = ContainerRunSpec::new(
            "img",
            RunOptions {
                memory_mib,
                cpu_limit,
                ..Default::default()
            },
        );
        assert_eq!(spec.memory_mib(), expected_memory);
        assert_eq!(spec.cpu_limit(), expected_cpu);
    }

    #[test]
    fn engine_units() {
        let spec = ContainerRunSpec::new("img", RunOptions::default());
        assert_eq!(spec.memory_bytes(), 100 * 1024 * 1024);
        // 100 units = one full core
        assert_eq!(spec.nano_cpus(), 1_000_000_000);
    }

    #[rstest]
    #[case::largest_signed(i64::MAX as u64)]
    #[case::largest_unsigned(u64::MAX)]
    fn huge_memory_limit_saturates(#[case] memory_mib: u64) {
        let spec = ContainerRunSpec::new(
            "img",
            RunOptions {
                memory_mib: Some(memory_mib),
                ..Default::default()
            },
        );
        assert_eq!(spec.memory_bytes(), i64::MAX);
    }

    #[test]
    fn env_order_is_preserved() {
        let spec = ContainerRunSpec::new(
            "img",
            RunOptions {
                env: Some(vec![EnvVar::new("B", "2"), EnvVar::new("A", "1")]),
                ..Default::default()
            },
        );
        let assignments: Vec<String> = spec.env().iter().map(EnvVar::assignment).collect();
        assert_eq!(assignments, vec!["B=2", "A=1"]);
    }

    #[test]
    fn host_path_lookup_by_target() {
        let spec = ContainerRunSpec::new(
            "img",
            RunOptions {
                mounts: Some(vec![
                    BindMount::read_only("/tmp/t1/data", "/app/data"),
                    BindMount::writable("/tmp/t1/result", "/app/result"),
                ]),
                ..Default::default()
            },
        );
        assert_eq!(spec.host_path("/app/result"), Some(Path::new("/tmp/t1/result")));
        assert_eq!(spec.host_path("/app/missing"), None);
    }

    #[test]
    fn run_options_deserialize_partially() {
        let options: RunOptions = serde_json::from_str(r#"{ "gpu": true }"#).unwrap();
        assert_eq!(options.gpu, Some(true));
        assert!(options.memory_mib.is_none());
    }
}
