use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crucible_core::app::{GpuCapability, LifecycleManager};
use crucible_core::domain::{ArtifactKey, TaskId, TaskReport};
use crucible_core::impls::{DockerEngine, LocalArtifactStore, SeedDirectory};
use crucible_core::ports::ArtifactStore;
use crucible_core::{PipelineBuilder, PipelineConfig, RunContext};

/// Run a containerized task and upload its result artifact.
#[derive(Parser, Debug)]
#[command(name = "crucible", author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one task and print its report as JSON
    Run(RunArgs),

    /// Check that the container engine is reachable
    Health,

    /// Print a time-limited download URL for a stored artifact
    Url(UrlArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Task identifier (generated when omitted)
    #[arg(long)]
    task_id: Option<String>,

    /// JSON file with the base pipeline configuration
    #[arg(long, env = "CRUCIBLE_CONFIG")]
    config: Option<PathBuf>,

    /// Parent directory of per-task staging trees (overrides config file)
    #[arg(long, env = "CRUCIBLE_STAGING_ROOT")]
    staging_root: Option<PathBuf>,

    /// Directory holding `data/` and `input/` seed files
    #[arg(long, env = "CRUCIBLE_SEED_DIR", default_value = "demos/seed")]
    seed_dir: PathBuf,

    /// Container image (overrides config file)
    #[arg(long)]
    image: Option<String>,

    /// Request GPU devices for the container
    #[arg(long)]
    gpu: bool,

    /// Abort the run after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Debug)]
struct UrlArgs {
    /// Artifact key, e.g. tasks/t1/out.json
    key: String,

    /// URL lifetime in seconds
    #[arg(long, default_value_t = 600)]
    ttl_secs: u64,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Root directory of the local artifact store
    #[arg(long, env = "CRUCIBLE_STORE_DIR", default_value = "artifacts")]
    store_dir: PathBuf,

    /// Bucket name
    #[arg(long, env = "CRUCIBLE_BUCKET", default_value = "results")]
    bucket: String,

    /// S3 / MinIO endpoint (host:port); uses the S3 store when set
    #[cfg(feature = "s3")]
    #[arg(long, env = "CRUCIBLE_S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    #[cfg(feature = "s3")]
    #[arg(long, env = "CRUCIBLE_S3_ACCESS_KEY", default_value = "")]
    s3_access_key: String,

    #[cfg(feature = "s3")]
    #[arg(long, env = "CRUCIBLE_S3_SECRET_KEY", default_value = "", hide_env_values = true)]
    s3_secret_key: String,

    #[cfg(feature = "s3")]
    #[arg(long, env = "CRUCIBLE_S3_USE_SSL")]
    s3_use_ssl: bool,

    #[cfg(feature = "s3")]
    #[arg(long, env = "CRUCIBLE_S3_REGION", default_value = "us-east-1")]
    s3_region: String,
}

impl StoreArgs {
    async fn open(&self) -> anyhow::Result<Arc<dyn ArtifactStore>> {
        #[cfg(feature = "s3")]
        if let Some(endpoint) = &self.s3_endpoint {
            use crucible_core::impls::{S3ArtifactStore, S3Config};

            let config = S3Config {
                endpoint: endpoint.clone(),
                access_key: self.s3_access_key.clone(),
                secret_key: self.s3_secret_key.clone(),
                use_ssl: self.s3_use_ssl,
                region: self.s3_region.clone(),
                bucket: self.bucket.clone(),
            };
            let store = S3ArtifactStore::connect(&config)
                .await
                .with_context(|| format!("connecting to object storage at {}", endpoint))?;
            return Ok(Arc::new(store));
        }

        let store = LocalArtifactStore::open(&self.store_dir, &self.bucket)
            .await
            .with_context(|| format!("opening artifact store at {}", self.store_dir.display()))?;
        Ok(Arc::new(store))
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(root) = args.staging_root {
        config.staging_root = root;
    }
    if let Some(image) = args.image {
        config.workload.image = image;
    }
    if args.gpu {
        config.workload.gpu = true;
    }

    let task_id = match args.task_id {
        Some(id) => TaskId::parse(id).context("invalid task id")?,
        None => TaskId::generate(),
    };

    let engine = DockerEngine::connect().context("connecting to the container engine")?;
    let pipeline = PipelineBuilder::new()
        .engine(Arc::new(engine))
        .store(args.store.open().await?)
        .inputs(Arc::new(SeedDirectory::new(args.seed_dir)))
        .config(config)
        .build()
        .await?;

    let ctx = match args.timeout_secs {
        Some(secs) => RunContext::with_timeout(Duration::from_secs(secs)),
        None => RunContext::new(),
    };
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling task");
                ctx.cancel();
            }
        });
    }

    info!(task_id = %task_id, "running task");
    let outcome = pipeline.run_task(&task_id, &ctx).await;
    let report = TaskReport::from_outcome(&task_id, &outcome);
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn health() -> anyhow::Result<ExitCode> {
    let status = match DockerEngine::connect() {
        Ok(engine) => {
            let manager = LifecycleManager::with_capability(Arc::new(engine), GpuCapability::new(false));
            manager.check_status().await.map_err(anyhow::Error::from)
        }
        Err(err) => Err(err.into()),
    };

    match status {
        Ok(()) => {
            println!("{}", json!({ "status": "ok" }));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{}", json!({ "status": format!("error: {:#}", err) }));
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn url(args: UrlArgs) -> anyhow::Result<ExitCode> {
    let key = ArtifactKey::parse(args.key).context("invalid artifact key")?;
    let store = args.store.open().await?;
    let url = store
        .presign(&key, Duration::from_secs(args.ttl_secs))
        .await
        .with_context(|| format!("presigning {}", key))?;
    println!("{}", url);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Health => health().await,
        Command::Url(args) => url(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "crucible",
            "run",
            "--task-id",
            "t1",
            "--image",
            "python:3.11-slim",
            "--gpu",
            "--store-dir",
            "/srv/artifacts",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.task_id.as_deref(), Some("t1"));
        assert_eq!(args.image.as_deref(), Some("python:3.11-slim"));
        assert!(args.gpu);
        assert_eq!(args.store.store_dir, PathBuf::from("/srv/artifacts"));
        assert_eq!(args.store.bucket, "results");
    }

    #[test]
    fn url_requires_a_key() {
        assert!(Cli::try_parse_from(["crucible", "url"]).is_err());
    }

    #[test]
    fn config_file_is_optional() {
        let config = load_config(None).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"capture_logs": false, "workload": {"image": "alpine"}}"#)
            .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(!config.capture_logs);
        assert_eq!(config.workload.image, "alpine");
    }
}
