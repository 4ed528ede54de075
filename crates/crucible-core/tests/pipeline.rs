//! End-to-end pipeline scenarios against the in-memory engine.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crucible_core::app::{PipelineBuilder, PipelineConfig, RunContext, TaskPipeline, WorkloadConfig};
use crucible_core::domain::{
    ArtifactKey, ContainerHandle, ContainerRequest, EngineError, ErrorKind, Interrupt,
    LifecycleError, PipelineStage, StoreError, TaskError, TaskId,
};
use crucible_core::impls::{EngineCall, InMemoryEngine, LocalArtifactStore, SeedDirectory};
use crucible_core::ports::{ArtifactBody, ArtifactStore};

const IMAGE: &str = "python:3.9-slim";

/// Counts uploads, optionally failing them.
struct CountingStore {
    inner: LocalArtifactStore,
    uploads: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ArtifactStore for CountingStore {
    async fn upload(
        &self,
        key: &ArtifactKey,
        body: ArtifactBody,
        size: u64,
    ) -> Result<ArtifactKey, StoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError::Backend("503 Service Unavailable".to_string()));
        }
        self.inner.upload(key, body, size).await
    }

    async fn presign(&self, key: &ArtifactKey, ttl: Duration) -> Result<String, StoreError> {
        self.inner.presign(key, ttl).await
    }
}

struct Harness {
    staging: TempDir,
    store_dir: TempDir,
    seed: TempDir,
}

impl Harness {
    fn new() -> Self {
        let seed = TempDir::new().unwrap();
        std::fs::create_dir_all(seed.path().join("data")).unwrap();
        std::fs::create_dir_all(seed.path().join("input")).unwrap();
        std::fs::write(seed.path().join("data/main.py"), b"print('scoring')\n").unwrap();
        std::fs::write(seed.path().join("input/input.json"), b"{\"values\": [1, 2]}").unwrap();
        Self {
            staging: TempDir::new().unwrap(),
            store_dir: TempDir::new().unwrap(),
            seed,
        }
    }

    async fn store(&self, fail: bool) -> Arc<CountingStore> {
        Arc::new(CountingStore {
            inner: LocalArtifactStore::open(self.store_dir.path(), "results")
                .await
                .unwrap(),
            uploads: AtomicUsize::new(0),
            fail,
        })
    }

    fn config(&self, gpu: bool) -> PipelineConfig {
        PipelineConfig {
            staging_root: self.staging.path().to_path_buf(),
            workload: WorkloadConfig {
                image: IMAGE.to_string(),
                gpu,
                ..Default::default()
            },
            cleanup_timeout_secs: 1,
            capture_logs: false,
            ..Default::default()
        }
    }

    async fn pipeline(
        &self,
        engine: Arc<InMemoryEngine>,
        store: Arc<CountingStore>,
        config: PipelineConfig,
        gpu: Option<bool>,
    ) -> TaskPipeline {
        let builder = PipelineBuilder::new()
            .engine(engine)
            .store(store)
            .inputs(Arc::new(SeedDirectory::new(self.seed.path())))
            .config(config);
        let builder = match gpu {
            Some(available) => builder.gpu_capability(available),
            None => builder,
        };
        builder.build().await.unwrap()
    }

    fn staging_entries(&self) -> usize {
        std::fs::read_dir(self.staging.path()).unwrap().count()
    }
}

fn write_result(request: &ContainerRequest, name: &str, contents: &[u8]) {
    let result = request.host_path("/app/result").unwrap();
    std::fs::write(result.join(name), contents).unwrap();
}

fn driver_failure() -> EngineError {
    EngineError::Api {
        status: 500,
        message: "could not select device driver \"nvidia\" with capabilities: [[gpu]]".to_string(),
    }
}

fn creates(engine: &InMemoryEngine) -> Vec<bool> {
    engine
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            EngineCall::Create { gpu, .. } => Some(gpu),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn t1_uploads_out_json_and_leaves_nothing_behind() {
    let harness = Harness::new();
    let engine = Arc::new(InMemoryEngine::new().with_workload(|req| {
        write_result(req, "out.json", br#"{"score": 6.25}"#);
        0
    }));
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine.clone(), store.clone(), harness.config(false), Some(false))
        .await;

    let key = pipeline
        .run_task(&TaskId::parse("t1").unwrap(), &RunContext::new())
        .await
        .unwrap();

    assert_eq!(key.as_str(), "tasks/t1/out.json");
    assert_eq!(
        std::fs::read(harness.store_dir.path().join("results/tasks/t1/out.json")).unwrap(),
        br#"{"score": 6.25}"#
    );
    assert_eq!(harness.staging_entries(), 0);
    assert_eq!(engine.live_containers(), 0);

    let request = &engine.create_requests()[0];
    assert_eq!(request.image, IMAGE);
    let modes: Vec<_> = request
        .mounts
        .iter()
        .map(|m| (m.target.as_str(), m.read_only))
        .collect();
    assert_eq!(
        modes,
        [("/app/data", true), ("/app/input", true), ("/app/result", false)]
    );
    assert!(request.env.contains(&"RESULT_DIR=/app/result".to_string()));
}

#[tokio::test]
async fn non_zero_exit_with_result_still_succeeds() {
    let harness = Harness::new();
    let engine = Arc::new(InMemoryEngine::new().with_image(IMAGE).with_workload(|req| {
        write_result(req, "partial.json", b"{}");
        3
    }));
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine.clone(), store.clone(), harness.config(false), Some(false))
        .await;

    let key = pipeline
        .run_task(&TaskId::parse("t2").unwrap(), &RunContext::new())
        .await
        .unwrap();

    assert_eq!(key.as_str(), "tasks/t2/partial.json");
    assert_eq!(store.uploads.load(Ordering::SeqCst), 1);
    assert!(engine.calls().iter().any(|c| matches!(c, EngineCall::Inspect(_))));
}

#[tokio::test]
async fn missing_artifact_fails_without_touching_the_store() {
    let harness = Harness::new();
    let engine = Arc::new(InMemoryEngine::new().with_image(IMAGE));
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine.clone(), store.clone(), harness.config(false), Some(false))
        .await;

    let err = pipeline
        .run_task(&TaskId::parse("t3").unwrap(), &RunContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::MissingArtifact(_)));
    assert_eq!(err.stage(), PipelineStage::Collecting);
    assert_eq!(err.kind(), ErrorKind::Workload);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(harness.staging_entries(), 0);
    assert_eq!(engine.live_containers(), 0);
}

#[tokio::test]
async fn leftover_result_from_an_earlier_run_is_not_uploaded() {
    let harness = Harness::new();
    let stale = harness.staging.path().join("t1/result");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("old.json"), b"{\"stale\": true}").unwrap();

    let engine = Arc::new(InMemoryEngine::new().with_image(IMAGE));
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine.clone(), store.clone(), harness.config(false), Some(false))
        .await;

    let err = pipeline
        .run_task(&TaskId::parse("t1").unwrap(), &RunContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::MissingArtifact(_)));
    assert_eq!(store.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn wait_channel_error_fails_and_force_removes() {
    let harness = Harness::new();
    let engine = Arc::new(
        InMemoryEngine::new()
            .with_image(IMAGE)
            .with_workload(|req| {
                write_result(req, "out.json", b"{}");
                0
            })
            .fail_wait(EngineError::Transport("connection reset by peer".to_string())),
    );
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine.clone(), store.clone(), harness.config(false), Some(false))
        .await;

    let err = pipeline
        .run_task(&TaskId::parse("t9").unwrap(), &RunContext::new())
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        TaskError::Container(LifecycleError::Wait(EngineError::Transport(_)))
    ));
    assert_eq!(err.stage(), PipelineStage::Running);
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(
        engine
            .calls()
            .iter()
            .any(|c| matches!(c, EngineCall::Remove { force: true, .. }))
    );
    assert_eq!(engine.live_containers(), 0);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn gpu_driver_failure_retries_once_on_cpu() {
    let harness = Harness::new();
    let engine = Arc::new(
        InMemoryEngine::new()
            .with_image(IMAGE)
            .fail_next_start(driver_failure())
            .with_workload(|req| {
                assert!(req.gpu.is_none());
                write_result(req, "out.json", b"{}");
                0
            }),
    );
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine.clone(), store, harness.config(true), Some(true))
        .await;

    pipeline
        .run_task(&TaskId::parse("gpu1").unwrap(), &RunContext::new())
        .await
        .unwrap();

    assert_eq!(creates(&engine), [true, false]);
    assert!(!pipeline.manager().gpu_available());

    // the first container is removed before the second is created
    let calls = engine.calls();
    let first_remove = calls
        .iter()
        .position(|c| matches!(c, EngineCall::Remove { .. }))
        .unwrap();
    let second_create = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, EngineCall::Create { .. }))
        .nth(1)
        .map(|(i, _)| i)
        .unwrap();
    assert!(first_remove < second_create);

    // capability stays off for later runs
    pipeline
        .run_task(&TaskId::parse("gpu2").unwrap(), &RunContext::new())
        .await
        .unwrap();
    assert_eq!(creates(&engine), [true, false, false]);
}

#[tokio::test]
async fn gpu_request_without_gpu_runtime_runs_on_cpu() {
    let harness = Harness::new();
    let engine = Arc::new(
        InMemoryEngine::new()
            .with_image(IMAGE)
            .with_runtimes(&[])
            .with_workload(|req| {
                write_result(req, "out.json", b"{}");
                0
            }),
    );
    let store = harness.store(false).await;
    // probe the engine
    let pipeline = harness
        .pipeline(engine.clone(), store, harness.config(true), None)
        .await;
    assert!(!pipeline.manager().gpu_available());

    pipeline
        .run_task(&TaskId::parse("t1").unwrap(), &RunContext::new())
        .await
        .unwrap();

    assert_eq!(creates(&engine), [false]);
    assert!(engine.create_requests().iter().all(|r| r.gpu.is_none()));
}

#[tokio::test]
async fn removing_an_already_removed_container_is_harmless() {
    let harness = Harness::new();
    let engine = Arc::new(InMemoryEngine::new().with_image(IMAGE).with_workload(|req| {
        write_result(req, "out.json", b"{}");
        0
    }));
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine.clone(), store, harness.config(false), Some(false))
        .await;

    pipeline
        .run_task(&TaskId::parse("t4").unwrap(), &RunContext::new())
        .await
        .unwrap();

    let id = engine
        .calls()
        .into_iter()
        .find_map(|call| match call {
            EngineCall::Remove { id, .. } => Some(id),
            _ => None,
        })
        .unwrap();
    assert!(
        pipeline
            .manager()
            .remove_container(ContainerHandle::new(id), true)
            .await
    );
}

#[tokio::test]
async fn staging_exists_while_running_and_is_gone_after() {
    let harness = Harness::new();
    let seen = Arc::new(AtomicBool::new(false));
    let engine = {
        let seen = seen.clone();
        Arc::new(InMemoryEngine::new().with_image(IMAGE).with_workload(move |req| {
            let data = req.host_path("/app/data").unwrap();
            let input = req.host_path("/app/input").unwrap();
            seen.store(
                data.join("main.py").is_file() && input.join("input.json").is_file(),
                Ordering::SeqCst,
            );
            write_result(req, "out.json", b"{}");
            0
        }))
    };
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine, store, harness.config(false), Some(false))
        .await;
    let staging_root: &Path = harness.staging.path();

    pipeline
        .run_task(&TaskId::parse("t5").unwrap(), &RunContext::new())
        .await
        .unwrap();

    assert!(seen.load(Ordering::SeqCst));
    assert!(!staging_root.join("t5").exists());
}

#[tokio::test]
async fn upload_failure_still_cleans_up() {
    let harness = Harness::new();
    let engine = Arc::new(InMemoryEngine::new().with_image(IMAGE).with_workload(|req| {
        write_result(req, "out.json", b"{}");
        0
    }));
    let store = harness.store(true).await;
    let pipeline = harness
        .pipeline(engine.clone(), store.clone(), harness.config(false), Some(false))
        .await;

    let err = pipeline
        .run_task(&TaskId::parse("t6").unwrap(), &RunContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Upload(_)));
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(engine.live_containers(), 0);
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn deadline_during_wait_removes_the_container() {
    let harness = Harness::new();
    let engine = Arc::new(InMemoryEngine::new().with_image(IMAGE).hang_on_wait());
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine.clone(), store.clone(), harness.config(false), Some(false))
        .await;

    let ctx = RunContext::with_timeout(Duration::from_millis(100));
    let err = pipeline
        .run_task(&TaskId::parse("t7").unwrap(), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        TaskError::Container(inner) if inner.interrupt() == Some(Interrupt::DeadlineExceeded)
    ));
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert_eq!(engine.live_containers(), 0);
    assert!(
        engine
            .calls()
            .iter()
            .any(|c| matches!(c, EngineCall::Remove { force: true, .. }))
    );
    assert_eq!(store.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn cancelled_run_starts_nothing() {
    let harness = Harness::new();
    let engine = Arc::new(InMemoryEngine::new().with_image(IMAGE));
    let store = harness.store(false).await;
    let pipeline = harness
        .pipeline(engine.clone(), store, harness.config(false), Some(false))
        .await;

    let ctx = RunContext::new();
    ctx.cancel();
    let err = pipeline
        .run_task(&TaskId::parse("t8").unwrap(), &ctx)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(engine.create_requests().is_empty());
    assert_eq!(harness.staging_entries(), 0);
}
