//! InMemoryEngine - 開発・テスト用のコンテナエンジン
//!
//! # 学習ポイント
//! - 失敗を事前に仕込める（start / create / pull / wait / runtimes / ping）
//! - 呼び出し履歴（`calls()`）で操作の順序を検証できる
//! - "ワークロード" はクロージャ。start 時に同期で実行し、終了コードを記録する
//!
//! ロックは await をまたいで保持しない。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;

use crate::domain::{
    ContainerExit, ContainerHandle, ContainerRequest, ContainerStateSnapshot, EngineError,
    LogChunk, PullProgress,
};
use crate::ports::{ContainerEngine, LogStream, PullStream};

/// Runs "inside" the container at start time and returns its exit code.
pub type Workload = Arc<dyn Fn(&ContainerRequest) -> i64 + Send + Sync>;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    ImageExists(String),
    Pull(String),
    Create { id: String, gpu: bool },
    Start(String),
    Wait(String),
    Logs(String),
    Inspect(String),
    Remove { id: String, force: bool },
    Runtimes,
    Ping,
}

struct FakeContainer {
    request: ContainerRequest,
    exit: Option<ContainerExit>,
}

#[derive(Default)]
struct EngineState {
    images: HashSet<String>,
    containers: HashMap<String, FakeContainer>,
    requests: Vec<ContainerRequest>,
    calls: Vec<EngineCall>,
    next_id: u64,
    start_failures: VecDeque<EngineError>,
    create_failure: Option<EngineError>,
    pull_failure: Option<EngineError>,
    runtimes_failure: Option<EngineError>,
    wait_failure: Option<EngineError>,
    ping_failure: Option<EngineError>,
}

/// InMemoryEngine は開発用のコンテナエンジン
///
/// # 使用例
/// ```ignore
/// let engine = InMemoryEngine::new()
///     .with_image("python:3.9-slim")
///     .with_workload(|req| { /* write into req.host_path("/app/result") */ 0 });
/// ```
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
    runtimes: Vec<String>,
    workload: Option<Workload>,
    logs: Vec<LogChunk>,
    pull_progress: Vec<PullProgress>,
    hang_on_wait: bool,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            runtimes: vec!["runc".to_string()],
            workload: None,
            logs: Vec::new(),
            pull_progress: Vec::new(),
            hang_on_wait: false,
        }
    }

    /// Image already present locally.
    pub fn with_image(mut self, image: &str) -> Self {
        self.state.get_mut().images.insert(image.to_string());
        self
    }

    pub fn with_runtimes(mut self, runtimes: &[&str]) -> Self {
        self.runtimes = runtimes.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_workload<F>(mut self, workload: F) -> Self
    where
        F: Fn(&ContainerRequest) -> i64 + Send + Sync + 'static,
    {
        self.workload = Some(Arc::new(workload));
        self
    }

    pub fn with_logs(mut self, logs: Vec<LogChunk>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_pull_progress(mut self, progress: Vec<PullProgress>) -> Self {
        self.pull_progress = progress;
        self
    }

    /// Queue a failure for the next start call. Repeatable.
    pub fn fail_next_start(mut self, err: EngineError) -> Self {
        self.state.get_mut().start_failures.push_back(err);
        self
    }

    pub fn fail_create(mut self, err: EngineError) -> Self {
        self.state.get_mut().create_failure = Some(err);
        self
    }

    pub fn fail_pull(mut self, err: EngineError) -> Self {
        self.state.get_mut().pull_failure = Some(err);
        self
    }

    pub fn fail_runtimes(mut self, err: EngineError) -> Self {
        self.state.get_mut().runtimes_failure = Some(err);
        self
    }

    /// The next wait fails on the engine side, as a dropped connection would.
    pub fn fail_wait(mut self, err: EngineError) -> Self {
        self.state.get_mut().wait_failure = Some(err);
        self
    }

    /// Ping fails with a transport error.
    pub fn unreachable(mut self) -> Self {
        self.state.get_mut().ping_failure =
            Some(EngineError::Transport("connection refused".to_string()));
        self
    }

    /// `wait_container` never returns.
    pub fn hang_on_wait(mut self) -> Self {
        self.hang_on_wait = true;
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// Every request that reached `create_container`, in order.
    pub fn create_requests(&self) -> Vec<ContainerRequest> {
        self.state.lock().requests.clone()
    }

    /// Containers created and not yet removed.
    pub fn live_containers(&self) -> usize {
        self.state.lock().containers.len()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.state.lock().images.contains(image)
    }

}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn no_such_container(id: &str) -> EngineError {
    EngineError::NotFound(format!("no such container: {}", id))
}

#[async_trait]
impl ContainerEngine for InMemoryEngine {
    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::ImageExists(image.to_string()));
        Ok(state.images.contains(image))
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> PullStream<'a> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Pull(image.to_string()));

        let items: Vec<Result<PullProgress, EngineError>> = match state.pull_failure.take() {
            Some(err) => vec![Err(err)],
            None => {
                state.images.insert(image.to_string());
                self.pull_progress.iter().cloned().map(Ok).collect()
            }
        };
        futures::stream::iter(items).boxed()
    }

    async fn create_container(
        &self,
        request: &ContainerRequest,
    ) -> Result<ContainerHandle, EngineError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        state.calls.push(EngineCall::Create {
            id: id.clone(),
            gpu: request.gpu.is_some(),
        });
        state.requests.push(request.clone());

        if let Some(err) = state.create_failure.take() {
            return Err(err);
        }
        if !state.images.contains(&request.image) {
            return Err(EngineError::NotFound(format!(
                "no such image: {}",
                request.image
            )));
        }

        state.containers.insert(
            id.clone(),
            FakeContainer {
                request: request.clone(),
                exit: None,
            },
        );
        Ok(ContainerHandle::new(id))
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        let request = {
            let mut state = self.state.lock();
            state.calls.push(EngineCall::Start(handle.as_str().to_string()));
            let request = match state.containers.get(handle.as_str()) {
                Some(container) => container.request.clone(),
                None => return Err(no_such_container(handle.as_str())),
            };
            if let Some(err) = state.start_failures.pop_front() {
                return Err(err);
            }
            request
        };

        let code = match &self.workload {
            Some(workload) => workload(&request),
            None => 0,
        };

        let mut state = self.state.lock();
        if let Some(container) = state.containers.get_mut(handle.as_str()) {
            container.exit = Some(ContainerExit::code(code));
        }
        Ok(())
    }

    async fn wait_container(&self, handle: &ContainerHandle) -> Result<ContainerExit, EngineError> {
        let exit = {
            let mut state = self.state.lock();
            state.calls.push(EngineCall::Wait(handle.as_str().to_string()));
            if let Some(err) = state.wait_failure.take() {
                return Err(err);
            }
            match state.containers.get(handle.as_str()) {
                Some(container) => container.exit.clone(),
                None => return Err(no_such_container(handle.as_str())),
            }
        };

        if self.hang_on_wait {
            std::future::pending::<()>().await;
        }

        exit.ok_or_else(|| EngineError::Api {
            status: 409,
            message: format!("container {} is not started", handle.short()),
        })
    }

    fn container_logs<'a>(&'a self, handle: &'a ContainerHandle, _follow: bool) -> LogStream<'a> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Logs(handle.as_str().to_string()));
        let items: Vec<Result<LogChunk, EngineError>> =
            if state.containers.contains_key(handle.as_str()) {
                self.logs.iter().cloned().map(Ok).collect()
            } else {
                vec![Err(no_such_container(handle.as_str()))]
            };
        futures::stream::iter(items).boxed()
    }

    async fn inspect_container(
        &self,
        handle: &ContainerHandle,
    ) -> Result<ContainerStateSnapshot, EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Inspect(handle.as_str().to_string()));
        let container = state
            .containers
            .get(handle.as_str())
            .ok_or_else(|| no_such_container(handle.as_str()))?;

        let snapshot = match &container.exit {
            Some(exit) => ContainerStateSnapshot {
                status: "exited".to_string(),
                exit_code: exit.code,
                started_at: Some(Utc::now()),
                finished_at: Some(Utc::now()),
                running: false,
                oom_killed: false,
                error: exit.error.clone(),
            },
            None => ContainerStateSnapshot {
                status: "created".to_string(),
                ..Default::default()
            },
        };
        Ok(snapshot)
    }

    async fn remove_container(
        &self,
        handle: &ContainerHandle,
        force: bool,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Remove {
            id: handle.as_str().to_string(),
            force,
        });
        match state.containers.remove(handle.as_str()) {
            Some(_) => Ok(()),
            None => Err(no_such_container(handle.as_str())),
        }
    }

    async fn runtimes(&self) -> Result<Vec<String>, EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Runtimes);
        match &state.runtimes_failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.runtimes.clone()),
        }
    }

    async fn ping(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Ping);
        match &state.ping_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
