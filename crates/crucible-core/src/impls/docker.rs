//! DockerEngine - bollard 経由の ContainerEngine（本番用）
//!
//! エンジン API をそのまま写す薄いアダプタ。方針（GPU fallback、削除のタイムアウト）は
//! LifecycleManager 側にある。

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{
    ContainerStateStatusEnum, ContainerWaitResponse, DeviceRequest, HostConfig, Mount,
    MountTypeEnum,
};
use futures::{StreamExt, TryStreamExt};
use tracing::debug;

use crate::domain::container::parse_engine_time;
use crate::domain::{
    ContainerExit, ContainerHandle, ContainerRequest, ContainerStateSnapshot, EngineError,
    LogChunk, LogSource, PullProgress,
};
use crate::ports::{ContainerEngine, LogStream, PullStream};

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using the local defaults (`DOCKER_HOST` or the local socket).
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults().map_err(map_error)?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn map_error(err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Api {
            status: status_code,
            message,
        },
        other => EngineError::Transport(other.to_string()),
    }
}

/// First item of the wait stream to an exit report.
fn wait_exit(
    item: Option<Result<ContainerWaitResponse, BollardError>>,
) -> Result<ContainerExit, EngineError> {
    match item {
        Some(Ok(response)) => Ok(ContainerExit {
            code: response.status_code,
            error: response.error.and_then(|e| e.message),
        }),
        // bollard reports a non-zero exit through its error channel
        Some(Err(BollardError::DockerContainerWaitError { error, code })) => Ok(ContainerExit {
            code,
            error: (!error.is_empty()).then_some(error),
        }),
        Some(Err(err)) => Err(map_error(err)),
        None => Err(EngineError::Transport(
            "wait stream ended without a status".to_string(),
        )),
    }
}

fn status_str(status: ContainerStateStatusEnum) -> &'static str {
    match status {
        ContainerStateStatusEnum::CREATED => "created",
        ContainerStateStatusEnum::RUNNING => "running",
        ContainerStateStatusEnum::PAUSED => "paused",
        ContainerStateStatusEnum::RESTARTING => "restarting",
        ContainerStateStatusEnum::REMOVING => "removing",
        ContainerStateStatusEnum::EXITED => "exited",
        ContainerStateStatusEnum::DEAD => "dead",
        _ => "unknown",
    }
}

fn create_config(request: &ContainerRequest) -> Config<String> {
    let mounts = request
        .mounts
        .iter()
        .map(|mount| Mount {
            source: Some(mount.source.to_string_lossy().into_owned()),
            target: Some(mount.target.clone()),
            typ: Some(MountTypeEnum::BIND),
            read_only: Some(mount.read_only),
            ..Default::default()
        })
        .collect();

    let device_requests = request.gpu.as_ref().map(|gpu| {
        vec![DeviceRequest {
            driver: Some(gpu.driver.clone()),
            count: Some(gpu.count),
            capabilities: Some(gpu.capabilities.clone()),
            ..Default::default()
        }]
    });

    let host_config = HostConfig {
        mounts: Some(mounts),
        memory: Some(request.memory_bytes),
        nano_cpus: Some(request.nano_cpus),
        device_requests,
        ..Default::default()
    };

    Config {
        image: Some(request.image.clone()),
        env: Some(request.env.clone()),
        cmd: (!request.command.is_empty()).then(|| request.command.clone()),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        match self.docker.inspect_image(image).await.map_err(map_error) {
            Ok(_) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> PullStream<'a> {
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });
        self.docker
            .create_image(options, None, None)
            .map(|item| {
                item.map(|info| PullProgress {
                    id: info.id,
                    status: info.status,
                    progress: info.progress,
                })
                .map_err(map_error)
            })
            .boxed()
    }

    async fn create_container(
        &self,
        request: &ContainerRequest,
    ) -> Result<ContainerHandle, EngineError> {
        let created = self
            .docker
            .create_container(
                None::<CreateContainerOptions<String>>,
                create_config(request),
            )
            .await
            .map_err(map_error)?;
        for warning in &created.warnings {
            debug!(container_id = %created.id, warning = %warning, "engine warning on create");
        }
        Ok(ContainerHandle::new(created.id))
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        self.docker
            .start_container(handle.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(map_error)
    }

    async fn wait_container(&self, handle: &ContainerHandle) -> Result<ContainerExit, EngineError> {
        let options = Some(WaitContainerOptions {
            condition: "not-running",
        });
        let mut stream = self.docker.wait_container(handle.as_str(), options).boxed();
        wait_exit(stream.next().await)
    }

    fn container_logs<'a>(&'a self, handle: &'a ContainerHandle, follow: bool) -> LogStream<'a> {
        let options = Some(LogsOptions::<String> {
            follow,
            stdout: true,
            stderr: true,
            ..Default::default()
        });
        self.docker
            .logs(handle.as_str(), options)
            .map_err(map_error)
            .try_filter_map(|output| async move {
                let chunk = match output {
                    LogOutput::StdOut { message } => Some((LogSource::Stdout, message)),
                    LogOutput::StdErr { message } => Some((LogSource::Stderr, message)),
                    LogOutput::Console { message } => Some((LogSource::Console, message)),
                    LogOutput::StdIn { .. } => None,
                };
                Ok(chunk.map(|(source, message)| LogChunk {
                    source,
                    bytes: message.to_vec(),
                }))
            })
            .boxed()
    }

    async fn inspect_container(
        &self,
        handle: &ContainerHandle,
    ) -> Result<ContainerStateSnapshot, EngineError> {
        let inspect = self
            .docker
            .inspect_container(handle.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(map_error)?;

        let state = inspect.state.unwrap_or_default();
        Ok(ContainerStateSnapshot {
            status: status_str(state.status.unwrap_or(ContainerStateStatusEnum::EMPTY))
                .to_string(),
            exit_code: state.exit_code.unwrap_or_default(),
            started_at: parse_engine_time(state.started_at.as_deref()),
            finished_at: parse_engine_time(state.finished_at.as_deref()),
            running: state.running.unwrap_or(false),
            oom_killed: state.oom_killed.unwrap_or(false),
            error: state.error.filter(|e| !e.is_empty()),
        })
    }

    async fn remove_container(
        &self,
        handle: &ContainerHandle,
        force: bool,
    ) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                handle.as_str(),
                Some(RemoveContainerOptions {
                    force,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_error)
    }

    async fn runtimes(&self) -> Result<Vec<String>, EngineError> {
        let info = self.docker.info().await.map_err(map_error)?;
        let mut names: Vec<String> = info.runtimes.unwrap_or_default().into_keys().collect();
        names.sort();
        Ok(names)
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await.map(|_| ()).map_err(map_error)
    }
}
