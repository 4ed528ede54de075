//! Domain model (IDs, run specs, container values, states, errors, outcomes).

pub mod container;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod run_spec;
pub mod state;

pub use container::{
    ContainerExit, ContainerRequest, ContainerStateSnapshot, GpuRequest, LogChunk, LogSource,
    PullProgress,
};
pub use errors::{
    EngineError, ErrorKind, Interrupt, LifecycleError, StoreError, TaskError,
    is_driver_selection_failure,
};
pub use ids::{ArtifactKey, ContainerHandle, InvalidId, TaskId};
pub use outcome::{OutcomeKind, TaskOutcome, TaskReport};
pub use run_spec::{BindMount, ContainerRunSpec, EnvVar, RunOptions};
pub use state::{LifecycleState, PipelineStage};
