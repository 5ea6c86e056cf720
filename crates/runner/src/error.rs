//! Job lifecycle error taxonomy.

use voxrun_core::ConfigError;
use voxrun_engine::{ContainerId, EngineError};

/// Errors from starting or waiting on a job.
///
/// Setup failures (`Config`, `Conflict`, `Provision`, `Creation`)
/// unwind fully: no container is left behind and the job handle stays
/// empty. `Runtime` describes an already-running job; by the time it
/// is returned the handle has been cleared and at least one event has
/// been emitted. Teardown (stop/remove) failures never appear here:
/// they are surfaced as error-line events and swallowed, since the
/// operator-visible state must still reach idle.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The configuration could not be interpreted. Nothing happened.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A job is already active. The existing job is unaffected; a
    /// second start is rejected, never queued.
    #[error("a job is already running in container {0}")]
    Conflict(ContainerId),

    /// The image pull failed before any container was created.
    #[error("image provisioning failed")]
    Provision(#[source] EngineError),

    /// The engine rejected container creation, attach, or start.
    #[error("container creation failed")]
    Creation(#[source] EngineError),

    /// The job ran but ended abnormally.
    #[error("job failed: {0}")]
    Runtime(String),
}
