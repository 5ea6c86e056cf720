//! The container engine trait and its wire-level types.
//!
//! The engine itself (image store, container runtime) is an external
//! collaborator reached over a local socket; this module only fixes
//! the contract the lifecycle manager depends on, so tests can drive
//! the manager against a scripted engine.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use voxrun_core::invocation::InvocationSpec;

/// Engine-assigned container identifier.
pub type ContainerId = String;

/// Raw combined output stream of an attached container, chunked
/// arbitrarily by the transport. Channels are multiplexed by the
/// engine's stream framing; feed the chunks through
/// [`MuxDecoder`](crate::demux::MuxDecoder).
pub type AttachStream = BoxStream<'static, Result<Bytes, EngineError>>;

/// Progress items relayed while an image pull is in flight.
pub type PullStream = BoxStream<'static, Result<PullProgress, EngineError>>;

/// One human-readable step of an image pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullProgress {
    /// Engine-provided status text ("Downloading", "Extracting", ...).
    pub status: String,
    /// Layer completion 0-100, when the engine reports byte counts.
    pub percent: Option<u8>,
}

/// Exit result of a finished container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Process exit code as reported by the engine.
    pub code: i64,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Errors from the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An engine API call was rejected or the daemon is unreachable.
    #[error("engine API error: {0}")]
    Api(String),

    /// An attach or pull stream broke mid-flight.
    #[error("engine stream error: {0}")]
    Stream(String),
}

/// Asynchronous client surface of the container engine.
///
/// All calls are non-blocking with respect to the rest of the
/// application; issuing a pull, create, start, or wait never blocks
/// the handling of a concurrent stop request.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check daemon reachability.
    async fn ping(&self) -> Result<(), EngineError>;

    /// Whether an image matching `reference` exactly exists locally.
    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError>;

    /// Start pulling `reference`, yielding progress until the pull
    /// stream terminates.
    fn pull_image(&self, reference: &str) -> PullStream;

    /// Create a container from the resolved invocation.
    async fn create_container(&self, spec: &InvocationSpec) -> Result<ContainerId, EngineError>;

    /// Attach to the container's combined stdout/stderr stream.
    async fn attach(&self, id: &str) -> Result<AttachStream, EngineError>;

    /// Start the created container.
    async fn start(&self, id: &str) -> Result<(), EngineError>;

    /// Block (cooperatively) until the container's process exits.
    async fn wait(&self, id: &str) -> Result<ExitStatus, EngineError>;

    /// Ask the engine to stop the container.
    async fn stop(&self, id: &str) -> Result<(), EngineError>;

    /// Remove the container.
    async fn remove(&self, id: &str) -> Result<(), EngineError>;
}
