//! Pure domain logic for the voxrun job orchestration core.
//!
//! Everything in this crate is deterministic and I/O-free: the sparse
//! job configuration model, the resolver that turns it into a concrete
//! container invocation, the log-line classifier, and the bounded
//! presentation buffer. The engine boundary and the async lifecycle
//! live in `voxrun-engine` and `voxrun-runner`.

pub mod buffer;
pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod invocation;

pub use buffer::PresentationBuffer;
pub use config::{JobConfig, JobMode};
pub use error::ConfigError;
pub use events::LogEvent;
pub use invocation::{resolve, InvocationSpec};
