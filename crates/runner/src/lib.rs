//! Job lifecycle management.
//!
//! Owns the single-active-job invariant: [`JobRunner`] resolves a
//! configuration, provisions the image, creates and starts exactly one
//! container, pumps its attached output through the demultiplexer and
//! classifier into a broadcast channel of [`LogEvent`]s, and tears the
//! container down on completion, failure, or operator stop.
//!
//! [`LogEvent`]: voxrun_core::LogEvent

pub mod error;
pub mod handle;
pub mod manager;
pub mod presenter;
pub mod processor;
pub mod provision;

pub use error::JobError;
pub use handle::JobHandle;
pub use manager::{JobPhase, JobRunner};
pub use presenter::{spawn_presenter, FLUSH_INTERVAL};
