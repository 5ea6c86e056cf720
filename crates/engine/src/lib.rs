//! Container engine boundary.
//!
//! Defines the [`ContainerEngine`] trait the lifecycle manager drives
//! (existence check, pull, create, attach, start, wait, stop, remove),
//! the Docker adapter implementing it over the local daemon socket,
//! and the codecs for the engine's attached output: the stream-framing
//! demultiplexer and the per-channel line reassembler.

pub mod api;
pub mod demux;
pub mod docker;
pub mod lines;

pub use api::{
    AttachStream, ContainerEngine, ContainerId, EngineError, ExitStatus, PullProgress, PullStream,
};
pub use demux::{encode_frame, Frame, MuxDecoder, StdChannel};
pub use docker::DockerEngine;
pub use lines::LineAssembler;
