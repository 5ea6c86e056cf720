//! Configuration-level errors.

/// Errors produced while interpreting a [`JobConfig`](crate::JobConfig).
///
/// These are fatal to the start attempt and carry no side effects:
/// nothing has been provisioned or created when they are returned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration did not name a job mode.
    #[error("job mode is missing")]
    MissingMode,

    /// The job mode is not one of the four recognized values.
    #[error("unsupported job mode: {0:?}")]
    UnsupportedMode(String),
}
