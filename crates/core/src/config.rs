//! Job configuration model.
//!
//! A [`JobConfig`] is the record handed over by the configuration UI,
//! one per job start request. Fields are sparse: the UI sends whatever
//! the operator filled in, so absent, `null`, `NaN`, and blank-string
//! values all mean "not specified" and must never leak into the
//! derived container invocation.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// The four supported batch job modes.
///
/// A closed set: the wire format carries a string, but everything past
/// the boundary dispatches by matching on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// Speech synthesis over the working directory (the image default
    /// entrypoint).
    Synthesize,
    /// Lip-sync post-processing sub-program.
    Lipsync,
    /// Forced-alignment sub-program.
    Align,
    /// Track mixing sub-program.
    Mixing,
}

impl FromStr for JobMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synthesize" => Ok(Self::Synthesize),
            "lipsync" => Ok(Self::Lipsync),
            "align" => Ok(Self::Align),
            "mixing" => Ok(Self::Mixing),
            other => Err(ConfigError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Configuration for one job, as delivered by the operator's form.
///
/// All payload fields are optional. [`resolve`](crate::invocation::resolve)
/// decides which of them become container arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Requested job mode (`synthesize`, `lipsync`, `align`, `mixing`).
    pub mode: Option<String>,

    /// Credential token for the synthesis backend. Only the
    /// `synthesize` mode ever forwards it.
    pub api_key: Option<String>,
    /// Audio file extension filter (e.g. `wav`).
    pub ext: Option<String>,
    /// Samples processed per batch.
    pub batch_size: Option<u32>,
    /// Length of the tone-reference sample, in seconds.
    pub tone_sample_len: Option<f64>,
    /// Parallel worker count inside the container.
    pub n_jobs: Option<u32>,
    /// Retry attempts for a failed sample.
    pub retries: Option<u32>,
    /// Reinitialize the synthesis session every N samples.
    pub reinit_every: Option<u32>,
    /// Lower bound for speed adjustment.
    pub min_speed: Option<f64>,
    /// Upper bound for speed adjustment.
    pub max_speed: Option<f64>,
    /// Condition synthesis on source prosody.
    pub use_prosody: Option<bool>,
    /// Respect the mean-opinion-score filter. Tri-state: absent means
    /// true; the resolver always emits one of the two switches.
    pub respect_mos: Option<bool>,
    /// Align mode only: derive segment length from the voice track.
    pub use_voice_len: Option<bool>,
    /// ONNX execution providers, e.g. `CPUExecutionProvider` or
    /// `CUDAExecutionProvider`.
    pub providers: Option<Vec<String>>,
    /// Host directory bound into the container at the fixed workdir
    /// path.
    pub workdir: Option<PathBuf>,
    /// Restrict processing to a sub-path of the working directory.
    pub path: Option<String>,
    /// CSV delimiter for the input manifest.
    pub delimiter: Option<String>,
}

impl JobConfig {
    /// Parse and validate the job mode.
    ///
    /// Fails with [`ConfigError::MissingMode`] when absent or blank,
    /// [`ConfigError::UnsupportedMode`] for anything outside the four
    /// recognized values.
    pub fn job_mode(&self) -> Result<JobMode, ConfigError> {
        match specified_text(&self.mode) {
            Some(mode) => mode.parse(),
            None => Err(ConfigError::MissingMode),
        }
    }
}

/// Treat `None` and blank/whitespace-only strings as "not specified".
pub(crate) fn specified_text(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Treat `None` and non-finite numbers (NaN, infinities) as "not
/// specified".
pub(crate) fn specified_number(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
