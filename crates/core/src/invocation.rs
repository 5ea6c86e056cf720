//! Job configuration resolver.
//!
//! Pure translation from a sparse [`JobConfig`] into the concrete
//! [`InvocationSpec`] used to create the container. No I/O happens
//! here; the only observable side effect is a log line recording the
//! GPU scheduling decision.

use std::fmt::Display;
use std::path::PathBuf;

use crate::config::{specified_number, specified_text, JobConfig, JobMode};
use crate::error::ConfigError;

/// Container path at which the operator's working directory is bound.
pub const CONTAINER_WORKDIR: &str = "/workspace";

/// Execution provider identifier that triggers a GPU device request.
pub const GPU_PROVIDER: &str = "CUDAExecutionProvider";

/// Device driver named in the GPU device request.
pub const GPU_DRIVER: &str = "nvidia";

/// Resolved, immutable description of one container invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    /// Image reference to run.
    pub image: String,
    /// Entrypoint override; `None` keeps the image default.
    pub entrypoint: Option<Vec<String>>,
    /// Ordered argument list passed to the entrypoint.
    pub args: Vec<String>,
    /// Host resources bound into the container.
    pub bindings: ResourceBindings,
    /// Ask the engine to remove the container once it exits.
    pub auto_remove: bool,
}

/// Host-resource bindings derived from the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceBindings {
    /// Host directory bound read/write at [`CONTAINER_WORKDIR`].
    pub workdir: Option<PathBuf>,
    /// Request all GPUs of [`GPU_DRIVER`] with the `gpu` capability.
    pub all_gpus: bool,
}

/// Resolve a job configuration into an invocation of `image`.
///
/// Deterministic; fails only when the mode is absent or unrecognized.
pub fn resolve(config: &JobConfig, image: &str) -> Result<InvocationSpec, ConfigError> {
    let mode = config.job_mode()?;

    let (entrypoint, args) = match mode {
        JobMode::Synthesize => (None, synthesize_args(config)),
        JobMode::Lipsync => (Some(sub_program("lipsync.py")), Vec::new()),
        JobMode::Align => (Some(sub_program("align.py")), align_args(config)),
        JobMode::Mixing => (Some(sub_program("mixing.py")), Vec::new()),
    };

    let all_gpus = wants_gpu(config);
    if all_gpus {
        tracing::info!(
            driver = GPU_DRIVER,
            provider = GPU_PROVIDER,
            "configuration requests GPU execution, adding all-GPU device request",
        );
    }

    Ok(InvocationSpec {
        image: image.to_string(),
        entrypoint,
        args,
        bindings: ResourceBindings {
            workdir: config.workdir.clone(),
            all_gpus,
        },
        auto_remove: true,
    })
}

fn sub_program(script: &str) -> Vec<String> {
    vec!["python".to_string(), script.to_string()]
}

fn wants_gpu(config: &JobConfig) -> bool {
    config
        .providers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|p| p == GPU_PROVIDER)
}

/// Build the full synthesize argument vector.
///
/// Every populated tuning field becomes `--<name> <value>`; boolean
/// options become bare switches when true. The mean-opinion-score
/// filter is the one tri-state exception: exactly one of its two
/// switches is always present.
fn synthesize_args(config: &JobConfig) -> Vec<String> {
    let mut args = ArgList::default();

    args.text("api_key", &config.api_key);
    args.text("ext", &config.ext);
    args.value("tone_sample_len", specified_number(config.tone_sample_len));
    args.value("batch_size", config.batch_size);
    args.value("n_jobs", config.n_jobs);
    args.value("retries", config.retries);
    args.value("reinit_every", config.reinit_every);
    args.value("min_speed", specified_number(config.min_speed));
    args.value("max_speed", specified_number(config.max_speed));
    args.text("path", &config.path);
    args.text("delimiter", &config.delimiter);
    args.switch("use_prosody", config.use_prosody);

    // Tri-state: absent means "respect" — the switch is always emitted.
    if config.respect_mos.unwrap_or(true) {
        args.bare("is_respect_mos");
    } else {
        args.bare("no_respect_mos");
    }

    if let Some(providers) = &config.providers {
        let providers: Vec<&str> = providers
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if !providers.is_empty() {
            args.bare("providers");
            for provider in providers {
                args.raw(provider);
            }
        }
    }

    args.into_vec()
}

fn align_args(config: &JobConfig) -> Vec<String> {
    let mut args = ArgList::default();
    args.switch("use-voice-len", config.use_voice_len);
    args.into_vec()
}

/// Argument accumulator enforcing the "no NaN / null / blank tokens"
/// property in one place.
#[derive(Default)]
struct ArgList(Vec<String>);

impl ArgList {
    /// `--<name> <value>` for any already-validated value.
    fn value<T: Display>(&mut self, name: &str, value: Option<T>) {
        if let Some(value) = value {
            self.bare(name);
            self.0.push(value.to_string());
        }
    }

    /// `--<name> <text>` when the text is specified and non-blank.
    fn text(&mut self, name: &str, value: &Option<String>) {
        if let Some(text) = specified_text(value) {
            self.bare(name);
            self.0.push(text.to_string());
        }
    }

    /// Bare `--<name>` switch, emitted only when the option is true.
    fn switch(&mut self, name: &str, value: Option<bool>) {
        if value == Some(true) {
            self.bare(name);
        }
    }

    fn bare(&mut self, name: &str) {
        self.0.push(format!("--{name}"));
    }

    fn raw(&mut self, token: &str) {
        self.0.push(token.to_string());
    }

    fn into_vec(self) -> Vec<String> {
        self.0
    }
}
