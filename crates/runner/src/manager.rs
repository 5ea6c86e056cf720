//! Single-job lifecycle manager.
//!
//! [`JobRunner`] is created once and shared (`Arc`) between the
//! configuration surface, the stop control, and the presentation
//! layer. It enforces that at most one container is active per
//! process: a second start while one runs is rejected, never queued
//! and never allowed to kill the running job.
//!
//! Per job the phases are `Idle → Provisioning → Created → Running →
//! (Completed | Stopped | Failed) → Idle`; the current phase is
//! published on a `watch` channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use voxrun_core::classify::STOP_CONFIRMATION;
use voxrun_core::invocation::resolve;
use voxrun_core::{JobConfig, LogEvent};
use voxrun_engine::{ContainerEngine, ContainerId, EngineError, ExitStatus};

use crate::error::JobError;
use crate::handle::JobHandle;
use crate::processor::pump_output;
use crate::provision::ensure_image;

/// Broadcast capacity for log events. Bounds memory under a burst; a
/// lagging subscriber skips ahead rather than stalling the pump.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Lifecycle phase of the runner's current (or last) job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Provisioning,
    Created,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

/// Orchestrates one container job at a time against a
/// [`ContainerEngine`].
pub struct JobRunner {
    engine: Arc<dyn ContainerEngine>,
    image: String,
    handle: JobHandle,
    events: broadcast::Sender<LogEvent>,
    phase_tx: watch::Sender<JobPhase>,
    stop_ready_tx: watch::Sender<bool>,
    /// Join handle of the spawned output pump for the active job.
    pump: Mutex<Option<JoinHandle<bool>>>,
    /// Set by `stop_job` so the racing `wait_job` reports `Stopped`
    /// rather than `Failed` for the stop-induced nonzero exit.
    stopping: AtomicBool,
    /// Cancelled on shutdown; aborts the pump.
    cancel: CancellationToken,
}

impl JobRunner {
    /// Create a runner for jobs of `image` on the given engine.
    pub fn new(engine: Arc<dyn ContainerEngine>, image: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (phase_tx, _) = watch::channel(JobPhase::Idle);
        let (stop_ready_tx, _) = watch::channel(false);
        Self {
            engine,
            image: image.into(),
            handle: JobHandle::new(),
            events,
            phase_tx,
            stop_ready_tx,
            pump: Mutex::new(None),
            stopping: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to the job's log events.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    /// Watch the lifecycle phase.
    pub fn phase(&self) -> watch::Receiver<JobPhase> {
        self.phase_tx.subscribe()
    }

    /// Watch the ready/unready signal for the stop control.
    pub fn stop_ready(&self) -> watch::Receiver<bool> {
        self.stop_ready_tx.subscribe()
    }

    /// The process-wide record of the active container.
    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// Resolve, provision, create, attach, and start one job.
    ///
    /// On success the container identifier is recorded in the
    /// [`JobHandle`] and the output pump is running; call
    /// [`wait_job`](Self::wait_job) to drive it to completion. Every
    /// failure is emitted as an event before this returns, and setup
    /// failures leave no container and an empty handle behind.
    pub async fn start_job(&self, config: &JobConfig) -> Result<ContainerId, JobError> {
        if let Some(active) = self.handle.active() {
            tracing::warn!(container = %active, "start rejected, a job is already running");
            let _ = self.events.send(LogEvent::ErrorLine(
                "❌ A job is already running; stop it first.".to_string(),
            ));
            return Err(JobError::Conflict(active));
        }

        let spec = resolve(config, &self.image)?;
        tracing::info!(image = %spec.image, args = ?spec.args, "starting job");
        let _ = self
            .events
            .send(LogEvent::Line(format!("Container arguments: {}", spec.args.join(" "))));

        self.set_phase(JobPhase::Provisioning);
        self.stopping.store(false, Ordering::SeqCst);
        let _ = self.stop_ready_tx.send(false);

        if let Err(err) = ensure_image(self.engine.as_ref(), &spec.image, &self.events).await {
            self.fail_setup(&format!("❌ Image pull failed: {err}"));
            return Err(err);
        }

        let id = match self.engine.create_container(&spec).await {
            Ok(id) => id,
            Err(err) => {
                self.fail_setup(&format!("❌ Container creation failed: {err}"));
                return Err(JobError::Creation(err));
            }
        };

        if let Err(occupied) = self.handle.set(id.clone()) {
            // Lost a start race after creation; ours must not linger.
            let _ = self.engine.remove(&id).await;
            self.fail_setup("❌ A job is already running; stop it first.");
            return Err(JobError::Conflict(occupied));
        }
        self.set_phase(JobPhase::Created);
        let _ = self
            .events
            .send(LogEvent::Line(format!("Container created: {id}")));

        let stream = match self.engine.attach(&id).await {
            Ok(stream) => stream,
            Err(err) => return Err(self.abort_created(&id, err).await),
        };

        // The pump outlives this call; shutdown cancels it.
        let pump = {
            let events = self.events.clone();
            let stop_ready = self.stop_ready_tx.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    failed = pump_output(stream, events, stop_ready) => failed,
                    _ = cancel.cancelled() => true,
                }
            })
        };
        *self.pump.lock().await = Some(pump);

        if let Err(err) = self.engine.start(&id).await {
            return Err(self.abort_created(&id, err).await);
        }
        let _ = self.events.send(LogEvent::Line("Container started".to_string()));
        self.set_phase(JobPhase::Running);
        let _ = self.stop_ready_tx.send(true);
        Ok(id)
    }

    /// Wait until the active container's process exits.
    ///
    /// Cooperative: a concurrent [`stop_job`](Self::stop_job) makes
    /// the engine end the process and this call observes the exit.
    /// Drains the output pump (flushing partial lines), emits
    /// [`LogEvent::Done`], and clears the handle on a guaranteed path
    /// whatever the outcome.
    pub async fn wait_job(&self) -> Result<ExitStatus, JobError> {
        let Some(id) = self.handle.active() else {
            return Err(JobError::Runtime("no active job to wait for".to_string()));
        };

        // Clears the handle even if this future is dropped or an early
        // path returns; idempotent against the stop path's capture.
        let _guard = ClearGuard {
            handle: &self.handle,
            id: id.clone(),
        };

        let waited = self.engine.wait(&id).await;

        // Drain the pump before Done so partial-line flushes keep
        // their place in the event order.
        let pump_failed = match self.pump.lock().await.take() {
            Some(pump) => pump.await.unwrap_or(true),
            None => false,
        };

        let stopped = self.stopping.swap(false, Ordering::SeqCst);

        let result = match waited {
            Ok(status) => {
                if stopped {
                    self.set_phase(JobPhase::Stopped);
                } else if status.success() && !pump_failed {
                    let _ = self
                        .events
                        .send(LogEvent::Line("Container finished".to_string()));
                    self.set_phase(JobPhase::Completed);
                } else {
                    if !status.success() {
                        let _ = self.events.send(LogEvent::ErrorLine(format!(
                            "❌ Container exited with code {}",
                            status.code
                        )));
                    }
                    self.set_phase(JobPhase::Failed);
                }
                Ok(status)
            }
            Err(err) => {
                let _ = self
                    .events
                    .send(LogEvent::ErrorLine(format!("❌ Wait failed: {err}")));
                self.set_phase(if stopped {
                    JobPhase::Stopped
                } else {
                    JobPhase::Failed
                });
                Err(JobError::Runtime(err.to_string()))
            }
        };

        let _ = self.events.send(LogEvent::Done);
        self.set_phase(JobPhase::Idle);
        result
    }

    /// Start one job and drive it to its terminal state.
    pub async fn run_job(&self, config: &JobConfig) -> Result<ExitStatus, JobError> {
        self.start_job(config).await?;
        self.wait_job().await
    }

    /// Ask the engine to stop the active container.
    ///
    /// No-op (with a warning event) when no job is active. The
    /// identifier is captured and cleared *before* the stop call so a
    /// racing completion cannot double-clear or clear a newer job.
    /// Teardown failures are surfaced as events and swallowed; the
    /// handle is cleared either way so state still reaches idle.
    pub async fn stop_job(&self) {
        let Some(id) = self.handle.take() else {
            tracing::warn!("stop requested but no job is active");
            let _ = self
                .events
                .send(LogEvent::Line("No active container to stop.".to_string()));
            return;
        };

        self.stopping.store(true, Ordering::SeqCst);
        tracing::info!(container = %id, "stopping container");

        if let Err(err) = self.engine.stop(&id).await {
            tracing::error!(container = %id, error = %err, "stop failed");
            let _ = self.events.send(LogEvent::ErrorLine(format!(
                "❌ Failed to stop container {id}: {err}"
            )));
            let _ = self.stop_ready_tx.send(true);
            return;
        }

        if let Err(err) = self.engine.remove(&id).await {
            // Auto-remove usually races us here; stop already succeeded.
            tracing::debug!(container = %id, error = %err, "remove after stop failed");
        }

        let _ = self
            .events
            .send(LogEvent::Line(format!("{STOP_CONFIRMATION} ({id})")));
        let _ = self.stop_ready_tx.send(true);
    }

    /// Forced teardown for application shutdown: best-effort
    /// stop+remove of any live container, without waiting for
    /// confirmation events.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(id) = self.handle.take() {
            tracing::info!(container = %id, "shutdown with live container, forcing teardown");
            if let Err(err) = self.engine.stop(&id).await {
                tracing::warn!(container = %id, error = %err, "forced stop failed");
            }
            if let Err(err) = self.engine.remove(&id).await {
                tracing::debug!(container = %id, error = %err, "forced remove failed");
            }
        }
    }

    // ---- private helpers ----

    fn set_phase(&self, phase: JobPhase) {
        let _ = self.phase_tx.send(phase);
    }

    /// Setup failure before any container existed.
    fn fail_setup(&self, message: &str) {
        let _ = self.events.send(LogEvent::ErrorLine(message.to_string()));
        self.set_phase(JobPhase::Idle);
    }

    /// Attach/start failure after creation: unwind the container and
    /// the handle, surface the error, report `Creation`.
    async fn abort_created(&self, id: &str, err: EngineError) -> JobError {
        let _ = self.events.send(LogEvent::ErrorLine(format!(
            "❌ Failed to start container {id}: {err}"
        )));
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }
        let _ = self.engine.remove(id).await;
        self.handle.clear(id);
        self.set_phase(JobPhase::Idle);
        JobError::Creation(err)
    }
}

/// Clears the job handle when dropped, but only while it still holds
/// the guarded identifier.
struct ClearGuard<'a> {
    handle: &'a JobHandle,
    id: ContainerId,
}

impl Drop for ClearGuard<'_> {
    fn drop(&mut self) {
        self.handle.clear(&self.id);
    }
}
