//! Integration tests for the job lifecycle manager, driven against a
//! scripted in-memory engine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::mpsc;

use voxrun_core::{JobConfig, LogEvent, PresentationBuffer};
use voxrun_engine::{
    encode_frame, AttachStream, ContainerEngine, ContainerId, EngineError, ExitStatus,
    PullProgress, PullStream, StdChannel,
};
use voxrun_runner::{spawn_presenter, JobError, JobPhase, JobRunner};

// ---------------------------------------------------------------------------
// Scripted fake engine
// ---------------------------------------------------------------------------

/// Calls the fake engine records, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EngineCall {
    ImageExists,
    Pull,
    Create,
    Attach,
    Start,
    Wait,
    Stop,
    Remove,
}

struct FakeEngine {
    calls: Mutex<Vec<EngineCall>>,
    image_present: bool,
    /// Pull items served before the pull stream ends.
    pull_items: Mutex<VecDeque<Result<PullProgress, EngineError>>>,
    fail_create: bool,
    /// Raw multiplexed chunks served on attach.
    output_chunks: Mutex<VecDeque<Bytes>>,
    exit_code: i64,
    fail_stop: bool,
    /// Completes the wait call; `stop` also completes it, mimicking
    /// the engine ending the process.
    wait_tx: mpsc::Sender<()>,
    wait_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl FakeEngine {
    fn builder() -> FakeEngineBuilder {
        FakeEngineBuilder::default()
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Let a pending `wait` return.
    fn finish_container(&self) {
        let _ = self.wait_tx.try_send(());
    }
}

#[derive(Default)]
struct FakeEngineBuilder {
    image_present: Option<bool>,
    pull_items: Vec<Result<PullProgress, EngineError>>,
    fail_create: bool,
    output: Vec<(StdChannel, &'static [u8])>,
    exit_code: i64,
    fail_stop: bool,
    finish_immediately: bool,
}

impl FakeEngineBuilder {
    fn image_present(mut self, present: bool) -> Self {
        self.image_present = Some(present);
        self
    }

    fn pull_item(mut self, item: Result<PullProgress, EngineError>) -> Self {
        self.pull_items.push(item);
        self
    }

    fn fail_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    fn output(mut self, channel: StdChannel, bytes: &'static [u8]) -> Self {
        self.output.push((channel, bytes));
        self
    }

    fn exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    fn fail_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// The container exits on its own as soon as it is waited on.
    fn finish_immediately(mut self) -> Self {
        self.finish_immediately = true;
        self
    }

    fn build(self) -> Arc<FakeEngine> {
        let (wait_tx, wait_rx) = mpsc::channel(1);
        let engine = Arc::new(FakeEngine {
            calls: Mutex::new(Vec::new()),
            image_present: self.image_present.unwrap_or(true),
            pull_items: Mutex::new(self.pull_items.into_iter().collect()),
            fail_create: self.fail_create,
            output_chunks: Mutex::new(
                self.output
                    .into_iter()
                    .map(|(ch, bytes)| encode_frame(ch, bytes))
                    .collect(),
            ),
            exit_code: self.exit_code,
            fail_stop: self.fail_stop,
            wait_tx,
            wait_rx: Mutex::new(Some(wait_rx)),
        });
        if self.finish_immediately {
            engine.finish_container();
        }
        engine
    }
}

#[async_trait::async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn image_exists(&self, _reference: &str) -> Result<bool, EngineError> {
        self.record(EngineCall::ImageExists);
        Ok(self.image_present)
    }

    fn pull_image(&self, _reference: &str) -> PullStream {
        self.record(EngineCall::Pull);
        let items: Vec<_> = self.pull_items.lock().unwrap().drain(..).collect();
        Box::pin(futures::stream::iter(items))
    }

    async fn create_container(
        &self,
        _spec: &voxrun_core::InvocationSpec,
    ) -> Result<ContainerId, EngineError> {
        self.record(EngineCall::Create);
        if self.fail_create {
            return Err(EngineError::Api("creation rejected".to_string()));
        }
        Ok("container-1".to_string())
    }

    async fn attach(&self, _id: &str) -> Result<AttachStream, EngineError> {
        self.record(EngineCall::Attach);
        let chunks: Vec<Result<Bytes, EngineError>> = self
            .output_chunks
            .lock()
            .unwrap()
            .drain(..)
            .map(Ok)
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn start(&self, _id: &str) -> Result<(), EngineError> {
        self.record(EngineCall::Start);
        Ok(())
    }

    async fn wait(&self, _id: &str) -> Result<ExitStatus, EngineError> {
        self.record(EngineCall::Wait);
        let mut rx = self
            .wait_rx
            .lock()
            .unwrap()
            .take()
            .expect("wait called twice");
        let _ = rx.recv().await;
        Ok(ExitStatus {
            code: self.exit_code,
        })
    }

    async fn stop(&self, _id: &str) -> Result<(), EngineError> {
        self.record(EngineCall::Stop);
        if self.fail_stop {
            return Err(EngineError::Api("stop rejected".to_string()));
        }
        // The engine ends the process; the pending wait observes it.
        self.finish_container();
        Ok(())
    }

    async fn remove(&self, _id: &str) -> Result<(), EngineError> {
        self.record(EngineCall::Remove);
        Ok(())
    }
}

fn synthesize_config() -> JobConfig {
    JobConfig {
        mode: Some("synthesize".to_string()),
        batch_size: Some(8),
        ext: Some("wav".to_string()),
        ..Default::default()
    }
}

/// Drain every event currently in the subscription.
fn drain(rx: &mut broadcast::Receiver<LogEvent>) -> Vec<LogEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Single-job invariant
// ---------------------------------------------------------------------------

/// A second start while a job is active is rejected with a conflict
/// and the first job's identifier is untouched.
#[tokio::test]
async fn second_start_conflicts_and_keeps_first_job() {
    let engine = FakeEngine::builder().build();
    let runner = JobRunner::new(engine, "selector/voiceover");

    runner.start_job(&synthesize_config()).await.unwrap();
    assert_eq!(runner.handle().active().as_deref(), Some("container-1"));

    let err = runner.start_job(&synthesize_config()).await.unwrap_err();
    assert_matches!(err, JobError::Conflict(id) if id == "container-1");
    assert_eq!(runner.handle().active().as_deref(), Some("container-1"));
}

/// After the first job reaches a terminal state a new start succeeds.
#[tokio::test]
async fn start_is_allowed_again_after_completion() {
    let engine = FakeEngine::builder().finish_immediately().build();
    let runner = JobRunner::new(engine.clone(), "selector/voiceover");

    runner.start_job(&synthesize_config()).await.unwrap();
    runner.wait_job().await.unwrap();
    assert!(!runner.handle().is_active());

    // The fake serves one wait per instance; a fresh engine stands in
    // for the next container.
    let runner = JobRunner::new(FakeEngine::builder().build(), "selector/voiceover");
    runner.start_job(&synthesize_config()).await.unwrap();
    assert!(runner.handle().is_active());
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

/// A pull failure aborts before any container is created and leaves
/// the handle empty.
#[tokio::test]
async fn pull_failure_never_reaches_creation() {
    let engine = FakeEngine::builder()
        .image_present(false)
        .pull_item(Ok(PullProgress {
            status: "Downloading".to_string(),
            percent: Some(40),
        }))
        .pull_item(Err(EngineError::Stream("registry unreachable".to_string())))
        .build();
    let runner = JobRunner::new(engine.clone(), "selector/voiceover");
    let mut events = runner.subscribe();

    let err = runner.start_job(&synthesize_config()).await.unwrap_err();
    assert_matches!(err, JobError::Provision(_));
    assert!(!runner.handle().is_active());
    assert!(!engine.calls().contains(&EngineCall::Create));

    let failure_reported = drain(&mut events)
        .iter()
        .any(|e| matches!(e, LogEvent::ErrorLine(_)));
    assert!(failure_reported, "pull failure must be observable");
}

/// A locally present image skips the pull entirely.
#[tokio::test]
async fn present_image_skips_pull() {
    let engine = FakeEngine::builder().image_present(true).build();
    let runner = JobRunner::new(engine.clone(), "selector/voiceover");

    runner.start_job(&synthesize_config()).await.unwrap();
    assert!(!engine.calls().contains(&EngineCall::Pull));
}

/// Creation rejection unwinds with an empty handle.
#[tokio::test]
async fn create_failure_leaves_handle_empty() {
    let engine = FakeEngine::builder().fail_create().build();
    let runner = JobRunner::new(engine, "selector/voiceover");

    let err = runner.start_job(&synthesize_config()).await.unwrap_err();
    assert_matches!(err, JobError::Creation(_));
    assert!(!runner.handle().is_active());
    assert_eq!(*runner.phase().borrow(), JobPhase::Idle);
}

// ---------------------------------------------------------------------------
// Output pipeline
// ---------------------------------------------------------------------------

/// A full happy-path run delivers classified events in order and ends
/// with Done after the flushed partial line.
#[tokio::test]
async fn run_delivers_classified_events_then_done() {
    let engine = FakeEngine::builder()
        .output(StdChannel::Stdout, "Доступно 1200 символов\n".as_bytes())
        .output(
            StdChannel::Stderr,
            " 45%|████▌     | 45/100 [00:12<00:15,  3.21it/s]\n".as_bytes(),
        )
        .output(StdChannel::Stdout, b"partial tail")
        .finish_immediately()
        .build();
    let runner = JobRunner::new(engine, "selector/voiceover");
    let mut events = runner.subscribe();

    let status = runner.run_job(&synthesize_config()).await.unwrap();
    assert!(status.success());
    assert!(!runner.handle().is_active());

    let events = drain(&mut events);
    assert!(events.contains(&LogEvent::Balance(1200)));
    assert!(events.iter().any(|e| matches!(
        e,
        LogEvent::Progress { percent: 45, .. }
    )));
    // The unterminated tail is flushed as a line, before Done.
    let tail_pos = events
        .iter()
        .position(|e| *e == LogEvent::Line("partial tail".to_string()))
        .expect("flushed partial line");
    let done_pos = events
        .iter()
        .position(|e| *e == LogEvent::Done)
        .expect("terminal Done");
    assert!(tail_pos < done_pos);
    assert_eq!(done_pos, events.len() - 1);
}

/// An error line marks the run failed and suppresses later progress
/// updates.
#[tokio::test]
async fn error_line_suppresses_following_progress() {
    let engine = FakeEngine::builder()
        .output(StdChannel::Stdout, " 10%|█| 1/10 [00:01<00:09,  1.0it/s]\n".as_bytes())
        .output(StdChannel::Stderr, "❌ Синтез прерван\n".as_bytes())
        .output(StdChannel::Stdout, " 20%|██| 2/10 [00:02<00:08,  1.0it/s]\n".as_bytes())
        .finish_immediately()
        .build();
    let runner = JobRunner::new(engine, "selector/voiceover");
    let mut events = runner.subscribe();

    runner.run_job(&synthesize_config()).await.unwrap();

    let events = drain(&mut events);
    let progress_updates: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, LogEvent::Progress { .. }))
        .collect();
    assert_eq!(progress_updates.len(), 1, "only the pre-error update");
    assert!(events.iter().any(|e| matches!(e, LogEvent::ErrorLine(_))));
}

/// Nonzero exit surfaces as an error event and a Failed→Idle phase.
#[tokio::test]
async fn nonzero_exit_reports_failure() {
    let engine = FakeEngine::builder().exit_code(3).finish_immediately().build();
    let runner = JobRunner::new(engine, "selector/voiceover");
    let mut events = runner.subscribe();

    let status = runner.run_job(&synthesize_config()).await.unwrap();
    assert_eq!(status.code, 3);
    assert!(!runner.handle().is_active());

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, LogEvent::ErrorLine(line) if line.contains("code 3"))));
}

// ---------------------------------------------------------------------------
// Stop semantics
// ---------------------------------------------------------------------------

/// Stop with no active job warns and does nothing.
#[tokio::test]
async fn stop_without_job_is_a_warning_noop() {
    let engine = FakeEngine::builder().build();
    let runner = JobRunner::new(engine.clone(), "selector/voiceover");
    let mut events = runner.subscribe();

    runner.stop_job().await;
    assert!(engine.calls().is_empty());
    assert_eq!(
        drain(&mut events),
        vec![LogEvent::Line("No active container to stop.".to_string())]
    );
}

/// Stop racing a pending wait: exactly one stop confirmation, no
/// error lines, and the handle ends empty whichever side wins.
#[tokio::test]
async fn stop_during_wait_confirms_once_and_clears_handle() {
    let engine = FakeEngine::builder().exit_code(137).build();
    let runner = Arc::new(JobRunner::new(engine, "selector/voiceover"));
    let mut events = runner.subscribe();
    let stop_ready = runner.stop_ready();

    assert!(!*stop_ready.borrow());
    runner.start_job(&synthesize_config()).await.unwrap();
    // The stop control is armed once the container is running.
    assert!(*stop_ready.borrow());

    let waiter = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.wait_job().await })
    };
    // Let the wait call land before stopping.
    tokio::time::sleep(Duration::from_millis(20)).await;

    runner.stop_job().await;
    let status = waiter.await.unwrap().unwrap();
    assert_eq!(status.code, 137);
    assert!(!runner.handle().is_active());

    let events = drain(&mut events);
    let confirmations = events
        .iter()
        .filter(|e| matches!(e, LogEvent::Line(line) if line.contains("Container stopped")))
        .count();
    assert_eq!(confirmations, 1);
    // The stop-induced nonzero exit is not an error.
    assert!(events.iter().all(|e| !matches!(e, LogEvent::ErrorLine(_))));
    assert_eq!(events.last(), Some(&LogEvent::Done));
}

/// A failed stop is surfaced as an event, swallowed, and the handle
/// stays cleared so state still reaches idle.
#[tokio::test]
async fn failed_stop_is_swallowed_and_clears_handle() {
    let engine = FakeEngine::builder().fail_stop().build();
    let runner = JobRunner::new(engine.clone(), "selector/voiceover");
    let mut events = runner.subscribe();

    runner.start_job(&synthesize_config()).await.unwrap();
    runner.stop_job().await;
    assert!(!runner.handle().is_active());

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(e, LogEvent::ErrorLine(_))));
    // No confirmation without a successful stop.
    assert!(events
        .iter()
        .all(|e| !matches!(e, LogEvent::Line(line) if line.contains("Container stopped"))));
}

/// Shutdown with a live container issues best-effort stop and remove.
#[tokio::test]
async fn shutdown_forces_teardown() {
    let engine = FakeEngine::builder().build();
    let runner = JobRunner::new(engine.clone(), "selector/voiceover");

    runner.start_job(&synthesize_config()).await.unwrap();
    runner.shutdown().await;

    assert!(!runner.handle().is_active());
    let calls = engine.calls();
    assert!(calls.contains(&EngineCall::Stop));
    assert!(calls.contains(&EngineCall::Remove));
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// The presenter coalesces a burst into ordered buffer lines and
/// trims to capacity.
#[tokio::test]
async fn presenter_coalesces_in_order_and_trims() {
    let (tx, rx) = broadcast::channel(256);
    let buffer = Arc::new(Mutex::new(PresentationBuffer::with_max_lines(5)));
    let presenter = spawn_presenter(rx, buffer.clone(), Duration::from_millis(5));

    for i in 0..8 {
        tx.send(LogEvent::Line(format!("line {i}"))).unwrap();
    }
    // Non-text events must not occupy buffer slots.
    tx.send(LogEvent::Balance(100)).unwrap();
    tx.send(LogEvent::Progress {
        percent: 50,
        elapsed: "00:01".to_string(),
        eta: "00:01".to_string(),
        rate: "1.0it/s".to_string(),
    })
    .unwrap();
    tx.send(LogEvent::Done).unwrap();

    presenter.await.unwrap();

    let buffer = buffer.lock().unwrap();
    let lines: Vec<&str> = buffer.lines().collect();
    assert_eq!(lines, ["line 3", "line 4", "line 5", "line 6", "line 7"]);
}
