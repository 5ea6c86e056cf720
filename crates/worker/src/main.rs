//! Headless job worker: reads a job configuration from a JSON file,
//! runs it as a container, and mirrors the classified output stream to
//! the terminal until the job reaches a terminal state.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxrun_core::{JobConfig, LogEvent, PresentationBuffer};
use voxrun_engine::{ContainerEngine, DockerEngine};
use voxrun_runner::{spawn_presenter, JobRunner, FLUSH_INTERVAL};

/// Image run when `VOXRUN_IMAGE` is not set.
const DEFAULT_IMAGE: &str = "selector/voiceover";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxrun_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "worker failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let Some(config_path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: voxrun-worker <job-config.json>");
        return Ok(ExitCode::from(2));
    };
    let config: JobConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
    let image = std::env::var("VOXRUN_IMAGE").unwrap_or_else(|_| DEFAULT_IMAGE.to_string());

    let engine = Arc::new(DockerEngine::connect()?);
    engine.ping().await?;
    tracing::info!(image = %image, config = %config_path.display(), "engine reachable");

    let runner = Arc::new(JobRunner::new(engine, image));

    // Scroll-back model plus a live terminal mirror, both fed from the
    // same event subscription.
    let buffer = Arc::new(Mutex::new(PresentationBuffer::default()));
    let presenter = spawn_presenter(runner.subscribe(), buffer.clone(), FLUSH_INTERVAL);
    let printer = tokio::spawn(print_events(runner.subscribe()));

    // Ctrl-C requests a graceful stop of the active container.
    {
        let runner = runner.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping the active job");
                runner.stop_job().await;
            }
        });
    }

    let status = match runner.run_job(&config).await {
        Ok(status) => status,
        Err(err) => {
            // Setup failures never emit Done, so the followers must be
            // torn down rather than drained.
            presenter.abort();
            printer.abort();
            runner.shutdown().await;
            return Err(err.into());
        }
    };

    let _ = presenter.await;
    let _ = printer.await;
    runner.shutdown().await;

    let retained = buffer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .len();
    tracing::debug!(retained, exit_code = status.code, "job finished");

    Ok(if status.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Mirror classified events to stdout/stderr until `Done`.
async fn print_events(mut events: broadcast::Receiver<LogEvent>) {
    loop {
        match events.recv().await {
            Ok(LogEvent::Done) => break,
            Ok(LogEvent::Line(line)) => println!("{line}"),
            Ok(LogEvent::ErrorLine(line)) => eprintln!("{line}"),
            Ok(LogEvent::Progress {
                percent,
                elapsed,
                eta,
                rate,
            }) => println!("[{percent:>3}%] {elapsed} elapsed, {eta} remaining ({rate})"),
            Ok(LogEvent::Balance(characters)) => println!("Balance: {characters} characters"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "terminal mirror lagged behind the event stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
