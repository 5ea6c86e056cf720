//! Image provisioning.
//!
//! Ensures the job's image exists locally before any container is
//! created, pulling it once with progress relayed to the event
//! channel. A pull failure aborts the start attempt entirely.

use futures::StreamExt;
use tokio::sync::broadcast;

use voxrun_core::LogEvent;
use voxrun_engine::ContainerEngine;

use crate::error::JobError;

/// Ensure `reference` is available locally, pulling it if absent.
///
/// Each progress item becomes an observable [`LogEvent::Line`]; any
/// failure is [`JobError::Provision`] and the caller must not proceed
/// to container creation.
pub async fn ensure_image(
    engine: &dyn ContainerEngine,
    reference: &str,
    events: &broadcast::Sender<LogEvent>,
) -> Result<(), JobError> {
    if engine
        .image_exists(reference)
        .await
        .map_err(JobError::Provision)?
    {
        tracing::debug!(reference, "image present locally, skipping pull");
        let _ = events.send(LogEvent::Line(format!(
            "Image \"{reference}\" found locally, skipping pull."
        )));
        return Ok(());
    }

    tracing::info!(reference, "image not found locally, pulling");
    let _ = events.send(LogEvent::Line(format!(
        "Image \"{reference}\" not found locally, it will be pulled once..."
    )));

    let mut pull = engine.pull_image(reference);
    while let Some(item) = pull.next().await {
        let progress = item.map_err(JobError::Provision)?;
        tracing::debug!(
            reference,
            status = %progress.status,
            percent = progress.percent,
            "pull progress",
        );
        let line = match progress.percent {
            Some(percent) => format!("Pulling {reference}: {} ({percent}%)", progress.status),
            None => format!("Pulling {reference}: {}", progress.status),
        };
        let _ = events.send(LogEvent::Line(line));
    }

    let _ = events.send(LogEvent::Line(format!(
        "Image \"{reference}\" pulled successfully."
    )));
    Ok(())
}
