//! Coalescing presentation consumer.
//!
//! Log events can arrive far faster than a display can usefully
//! repaint. The presenter batches whatever accumulated since the last
//! tick into one [`PresentationBuffer::flush`] — one buffer write per
//! frame, not per event — while preserving arrival order across the
//! coalescing boundary.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use voxrun_core::{LogEvent, PresentationBuffer};

/// Default flush cadence, roughly one display frame.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(33);

/// Spawn the consumer loop.
///
/// Runs until [`LogEvent::Done`] arrives or the event channel closes,
/// flushing any pending batch one final time before exiting.
pub fn spawn_presenter(
    mut events: broadcast::Receiver<LogEvent>,
    buffer: Arc<Mutex<PresentationBuffer>>,
    flush_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending: Vec<String> = Vec::new();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(LogEvent::Done) => break,
                    Ok(event) => {
                        if let Some(text) = event.text() {
                            pending.push(text.to_string());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "presentation consumer lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ticker.tick() => flush(&buffer, &mut pending),
            }
        }
        flush(&buffer, &mut pending);
    })
}

fn flush(buffer: &Mutex<PresentationBuffer>, pending: &mut Vec<String>) {
    if pending.is_empty() {
        return;
    }
    buffer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .flush(pending.drain(..));
}
