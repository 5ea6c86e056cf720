//! Attached-output pump.
//!
//! Drives the container's combined byte stream to completion: chunks
//! are demultiplexed into stdout/stderr frames, each channel is
//! reassembled into lines, and every line is classified into
//! [`LogEvent`]s on the broadcast channel. Per-channel line order is
//! strict; the two channels interleave in engine arrival order (an
//! accepted nondeterminism — the engine provides no cross-channel
//! sequencing token).

use futures::StreamExt;
use tokio::sync::{broadcast, watch};

use voxrun_core::classify::classify_line;
use voxrun_core::LogEvent;
use voxrun_engine::{AttachStream, LineAssembler, MuxDecoder, StdChannel};

/// Pump the attached stream until it ends, then flush any pending
/// partial lines.
///
/// Returns `true` when an error line was observed (the run is
/// considered failed even on a zero exit). The terminal
/// [`LogEvent::Done`] is the caller's to emit, after this returns.
pub async fn pump_output(
    mut stream: AttachStream,
    events: broadcast::Sender<LogEvent>,
    stop_ready: watch::Sender<bool>,
) -> bool {
    let mut decoder = MuxDecoder::new();
    let mut stdout = LineAssembler::new();
    let mut stderr = LineAssembler::new();
    let mut run_failed = false;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for frame in decoder.decode(&bytes) {
                    let assembler = match frame.channel {
                        StdChannel::Stdout => &mut stdout,
                        StdChannel::Stderr => &mut stderr,
                    };
                    for line in assembler.push(&frame.data) {
                        dispatch_line(&line, &events, &stop_ready, &mut run_failed);
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "attach stream error");
                let _ = events.send(LogEvent::ErrorLine(format!("❌ Output stream error: {err}")));
                run_failed = true;
                break;
            }
        }
    }

    // Stream end: whatever is still buffered is the job's last output.
    for line in stdout.finish().into_iter().chain(stderr.finish()) {
        dispatch_line(&line, &events, &stop_ready, &mut run_failed);
    }

    run_failed
}

/// Classify one line and deliver its events.
///
/// After the first error line the run counts as ended: later progress
/// updates are suppressed so a stale bar cannot overwrite the error
/// state.
fn dispatch_line(
    line: &str,
    events: &broadcast::Sender<LogEvent>,
    stop_ready: &watch::Sender<bool>,
    run_failed: &mut bool,
) {
    let classified = classify_line(line);
    if classified.stop_ready {
        let _ = stop_ready.send(true);
    }
    for event in classified.events {
        match event {
            LogEvent::ErrorLine(_) => *run_failed = true,
            LogEvent::Progress { .. } if *run_failed => continue,
            _ => {}
        }
        let _ = events.send(event);
    }
}
