//! Structured events produced from the job's output stream.
//!
//! These are the notifications the presentation layer consumes, in
//! strict arrival order, plus the terminal [`LogEvent::Done`] signal.

use serde::Serialize;

/// A structured event extracted from one reassembled output line, or
/// the job's terminal signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LogEvent {
    /// Plain log line, passed through unchanged.
    Line(String),

    /// A line carrying the error marker. Consumers treat the run as
    /// ended and ignore later progress updates.
    ErrorLine(String),

    /// Progress-bar update parsed from a tqdm-shaped line.
    Progress {
        /// Completion percentage (0-100).
        percent: u8,
        /// Elapsed time as printed by the bar (e.g. `01:24`).
        elapsed: String,
        /// Estimated time remaining (e.g. `00:36`).
        eta: String,
        /// Processing rate (e.g. `3.21it/s`).
        rate: String,
    },

    /// Remaining credit balance reported by the synthesis backend.
    Balance(u64),

    /// The job reached a terminal state; no further events follow.
    Done,
}

impl LogEvent {
    /// The display text of a text-bearing variant, if any.
    ///
    /// Progress and balance updates drive dedicated indicators rather
    /// than the scroll-back buffer, so they carry no line text.
    pub fn text(&self) -> Option<&str> {
        match self {
            LogEvent::Line(text) | LogEvent::ErrorLine(text) => Some(text),
            _ => None,
        }
    }
}
