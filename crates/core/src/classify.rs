//! Log-line classifier.
//!
//! Turns one reassembled line into structured [`LogEvent`]s by
//! applying an ordered rule table: error marker, then balance, then
//! progress bar, then plain passthrough. Precedence is load-bearing —
//! the backend's balance line ("Доступно 1200 символов") can contain a
//! percent-like substring, so the progress rule explicitly excludes
//! balance matches.

use std::sync::OnceLock;

use regex::Regex;

use crate::events::LogEvent;

/// Marker glyph prefixing error lines in the job's output.
pub const ERROR_MARKER: char = '❌';

/// Phrase in a stop-confirmation line. Seeing it re-enables the stop
/// control; it does not change job state.
pub const STOP_CONFIRMATION: &str = "Container stopped";

/// Result of classifying one line.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    /// Events to deliver, in order. A balance line yields both its
    /// update and the plain line; a progress line yields the update
    /// only.
    pub events: Vec<LogEvent>,
    /// The line contains [`STOP_CONFIRMATION`].
    pub stop_ready: bool,
}

fn balance_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Доступно\s+(\d+)\s+символ").unwrap())
}

fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // tqdm: " 45%|████▌     | 45/100 [00:12<00:15,  3.21it/s]"
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,3})%\|.*\[([0-9:]+)<([0-9:]+),\s*([^\]]+)\]").unwrap()
    })
}

/// Classify one line into ordered events.
///
/// The rules run in precedence order; see the module docs for why
/// balance beats progress.
pub fn classify_line(line: &str) -> Classified {
    let mut events = Vec::with_capacity(1);

    if rule_error(line) {
        events.push(LogEvent::ErrorLine(line.to_string()));
    } else {
        let balance = rule_balance(line);
        if let Some(event) = balance.clone() {
            events.push(event);
        }
        match rule_progress(line) {
            // The balance exclusion: a percent inside a balance line is
            // unrelated text, not bar state.
            Some(progress) if balance.is_none() => events.push(progress),
            _ => events.push(LogEvent::Line(line.to_string())),
        }
    }

    Classified {
        events,
        stop_ready: line.contains(STOP_CONFIRMATION),
    }
}

/// Rule 1: lines starting with the error marker.
fn rule_error(line: &str) -> bool {
    line.trim_start().starts_with(ERROR_MARKER)
}

/// Rule 2: credit-balance report from the synthesis backend.
fn rule_balance(line: &str) -> Option<LogEvent> {
    let captures = balance_re().captures(line)?;
    let count = captures[1].parse().ok()?;
    Some(LogEvent::Balance(count))
}

/// Rule 3: tqdm-shaped progress bar update.
fn rule_progress(line: &str) -> Option<LogEvent> {
    let captures = progress_re().captures(line)?;
    let percent: u8 = captures[1].parse().ok().filter(|p| *p <= 100)?;
    Some(LogEvent::Progress {
        percent,
        elapsed: captures[2].to_string(),
        eta: captures[3].to_string(),
        rate: captures[4].trim().to_string(),
    })
}
