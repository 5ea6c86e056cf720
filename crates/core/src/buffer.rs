//! Bounded, order-preserving presentation buffer.
//!
//! The buffer is the scroll-back model read by the presentation
//! layer. It is only ever mutated through [`PresentationBuffer::flush`],
//! which appends a whole coalesced batch and then trims the oldest
//! entries down to the configured capacity.

use std::collections::VecDeque;

/// Default maximum number of retained display lines.
pub const DEFAULT_MAX_LINES: usize = 2000;

/// FIFO-bounded sequence of display lines.
#[derive(Debug)]
pub struct PresentationBuffer {
    lines: VecDeque<String>,
    max_lines: usize,
}

impl Default for PresentationBuffer {
    fn default() -> Self {
        Self::with_max_lines(DEFAULT_MAX_LINES)
    }
}

impl PresentationBuffer {
    /// Buffer retaining at most `max_lines` entries, oldest dropped
    /// first.
    pub fn with_max_lines(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines,
        }
    }

    /// Append one coalesced batch, preserving arrival order, then trim
    /// from the front to the configured capacity.
    pub fn flush<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.lines.extend(batch);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Retained lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
