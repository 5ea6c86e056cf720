//! Newline reassembly across arbitrary chunk boundaries.
//!
//! The transport chunks the demultiplexed payloads with no regard for
//! record boundaries (or even UTF-8 code points), so each channel
//! keeps one [`LineAssembler`]: bytes accumulate until a terminator,
//! complete lines come out with the terminator stripped, and the
//! trailing partial segment waits for the next chunk. At stream end,
//! [`finish`](LineAssembler::finish) flushes whatever is pending so no
//! data is ever dropped.

/// Per-channel line reassembler.
///
/// Accepts `\n` and `\r\n` terminators; a trailing `\r` before the
/// terminator is stripped from the emitted line.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk and drain every completed line, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop(); // the \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush a non-empty pending segment as the final line.
    ///
    /// Call exactly once, when the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}
