//! Stream demultiplexer for the engine's combined output.
//!
//! A non-TTY container's attached stream interleaves stdout and
//! stderr, each payload prefixed by an 8-byte frame header: one
//! stream-type byte, three zero bytes, and a big-endian u32 payload
//! length. [`MuxDecoder`] decodes that framing incrementally, so a
//! header or payload split across transport chunks is reassembled
//! rather than corrupted.
//!
//! Within one channel, frame order is strictly preserved. Across
//! channels the relative order is whatever the engine delivered;
//! there is no sequencing token to recover a stricter interleaving.

use bytes::{Buf, Bytes, BytesMut};

/// Frame header length: type byte, three padding bytes, u32 size.
const HEADER_LEN: usize = 8;

const STREAM_STDERR: u8 = 2;

/// Logical output channel of a demultiplexed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdChannel {
    Stdout,
    Stderr,
}

/// One demultiplexed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub channel: StdChannel,
    pub data: Bytes,
}

/// Incremental decoder for the multiplexed stream framing.
///
/// Feed transport chunks in arrival order via [`decode`](Self::decode);
/// complete frames come out, partial header/payload bytes stay
/// buffered for the next chunk. Split-invariant: any chunking of the
/// same byte stream yields the same frame sequence.
#[derive(Debug, Default)]
pub struct MuxDecoder {
    buf: BytesMut,
}

impl MuxDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one transport chunk and drain all complete frames.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let payload_len =
                u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;
            if self.buf.len() < HEADER_LEN + payload_len {
                break;
            }

            let stream_type = self.buf[0];
            self.buf.advance(HEADER_LEN);
            let data = self.buf.split_to(payload_len).freeze();

            frames.push(Frame {
                channel: if stream_type == STREAM_STDERR {
                    StdChannel::Stderr
                } else {
                    StdChannel::Stdout
                },
                data,
            });
        }
        frames
    }

    /// Bytes of an incomplete trailing frame, if any. Non-empty at
    /// stream end means the transport was cut mid-frame.
    pub fn remainder(&self) -> usize {
        self.buf.len()
    }
}

/// Encode one payload in the engine's stream framing.
///
/// Counterpart of [`MuxDecoder`]; the Docker adapter uses it to
/// present its eagerly-parsed frames back as the raw wire stream.
pub fn encode_frame(channel: StdChannel, payload: &[u8]) -> Bytes {
    let stream_type: u8 = match channel {
        StdChannel::Stdout => 1,
        StdChannel::Stderr => STREAM_STDERR,
    };
    let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&[stream_type, 0, 0, 0]);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out.freeze()
}
