//! Stream framer
//!
//! Turns an unaligned, chunked byte stream (TCP reads from the RS485 bridge)
//! into validated frames. Bytes are retained across calls, so a frame split
//! over any number of reads is reassembled. Noise is skipped one byte at a
//! time, so a corrupted candidate never swallows a valid frame behind it.
//! A candidate still short of its declared length is only given up once the
//! stream goes idle, see [`StreamFramer::flush_stalled`].
//!
//! ```text
//! SEEK_START ──0x68──▶ READ_LENGTH ──sane LEN──▶ ACCUMULATE_BODY ──LEN bytes──▶ EMIT_OR_RESYNC
//!     ▲                    │ absurd LEN                                             │
//!     └────────────────────┴──────────── drop START byte ◀──── invalid ─────────────┤
//!     ▲                                                                             │
//!     └───────────────────────────── consume frame ◀──── valid ─────────────────────┘
//! ```

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::error::FrameError;
use crate::frame::{decode_frame, Frame, MIN_FRAME_LEN, START};

/// Default upper bound on a plausible frame length
pub const DEFAULT_MAX_FRAME_LEN: usize = 512;

/// Framer state between calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Looking for a START byte
    SeekStart,
    /// START found, waiting for the LEN field
    ReadLength,
    /// Waiting for `len` bytes to be buffered
    AccumulateBody { len: usize },
    /// A full candidate is buffered
    EmitOrResync { len: usize },
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Frames emitted
    pub frames: u64,
    /// Times a candidate START byte was rejected
    pub resyncs: u64,
    /// Bytes dropped as noise
    pub discarded_bytes: u64,
    /// Candidates rejected for a bad checksum
    pub crc_failures: u64,
}

/// Incremental frame extractor
#[derive(Debug)]
pub struct StreamFramer {
    buffer: BytesMut,
    state: FramerState,
    max_frame_len: usize,
    stats: FramerStats,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a framer that treats any LEN above `max_frame_len` as noise
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_frame_len * 2),
            state: FramerState::SeekStart,
            max_frame_len: max_frame_len.max(MIN_FRAME_LEN),
            stats: FramerStats::default(),
        }
    }

    /// Append bytes from the transport
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Append bytes and return every frame that became complete
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.push(chunk);
        self.drain()
    }

    /// Extract all complete frames currently buffered
    pub fn drain(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Extract the next complete frame, if any. Never blocks.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                FramerState::SeekStart => match self.buffer.iter().position(|&b| b == START) {
                    Some(pos) => {
                        self.discard(pos);
                        self.state = FramerState::ReadLength;
                    }
                    None => {
                        let all = self.buffer.len();
                        self.discard(all);
                        return None;
                    }
                },
                FramerState::ReadLength => {
                    if self.buffer.len() < 3 {
                        return None;
                    }
                    let len = u16::from_le_bytes([self.buffer[1], self.buffer[2]]) as usize;
                    if self.plausible_len(len) {
                        self.state = FramerState::AccumulateBody { len };
                    } else {
                        trace!(len, "Implausible frame length, resyncing");
                        self.resync();
                    }
                }
                FramerState::AccumulateBody { len } => {
                    if self.buffer.len() >= len {
                        self.state = FramerState::EmitOrResync { len };
                    } else {
                        return None;
                    }
                }
                FramerState::EmitOrResync { len } => match decode_frame(&self.buffer[..len]) {
                    Ok(frame) => {
                        self.buffer.advance(len);
                        self.stats.frames += 1;
                        self.state = FramerState::SeekStart;
                        return Some(frame);
                    }
                    Err(e) => {
                        if matches!(e, FrameError::CrcMismatch { .. }) {
                            self.stats.crc_failures += 1;
                        }
                        trace!(error = %e, "Candidate frame rejected, resyncing");
                        self.resync();
                    }
                },
            }
        }
    }

    /// Give up on a candidate still waiting for its declared length when a
    /// complete valid frame is already buffered behind it
    ///
    /// Call once the stream went idle. Until then the candidate may be a long
    /// frame whose payload happens to contain a valid frame.
    pub fn flush_stalled(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let FramerState::AccumulateBody { len } = self.state {
            let Some(offset) = self.embedded_frame_offset() else {
                break;
            };
            trace!(len, offset, "Stalled candidate hides a complete frame, resyncing");
            self.stats.resyncs += 1;
            self.discard(offset);
            self.state = FramerState::SeekStart;
            frames.extend(self.drain());
        }
        frames
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Number of bytes held for a frame not yet complete
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        let all = self.buffer.len();
        self.discard(all);
        self.state = FramerState::SeekStart;
    }

    fn plausible_len(&self, len: usize) -> bool {
        (MIN_FRAME_LEN..=self.max_frame_len).contains(&len)
    }

    /// Drop only the START byte and look again
    fn resync(&mut self) {
        self.stats.resyncs += 1;
        self.discard(1);
        self.state = FramerState::SeekStart;
    }

    fn discard(&mut self, n: usize) {
        if n > 0 {
            self.buffer.advance(n);
            self.stats.discarded_bytes += n as u64;
        }
    }

    /// Offset of the first START after position 0 that begins a complete,
    /// valid frame entirely inside the buffer
    fn embedded_frame_offset(&self) -> Option<usize> {
        let buf = &self.buffer[..];
        (1..buf.len()).find(|&pos| {
            if buf[pos] != START || pos + 3 > buf.len() {
                return false;
            }
            let len = u16::from_le_bytes([buf[pos + 1], buf[pos + 2]]) as usize;
            self.plausible_len(len)
                && pos + len <= buf.len()
                && decode_frame(&buf[pos..pos + len]).is_ok()
        })
    }
}
