//! Framed, cancellable access to the transport

use std::time::Duration;

use gazmodem_proto::framer::FramerStats;
use gazmodem_proto::{Frame, StreamFramer};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{ScanError, ScanResult};
use crate::transport::TransportAdapter;

/// Transport plus the stream framer that reassembles its bytes
///
/// Every wait selects on the session's cancellation token, so a cancel
/// interrupts a pending read instead of waiting out its timeout.
pub struct FrameLink {
    transport: Box<dyn TransportAdapter>,
    framer: StreamFramer,
    cancel: CancellationToken,
}

impl FrameLink {
    pub fn new(
        transport: Box<dyn TransportAdapter>,
        max_frame_len: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            framer: StreamFramer::with_max_frame_len(max_frame_len),
            cancel,
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) -> ScanResult<()> {
        self.check_cancelled()?;
        trace!(len = bytes.len(), "TX");
        self.transport.send(bytes).await?;
        Ok(())
    }

    /// Read one chunk and return the frames it completed
    ///
    /// Returns an empty vector when the chunk only added to a partial frame.
    /// When nothing arrived within `timeout` the stream is idle, and a stalled
    /// candidate hiding complete frames is given up.
    pub async fn read_frames(&mut self, timeout: Duration) -> ScanResult<Vec<Frame>> {
        let chunk = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ScanError::Cancelled),
            chunk = self.transport.read_chunk(timeout) => chunk?,
        };
        match chunk {
            Some(bytes) => {
                trace!(len = bytes.len(), "RX");
                Ok(self.framer.feed(&bytes))
            }
            None => Ok(self.framer.flush_stalled()),
        }
    }

    /// Take everything that arrives within `window`, then drop any partial
    /// frame left in the framer
    ///
    /// A zero window only takes what is already readable. The complete
    /// frames read are returned so their addresses can still be registered.
    pub async fn drain(&mut self, window: Duration) -> ScanResult<Vec<Frame>> {
        let deadline = Instant::now() + window;
        let mut frames = Vec::new();
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ScanError::Cancelled),
                chunk = self.transport.read_chunk(wait) => chunk?,
            };
            match chunk {
                Some(bytes) => {
                    trace!(len = bytes.len(), "RX");
                    frames.extend(self.framer.feed(&bytes));
                }
                None => break,
            }
        }

        frames.extend(self.framer.flush_stalled());
        let partial = self.framer.buffered();
        if partial > 0 {
            trace!(partial, "Dropping partial frame");
            self.framer.clear();
        }
        Ok(frames)
    }

    pub fn check_cancelled(&self) -> ScanResult<()> {
        if self.cancel.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn framer_stats(&self) -> FramerStats {
        self.framer.stats()
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}
