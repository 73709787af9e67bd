//! Transport adapter trait

use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;

/// Byte-stream access to the RS485 bus
///
/// The bus is half-duplex and shared, so a transport carries raw bytes in
/// both directions and leaves framing to the caller. Reads return whatever
/// arrived, with no alignment to frame boundaries.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Write raw bytes to the bus
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read the next chunk of bytes
    ///
    /// # Returns
    /// `Ok(None)` if nothing arrived within `timeout`. A closed connection
    /// is an error, never an empty chunk.
    async fn read_chunk(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Release the connection. Further calls fail with `ConnectionClosed`.
    async fn close(&mut self);

    /// Peer description for logs
    fn describe(&self) -> String;
}
