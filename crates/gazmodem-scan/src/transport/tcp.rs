//! TCP transport for transparent RS485 bridges

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{TransportAdapter, TransportError};
use crate::config::TcpConfig;

const READ_BUFFER_SIZE: usize = 1024;

/// Connection to an RS485-to-TCP bridge
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: String,
    buf: Box<[u8]>,
}

impl TcpTransport {
    /// Connect with the configured timeout
    pub async fn connect(config: &TcpConfig) -> Result<Self, TransportError> {
        if config.host.trim().is_empty() {
            return Err(TransportError::InvalidConfig("host is empty".to_string()));
        }
        if config.port == 0 {
            return Err(TransportError::InvalidConfig("port must be > 0".to_string()));
        }
        let peer = format!("{}:{}", config.host, config.port);
        let timeout = Duration::from_millis(config.connect_timeout_ms);

        debug!(%peer, ?timeout, "Connecting to bridge");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&peer))
            .await
            .map_err(|_| TransportError::Timeout(format!("connecting to {}", peer)))?
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", peer, e)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", peer, e)))?;

        info!(%peer, "Connected to bridge");
        Ok(Self::from_stream(stream, peer))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, peer: String) -> Self {
        Self {
            stream: Some(stream),
            peer,
            buf: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl TransportAdapter for TcpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream()?;
        stream
            .write_all(bytes)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn read_chunk(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        let result = tokio::time::timeout(timeout, stream.read(&mut self.buf)).await;
        match result {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(TransportError::ConnectionClosed),
            Ok(Ok(n)) => Ok(Some(self.buf[..n].to_vec())),
            Ok(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!(peer = %self.peer, "Connection closed");
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}
