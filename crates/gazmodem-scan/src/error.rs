//! Scan engine errors

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that end a scan session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Transport could not be opened or dropped mid-scan
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cancelled by the consumer
    #[error("Scan cancelled")]
    Cancelled,
}

pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    /// Whether this error means the connection is unusable
    pub fn is_connection_error(&self) -> bool {
        match self {
            ScanError::Transport(TransportError::InvalidConfig(_)) => false,
            ScanError::Transport(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_conversion() {
        let err: ScanError = TransportError::ConnectionClosed.into();
        assert!(err.is_connection_error());
        assert_eq!(err.to_string(), "Transport error: Connection closed");
        assert!(!ScanError::Cancelled.is_connection_error());

        let err: ScanError = TransportError::InvalidConfig("port must be > 0".to_string()).into();
        assert!(!err.is_connection_error());
    }
}
