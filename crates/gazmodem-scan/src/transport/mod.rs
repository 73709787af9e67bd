//! Transport layer for bus access
//!
//! - TCP adapter for transparent RS485-to-TCP bridges
//! - Mock adapter simulating devices in memory, for testing
//!
//! # Example
//!
//! ```ignore
//! use gazmodem_scan::transport::{create_transport, TransportAdapter};
//! use gazmodem_scan::config::TransportConfig;
//!
//! let mut transport = create_transport(&TransportConfig::default()).await?;
//! transport.send(&gazmodem_proto::read_request(1, 0, 0)).await?;
//! let chunk = transport.read_chunk(Duration::from_secs(1)).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;
pub mod tcp;

pub use adapter::TransportAdapter;
pub use error::TransportError;
pub use mock::{MockBus, MockBusHandle};
pub use tcp::TcpTransport;

use crate::config::TransportConfig;

/// Create a transport adapter based on configuration
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Box<dyn TransportAdapter>, TransportError> {
    match config {
        TransportConfig::Tcp(cfg) => {
            let adapter = TcpTransport::connect(cfg).await?;
            Ok(Box::new(adapter))
        }
        TransportConfig::Mock(cfg) => {
            let adapter = MockBus::new(cfg);
            Ok(Box::new(adapter))
        }
    }
}
