//! gazmodem-scan - discovery and parameter scanning for PLUM/GazModem buses
//!
//! Finds the devices on an RS485 bus behind a transparent TCP bridge, walks
//! each device's parameter index space and decodes what it returns.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ScanSession                           │
//! │  Idle → Sniffing → Scanning → Complete / Aborted / Failed   │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Sniffer    │  │  Scanner    │  │ EventSink           │  │
//! │  │ (passive)   │  │(smart skip) │  │ (broadcast events)  │  │
//! │  └──────┬──────┘  └──────┬──────┘  └─────────────────────┘  │
//! │         └───────┬────────┘                                  │
//! │          ┌──────┴───────┐   ┌────────────────┐              │
//! │          │  FrameLink   │   │ DeviceRegistry │              │
//! │          │(StreamFramer)│   │ (per device)   │              │
//! │          └──────┬───────┘   └────────────────┘              │
//! │        ┌────────┴─────────┐                                 │
//! │        │ TransportAdapter │                                 │
//! │        │   (TCP / Mock)   │                                 │
//! │        └──────────────────┘                                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gazmodem_scan::{ScanConfig, ScanSession};
//!
//! let session = ScanSession::new(ScanConfig::default())?;
//! let mut events = session.subscribe();
//! let handle = session.spawn();
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! let report = handle.wait().await?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod link;
pub mod registry;
pub mod scanner;
pub mod session;
pub mod sniffer;
pub mod transport;

pub use config::{MockConfig, ScanConfig, TcpConfig, TransportConfig};
pub use error::{ScanError, ScanResult};
pub use events::{EndReason, ErrorKind, EventSink, ScanEvent, SessionPhase};
pub use registry::{DeviceRegistry, DiscoveryPhase, RegistryEntry};
pub use session::{ScanReport, ScanSession, SessionHandle};
pub use transport::{create_transport, MockBus, MockBusHandle, TransportAdapter, TransportError};

// Re-export for convenience
pub use gazmodem_proto::{ParameterRecord, RawValue};
pub use tokio_util::sync::CancellationToken;
