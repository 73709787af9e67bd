//! Scan session configuration
//!
//! Every field has a serde default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! sniff_duration_ms = 10000
//! max_index = 600
//!
//! [transport]
//! type = "tcp"
//! host = "192.168.1.38"
//! port = 8899
//! ```

use std::time::Duration;

use gazmodem_proto::frame::MIN_FRAME_LEN;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Configuration for one scan session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Address written into the SRC field of outbound requests
    #[serde(default)]
    pub source_address: u16,
    /// Passive discovery window, 0 skips the phase
    #[serde(default = "default_sniff_duration")]
    pub sniff_duration_ms: u64,
    /// Upper bound on a single transport read
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// How long to wait for the answer to one `READ_REQ`
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Pause between consecutive requests; bytes arriving in it are discarded
    #[serde(default = "default_request_gap")]
    pub request_gap_ms: u64,
    /// Extra wait for a late answer after a timeout, 0 disables
    ///
    /// Only granted while the device answered the previous request.
    #[serde(default = "default_late_response")]
    pub late_response_ms: u64,
    /// Indices `0..max_index` are requested from every device
    #[serde(default = "default_max_index")]
    pub max_index: u16,
    /// Consecutive empty answers after which a device is abandoned
    #[serde(default = "default_empty_skip_threshold")]
    pub empty_skip_threshold: u32,
    /// Probed when sniffing finds nothing
    #[serde(default = "default_fallback_addresses")]
    pub fallback_addresses: Vec<u16>,
    /// Registered before sniffing starts
    #[serde(default)]
    pub addresses: Vec<u16>,
    /// Emit `ScanProgress` every this many indices
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u16,
    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// LEN values above this are treated as noise
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_sniff_duration() -> u64 {
    30_000
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    1000
}

fn default_request_gap() -> u64 {
    10
}

fn default_late_response() -> u64 {
    300
}

fn default_max_index() -> u16 {
    1000
}

fn default_empty_skip_threshold() -> u32 {
    100
}

fn default_fallback_addresses() -> Vec<u16> {
    vec![1, 100]
}

fn default_progress_interval() -> u16 {
    10
}

fn default_event_capacity() -> usize {
    4096
}

fn default_max_frame_len() -> usize {
    gazmodem_proto::framer::DEFAULT_MAX_FRAME_LEN
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            source_address: 0,
            sniff_duration_ms: default_sniff_duration(),
            read_timeout_ms: default_read_timeout(),
            request_timeout_ms: default_request_timeout(),
            request_gap_ms: default_request_gap(),
            late_response_ms: default_late_response(),
            max_index: default_max_index(),
            empty_skip_threshold: default_empty_skip_threshold(),
            fallback_addresses: default_fallback_addresses(),
            addresses: Vec::new(),
            progress_interval: default_progress_interval(),
            event_capacity: default_event_capacity(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl ScanConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ScanError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ScanError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.read_timeout_ms == 0 {
            return Err(ScanError::Config("read_timeout_ms must be > 0".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ScanError::Config(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.empty_skip_threshold == 0 {
            return Err(ScanError::Config(
                "empty_skip_threshold must be > 0".to_string(),
            ));
        }
        if self.max_frame_len < MIN_FRAME_LEN {
            return Err(ScanError::Config(format!(
                "max_frame_len must be at least {}",
                MIN_FRAME_LEN
            )));
        }
        if self.event_capacity == 0 {
            return Err(ScanError::Config("event_capacity must be > 0".to_string()));
        }
        if let TransportConfig::Tcp(tcp) = &self.transport {
            if tcp.host.trim().is_empty() {
                return Err(ScanError::Config("transport host is empty".to_string()));
            }
            if tcp.port == 0 {
                return Err(ScanError::Config("transport port must be > 0".to_string()));
            }
            if tcp.connect_timeout_ms == 0 {
                return Err(ScanError::Config(
                    "connect_timeout_ms must be > 0".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn sniff_duration(&self) -> Duration {
        Duration::from_millis(self.sniff_duration_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn request_gap(&self) -> Duration {
        Duration::from_millis(self.request_gap_ms)
    }

    pub fn late_response(&self) -> Duration {
        Duration::from_millis(self.late_response_ms)
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Transparent RS485-to-TCP bridge
    Tcp(TcpConfig),
    /// In-memory bus for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Tcp(TcpConfig::default())
    }
}

/// TCP bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "192.168.1.38".to_string()
}

fn default_port() -> u16 {
    8899
}

fn default_connect_timeout() -> u64 {
    5000
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

/// Mock transport configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}
