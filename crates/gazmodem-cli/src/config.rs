//! Configuration file handling for gazmodem
//!
//! Resolution order: built-in defaults, then the TOML file, then flags and
//! environment variables.
//!
//! ```toml
//! output = "table"
//!
//! [scan]
//! sniff_duration_ms = 10000
//! max_index = 600
//!
//! [scan.transport]
//! type = "tcp"
//! host = "192.168.1.38"
//! port = 8899
//! ```

use anyhow::{Context, Result};
use clap::ValueEnum;
use gazmodem_scan::{ScanConfig, TcpConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Scan session settings
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Scan settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct ScanOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub source: Option<u16>,
    pub sniff_secs: Option<u64>,
    pub max_index: Option<u16>,
    pub skip_threshold: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub addresses: Vec<u16>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("gazmodem");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        overrides: &ScanOverrides,
        output: Option<OutputFormat>,
        no_color: bool,
    ) -> Result<MergedConfig> {
        let mut scan = self.scan.clone();

        if overrides.host.is_some() || overrides.port.is_some() {
            let mut tcp = match &scan.transport {
                TransportConfig::Tcp(tcp) => tcp.clone(),
                TransportConfig::Mock(_) => TcpConfig::default(),
            };
            if let Some(host) = &overrides.host {
                tcp.host = host.clone();
            }
            if let Some(port) = overrides.port {
                tcp.port = port;
            }
            scan.transport = TransportConfig::Tcp(tcp);
        }

        if let Some(source) = overrides.source {
            scan.source_address = source;
        }
        if let Some(secs) = overrides.sniff_secs {
            scan.sniff_duration_ms = secs.saturating_mul(1000);
        }
        if let Some(max_index) = overrides.max_index {
            scan.max_index = max_index;
        }
        if let Some(threshold) = overrides.skip_threshold {
            scan.empty_skip_threshold = threshold;
        }
        if let Some(timeout) = overrides.timeout_ms {
            scan.request_timeout_ms = timeout;
            scan.read_timeout_ms = scan.read_timeout_ms.min(timeout);
        }
        if !overrides.addresses.is_empty() {
            scan.addresses = overrides.addresses.clone();
            if overrides.sniff_secs.is_none() {
                scan.sniff_duration_ms = 0;
            }
        }

        let output = match (output, &self.output) {
            (Some(format), _) => format,
            (None, Some(name)) => OutputFormat::from_str(name, true)
                .map_err(|e| anyhow::anyhow!("Invalid output format in config: {}", e))?,
            (None, None) => OutputFormat::default(),
        };

        Ok(MergedConfig {
            scan,
            output,
            no_color: no_color || self.no_color.unwrap_or(false),
        })
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub scan: ScanConfig,
    pub output: OutputFormat,
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn tcp(merged: &MergedConfig) -> &TcpConfig {
        match &merged.scan.transport {
            TransportConfig::Tcp(tcp) => tcp,
            other => panic!("expected tcp transport, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_without_file_or_flags() {
        let merged = Config::default()
            .merge_with_args(&ScanOverrides::default(), None, false)
            .unwrap();

        assert_eq!(merged.scan, ScanConfig::default());
        assert_eq!(merged.output, OutputFormat::Table);
        assert!(!merged.no_color);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
output = "json"
no_color = true

[scan]
max_index = 300
fallback_addresses = [1]

[scan.transport]
type = "tcp"
host = "10.0.0.5"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        let merged = config
            .merge_with_args(&ScanOverrides::default(), None, false)
            .unwrap();

        assert_eq!(merged.output, OutputFormat::Json);
        assert!(merged.no_color);
        assert_eq!(merged.scan.max_index, 300);
        assert_eq!(merged.scan.fallback_addresses, vec![1]);
        assert_eq!(tcp(&merged).host, "10.0.0.5");
        assert_eq!(tcp(&merged).port, 8899);
    }

    #[test]
    fn test_flags_win_over_file() {
        let config: Config = toml::from_str(
            r#"
output = "csv"
[scan]
max_index = 300
empty_skip_threshold = 50
"#,
        )
        .unwrap();
        let overrides = ScanOverrides {
            host: Some("127.0.0.1".into()),
            port: Some(9000),
            max_index: Some(20),
            timeout_ms: Some(250),
            ..Default::default()
        };

        let merged = config
            .merge_with_args(&overrides, Some(OutputFormat::Table), false)
            .unwrap();

        assert_eq!(merged.output, OutputFormat::Table);
        assert_eq!(merged.scan.max_index, 20);
        assert_eq!(merged.scan.empty_skip_threshold, 50);
        assert_eq!(merged.scan.request_timeout_ms, 250);
        assert_eq!(merged.scan.read_timeout_ms, 250);
        assert_eq!(tcp(&merged).host, "127.0.0.1");
        assert_eq!(tcp(&merged).port, 9000);
    }

    #[test]
    fn test_explicit_addresses_skip_sniffing() {
        let overrides = ScanOverrides {
            addresses: vec![1, 32],
            ..Default::default()
        };
        let merged = Config::default()
            .merge_with_args(&overrides, None, false)
            .unwrap();

        assert_eq!(merged.scan.addresses, vec![1, 32]);
        assert_eq!(merged.scan.sniff_duration_ms, 0);
    }

    #[test]
    fn test_explicit_addresses_with_sniff_secs() {
        let overrides = ScanOverrides {
            addresses: vec![1],
            sniff_secs: Some(5),
            ..Default::default()
        };
        let merged = Config::default()
            .merge_with_args(&overrides, None, false)
            .unwrap();

        assert_eq!(merged.scan.sniff_duration_ms, 5000);
    }

    #[test]
    fn test_host_flag_replaces_mock_transport() {
        let config: Config = toml::from_str(
            r#"
[scan.transport]
type = "mock"
"#,
        )
        .unwrap();
        let overrides = ScanOverrides {
            host: Some("bridge.local".into()),
            ..Default::default()
        };

        let merged = config.merge_with_args(&overrides, None, false).unwrap();
        assert_eq!(tcp(&merged).host, "bridge.local");
    }

    #[test]
    fn test_invalid_output_in_file() {
        let config = Config {
            output: Some("xml".into()),
            ..Default::default()
        };
        assert!(config
            .merge_with_args(&ScanOverrides::default(), None, false)
            .is_err());
    }
}
