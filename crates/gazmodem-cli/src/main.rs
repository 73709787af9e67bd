//! gazmodem - scanner for PLUM / GazModem RS485 buses
//!
//! Connects to a transparent RS485-to-TCP bridge, listens for traffic to
//! find controllers, then reads their parameter tables.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use gazmodem_proto::parse_address;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, ScanOverrides};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "gazmodem")]
#[command(author, version, about = "PLUM GazModem bus scanner")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GAZMODEM_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format [default: table]
    #[arg(short, long, value_enum, global = true)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Connection to the bridge
#[derive(Args, Debug, Clone, Default)]
struct BridgeArgs {
    /// Bridge host
    #[arg(long, env = "GAZMODEM_HOST")]
    host: Option<String>,

    /// Bridge TCP port
    #[arg(long, env = "GAZMODEM_PORT")]
    port: Option<u16>,

    /// Passive listening time before scanning, in seconds
    #[arg(long)]
    sniff_secs: Option<u64>,

    /// Our own bus address, written as SRC of every request
    #[arg(long, value_parser = address_arg)]
    source: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover devices and read all their parameters
    Scan {
        #[command(flatten)]
        bridge: BridgeArgs,

        /// Highest parameter index to request (exclusive)
        #[arg(long)]
        max_index: Option<u16>,

        /// Consecutive empty answers before a device is abandoned
        #[arg(long)]
        skip_threshold: Option<u32>,

        /// Time to wait for each answer, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Scan this address (repeatable, decimal or 0x hex); skips sniffing
        /// unless --sniff-secs is also given
        #[arg(long = "address", value_name = "ADDR", value_parser = address_arg)]
        addresses: Vec<u16>,
    },

    /// Listen passively and list the addresses heard
    Sniff {
        #[command(flatten)]
        bridge: BridgeArgs,
    },

    /// Decode captured frame bytes (hex) offline
    Decode {
        /// Hex bytes, spaces allowed
        hex: String,

        /// Input is a bare READ_RESP payload rather than whole frames
        #[arg(long)]
        payload: bool,

        /// Device address to attribute a bare payload to
        #[arg(long, default_value = "0", value_parser = address_arg)]
        address: u16,

        /// Parameter index the payload answers
        #[arg(long, default_value = "0")]
        index: u16,
    },
}

fn address_arg(s: &str) -> Result<u16, String> {
    parse_address(s).ok_or_else(|| format!("invalid bus address: {}", s))
}

impl BridgeArgs {
    fn overrides(&self) -> ScanOverrides {
        ScanOverrides {
            host: self.host.clone(),
            port: self.port,
            source: self.source,
            sniff_secs: self.sniff_secs,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    let overrides = match &cli.command {
        Commands::Scan {
            bridge,
            max_index,
            skip_threshold,
            timeout_ms,
            addresses,
        } => ScanOverrides {
            max_index: *max_index,
            skip_threshold: *skip_threshold,
            timeout_ms: *timeout_ms,
            addresses: addresses.clone(),
            ..bridge.overrides()
        },
        Commands::Sniff { bridge } => bridge.overrides(),
        Commands::Decode { .. } => ScanOverrides::default(),
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(&overrides, cli.output, cli.no_color)?;

    // Create output context
    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);

    // Execute command
    let result = match &cli.command {
        Commands::Scan { .. } => commands::scan(merged.scan, &ctx).await,
        Commands::Sniff { .. } => commands::sniff(merged.scan, &ctx).await,
        Commands::Decode {
            hex,
            payload,
            address,
            index,
        } => commands::decode(hex, *payload, *address, *index, &ctx),
    };

    if let Err(e) = &result {
        ctx.error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
