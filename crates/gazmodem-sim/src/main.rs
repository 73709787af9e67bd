//! GazModem bus simulator
//!
//! Listens like a transparent RS485-to-TCP bridge with an ecoMAX boiler
//! controller (address 1) and a mixer module (address 32) behind it.
//!
//! # Usage
//!
//! ```bash
//! gazmodem-sim --port 8899
//! gazmodem scan --host 127.0.0.1 --port 8899 --sniff-secs 5
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use gazmodem_sim::{serve, ServerOptions, SimulatedBus};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gazmodem-sim")]
#[command(about = "Simulated PLUM/GazModem bus behind a TCP bridge")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// TCP port
    #[arg(short, long, default_value_t = 8899)]
    port: u16,

    /// Background traffic interval in milliseconds (0 for a silent bus)
    #[arg(long, default_value_t = 500)]
    chatter_ms: u64,

    /// Delay before devices answer, in milliseconds
    #[arg(long, default_value_t = 5)]
    response_delay_ms: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        "gazmodem_sim=debug"
    } else {
        "gazmodem_sim=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bus = Arc::new(SimulatedBus::demo());
    info!(devices = ?bus.addresses(), "Starting bus simulator");

    // Let measured values drift like a running installation
    let bus_for_update = bus.clone();
    let update_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            bus_for_update.update_values();
        }
    });

    let options = ServerOptions {
        chatter_interval: (args.chatter_ms > 0).then(|| Duration::from_millis(args.chatter_ms)),
        response_delay: Duration::from_millis(args.response_delay_ms),
    };
    let listener = TcpListener::bind((args.bind.as_str(), args.port)).await?;

    info!("Press Ctrl+C to stop");
    tokio::select! {
        result = serve(listener, bus, options) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }

    update_handle.abort();
    Ok(())
}
