//! TCP front end emulating a transparent RS485 bridge

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gazmodem_proto::StreamFramer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::bus::SimulatedBus;

/// Bridge behaviour
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Background traffic interval, `None` for a silent bus
    pub chatter_interval: Option<Duration>,
    /// Delay before a device answers
    pub response_delay: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            chatter_interval: Some(Duration::from_millis(500)),
            response_delay: Duration::from_millis(5),
        }
    }
}

/// Accept clients forever, each on its own task
pub async fn serve(
    listener: TcpListener,
    bus: Arc<SimulatedBus>,
    options: ServerOptions,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "Bridge listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "Client connected");
        let bus = bus.clone();
        let options = options.clone();
        tokio::spawn(async move {
            match handle_client(stream, bus, options).await {
                Ok(()) => info!(%peer, "Client disconnected"),
                Err(e) => warn!(%peer, error = %e, "Client connection failed"),
            }
        });
    }
}

async fn handle_client(
    mut stream: TcpStream,
    bus: Arc<SimulatedBus>,
    options: ServerOptions,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut framer = StreamFramer::new();
    let mut buf = [0u8; 512];
    let mut tick = 0usize;

    let mut chatter = options.chatter_interval.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            read = stream.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                for frame in framer.feed(&buf[..n]) {
                    debug!(dest = frame.dest, cmd = frame.cmd, "Request");
                    if let Some(answer) = bus.respond(&frame) {
                        if !options.response_delay.is_zero() {
                            tokio::time::sleep(options.response_delay).await;
                        }
                        stream.write_all(&answer).await?;
                    }
                }
            }
            _ = next_tick(&mut chatter) => {
                let bytes = bus.chatter(tick);
                tick = tick.wrapping_add(1);
                if !bytes.is_empty() {
                    stream.write_all(&bytes).await?;
                }
            }
        }
    }
}

async fn next_tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
