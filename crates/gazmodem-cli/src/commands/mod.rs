//! Command implementations

mod decode;
mod scan;
mod sniff;

pub use decode::decode;
pub use scan::scan;
pub use sniff::sniff;

use anyhow::{Context, Result};
use futures::StreamExt;
use gazmodem_scan::{ScanConfig, ScanEvent, ScanReport, ScanSession, TransportConfig};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::output::{EventPrinter, OutputContext};

/// Run one session to completion, rendering its events
///
/// Ctrl+C cancels the session; the partial report is still returned.
async fn run_session<'a>(
    config: ScanConfig,
    ctx: &'a OutputContext,
) -> Result<(ScanReport, EventPrinter<'a>)> {
    if let TransportConfig::Tcp(tcp) = &config.transport {
        ctx.info(&format!("Connecting to {}:{}", tcp.host, tcp.port));
    }

    let session = ScanSession::new(config).context("Invalid scan configuration")?;
    let mut events = BroadcastStream::new(session.subscribe());
    let handle = session.spawn();

    let token = handle.cancellation_token();
    ctrlc::set_handler(move || token.cancel()).context("Failed to install Ctrl+C handler")?;

    let mut printer = EventPrinter::new(ctx);
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                let ended = matches!(event, ScanEvent::SessionEnded { .. });
                printer.handle(&event);
                if ended {
                    break;
                }
            }
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                ctx.warn(&format!("Output fell behind, {} event(s) not shown", missed));
            }
        }
    }

    let report = handle.wait().await.context("Scan task failed")?;
    Ok((report, printer))
}
