//! Sniff command - listen passively and list the addresses heard

use anyhow::{bail, Result};
use gazmodem_scan::{EndReason, ScanConfig};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{CsvRow, OutputContext, OutputFormat};

#[derive(Debug, Tabled, Serialize)]
struct AddressRow {
    #[tabled(rename = "Address")]
    address: u16,
    #[tabled(rename = "Found by")]
    phase: String,
}

impl CsvRow for AddressRow {
    const HEADER: &'static [&'static str] = &["Address", "FoundBy"];

    fn fields(&self) -> Vec<String> {
        vec![self.address.to_string(), self.phase.clone()]
    }
}

pub async fn sniff(mut config: ScanConfig, ctx: &OutputContext) -> Result<()> {
    if config.sniff_duration_ms == 0 {
        bail!("Sniff duration must be positive (use --sniff-secs)");
    }
    // passive only: nothing to scan and no fallback guesses
    config.max_index = 0;
    config.fallback_addresses.clear();
    config.addresses.clear();

    let (report, mut printer) = super::run_session(config, ctx).await?;
    printer.close();

    if let EndReason::Failed(message) = &report.reason {
        bail!("Sniff failed: {}", message);
    }

    let rows: Vec<AddressRow> = report
        .devices
        .iter()
        .map(|entry| AddressRow {
            address: entry.address,
            phase: entry.discovered_phase.to_string(),
        })
        .collect();

    // JSON already carried every discovery as an event
    if ctx.format != OutputFormat::Json {
        ctx.print(&rows);
    }
    if rows.is_empty() {
        ctx.warn("No traffic heard on the bus");
    }
    Ok(())
}
