//! Scan command - sniff, then read every parameter of every device

use anyhow::{bail, Result};
use gazmodem_scan::{EndReason, ScanConfig};

use crate::output::OutputContext;

pub async fn scan(config: ScanConfig, ctx: &OutputContext) -> Result<()> {
    let (report, printer) = super::run_session(config, ctx).await?;
    printer.finish(&report);

    if let EndReason::Failed(message) = &report.reason {
        bail!(
            "Scan failed after {} parameter(s): {}",
            report.parameters.len(),
            message
        );
    }
    Ok(())
}
