//! Output formatting for gazmodem (table, json, csv)

use std::time::Duration;

use clap::ValueEnum;
use colored::Colorize;
use gazmodem_scan::{
    DiscoveryPhase, EndReason, ErrorKind, ParameterRecord, RegistryEntry, ScanEvent, ScanReport,
    SessionPhase,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Field separator of CSV exports
pub const CSV_SEPARATOR: char = ';';

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    Table,
    /// One JSON event per line
    Json,
    /// Semicolon separated parameter rows
    Csv,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Table
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print rows in the configured format
    pub fn print<T: Tabled + Serialize + CsvRow>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                for item in data {
                    if let Ok(json) = serde_json::to_string(item) {
                        println!("{}", json);
                    }
                }
            }
            OutputFormat::Csv => {
                println!("{}", csv_line(T::HEADER.iter().map(|h| h.to_string())));
                for item in data {
                    println!("{}", csv_line(CsvRow::fields(item)));
                }
            }
        }
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                println!("{}", serde_json::Value::Object(map));
            }
            OutputFormat::Csv => {
                println!("{}", csv_line(pairs.iter().map(|(k, _)| k.to_string())));
                println!("{}", csv_line(pairs.iter().map(|(_, v)| v.clone())));
            }
        }
    }
}

/// A row with a fixed CSV column order
pub trait CsvRow {
    const HEADER: &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

/// Join fields with [`CSV_SEPARATOR`], quoting where needed
pub fn csv_line(fields: impl IntoIterator<Item = String>) -> String {
    fields
        .into_iter()
        .map(|field| escape_csv(&field))
        .collect::<Vec<_>>()
        .join(&CSV_SEPARATOR.to_string())
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(CSV_SEPARATOR) || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Display types
// =============================================================================

/// Decoded parameter, one row per record
#[derive(Debug, Tabled, Serialize, PartialEq)]
pub struct ParameterRow {
    #[tabled(rename = "Addr")]
    pub address: u16,
    #[tabled(rename = "Idx")]
    pub index: u16,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Exp")]
    pub exponent: i8,
    #[tabled(rename = "Unit")]
    pub unit: String,
    #[tabled(rename = "Type")]
    pub data_type: String,
    #[tabled(rename = "Access")]
    pub access: String,
}

impl From<&ParameterRecord> for ParameterRow {
    fn from(record: &ParameterRecord) -> Self {
        Self {
            address: record.address,
            index: record.index,
            name: record.name.clone(),
            value: record.display_value(),
            exponent: record.exponent,
            unit: record.unit.clone(),
            data_type: record.type_name.to_string(),
            access: record.access().to_string(),
        }
    }
}

impl CsvRow for ParameterRow {
    const HEADER: &'static [&'static str] = &[
        "Address", "Index", "Name", "Value", "Exponent", "Unit", "Type", "Access",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.address.to_string(),
            self.index.to_string(),
            self.name.clone(),
            self.value.clone(),
            self.exponent.to_string(),
            self.unit.clone(),
            self.data_type.clone(),
            self.access.clone(),
        ]
    }
}

/// Registry entry after a session
#[derive(Debug, Tabled, Serialize, PartialEq)]
pub struct DeviceRow {
    #[tabled(rename = "Address")]
    pub address: u16,
    #[tabled(rename = "Found by")]
    pub phase: String,
    #[tabled(rename = "Parameters")]
    pub parameters: u32,
    #[tabled(rename = "Last index")]
    pub last_index: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

impl From<&RegistryEntry> for DeviceRow {
    fn from(entry: &RegistryEntry) -> Self {
        let status = if entry.skipped {
            format!("skipped after {} empty", entry.empty_streak)
        } else if entry.last_index.is_some() {
            "scanned".to_string()
        } else {
            "not scanned".to_string()
        };
        Self {
            address: entry.address,
            phase: entry.discovered_phase.to_string(),
            parameters: entry.parameters_found,
            last_index: entry
                .last_index
                .map(|index| index.to_string())
                .unwrap_or_else(|| "-".to_string()),
            status,
        }
    }
}

impl CsvRow for DeviceRow {
    const HEADER: &'static [&'static str] =
        &["Address", "FoundBy", "Parameters", "LastIndex", "Status"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.address.to_string(),
            self.phase.clone(),
            self.parameters.to_string(),
            self.last_index.clone(),
            self.status.clone(),
        ]
    }
}

// =============================================================================
// Live event rendering
// =============================================================================

/// Renders the event stream of a running session
///
/// Table mode keeps a spinner with the current position and prints
/// discoveries above it; decoded parameters are tabulated by
/// [`EventPrinter::finish`]. JSON prints every event as it arrives, CSV only
/// the parameter rows.
pub struct EventPrinter<'a> {
    ctx: &'a OutputContext,
    spinner: Option<ProgressBar>,
    csv_header_written: bool,
    parameters: usize,
}

impl<'a> EventPrinter<'a> {
    pub fn new(ctx: &'a OutputContext) -> Self {
        let spinner = (ctx.format == OutputFormat::Table && !ctx.quiet).then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner
        });
        Self {
            ctx,
            spinner,
            csv_header_written: false,
            parameters: 0,
        }
    }

    pub fn handle(&mut self, event: &ScanEvent) {
        match self.ctx.format {
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(event) {
                    println!("{}", json);
                }
            }
            OutputFormat::Csv => {
                if let ScanEvent::ParameterDecoded { record } = event {
                    if !self.csv_header_written {
                        println!("{}", csv_line(ParameterRow::HEADER.iter().map(|h| h.to_string())));
                        self.csv_header_written = true;
                    }
                    println!("{}", csv_line(CsvRow::fields(&ParameterRow::from(record))));
                }
            }
            OutputFormat::Table => self.handle_table(event),
        }
    }

    fn handle_table(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::PhaseChanged { phase } => {
                if !phase.is_terminal() {
                    self.status(format!("{}...", phase));
                    self.line(format!("{} {}", "==>".cyan().bold(), phase.to_string().bold()));
                }
            }
            ScanEvent::DeviceDiscovered { address, phase } => {
                let found = match phase {
                    DiscoveryPhase::Sniffed => "heard on the bus".green(),
                    DiscoveryPhase::Probed => "answered a request".green(),
                    DiscoveryPhase::Fallback => "fallback, nothing heard".yellow(),
                    DiscoveryPhase::Configured => "configured".normal(),
                };
                self.line(format!("  device {:>5}  {}", address.to_string().bold(), found));
            }
            ScanEvent::ScanProgress { address, index } => {
                self.status(format!(
                    "address {} index {} ({} parameters)",
                    address, index, self.parameters
                ));
            }
            ScanEvent::ParameterDecoded { record } => {
                self.parameters += 1;
                self.status(format!(
                    "address {} index {}: {} = {} {}",
                    record.address,
                    record.index,
                    record.name,
                    record.display_value(),
                    record.unit
                ));
            }
            ScanEvent::DeviceSkipped {
                address,
                last_index,
                streak,
            } => {
                self.line(format!(
                    "  device {:>5}  {}",
                    address.to_string().bold(),
                    format!("done at index {} ({} empty in a row)", last_index, streak).dimmed()
                ));
            }
            ScanEvent::Error { kind, context } => {
                let label = match kind {
                    ErrorKind::Connection => "connection",
                    ErrorKind::UnknownType => "unknown type",
                    ErrorKind::Decode => "decode",
                };
                self.line(format!("  {} {}", format!("[{}]", label).yellow(), context));
            }
            ScanEvent::SessionEnded { reason } => {
                if let Some(spinner) = self.spinner.take() {
                    spinner.finish_and_clear();
                }
                // failures are reported by the caller as the command's error
                let text = match reason {
                    EndReason::Completed => "Scan complete".green().bold(),
                    EndReason::Cancelled => "Scan cancelled".yellow().bold(),
                    EndReason::Failed(_) => return,
                };
                if !self.ctx.quiet {
                    eprintln!("{}", text);
                }
            }
        }
    }

    fn status(&self, message: String) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(message);
        }
    }

    fn line(&self, text: String) {
        if self.ctx.quiet {
            return;
        }
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| eprintln!("{}", text)),
            None => eprintln!("{}", text),
        }
    }

    /// Stop the spinner without printing a summary
    pub fn close(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Print the final tables (table mode only)
    pub fn finish(mut self, report: &ScanReport) {
        self.close();
        if self.ctx.format != OutputFormat::Table {
            return;
        }

        let rows: Vec<ParameterRow> = report.parameters.iter().map(ParameterRow::from).collect();
        if !rows.is_empty() {
            self.ctx.print(&rows);
        }
        let devices: Vec<DeviceRow> = report.devices.iter().map(DeviceRow::from).collect();
        self.ctx.print(&devices);

        if !self.ctx.quiet {
            let outcome = match report.outcome {
                SessionPhase::Complete => report.outcome.to_string().green(),
                SessionPhase::Aborted => report.outcome.to_string().yellow(),
                _ => report.outcome.to_string().red(),
            };
            eprintln!(
                "{} device(s), {} parameter(s) in {:.1}s, {}",
                report.devices.len(),
                report.parameters.len(),
                report.duration.as_secs_f64(),
                outcome
            );
        }
    }
}
