//! Scan session orchestration
//!
//! A session owns the transport and runs the sniff phase then the scan
//! phase on a single task, publishing events as it goes.

mod manager;

use std::time::Duration;

use gazmodem_proto::framer::FramerStats;
use gazmodem_proto::ParameterRecord;

pub use manager::{ScanSession, SessionHandle};

use crate::events::{EndReason, SessionPhase};
use crate::registry::RegistryEntry;

/// Everything a finished session produced
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Terminal phase
    pub outcome: SessionPhase,
    pub reason: EndReason,
    /// Registry contents in discovery order
    pub devices: Vec<RegistryEntry>,
    /// Records in the order they were decoded
    pub parameters: Vec<ParameterRecord>,
    pub duration: Duration,
    pub framer: FramerStats,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == SessionPhase::Complete
    }

    /// Records decoded from one device
    pub fn parameters_for(&self, address: u16) -> impl Iterator<Item = &ParameterRecord> {
        self.parameters
            .iter()
            .filter(move |record| record.address == address)
    }
}
