//! Active scanner with smart skip
//!
//! Walks every registered address through indices `0..max_index`, one
//! `READ_REQ` at a time. A device is abandoned once `empty_skip_threshold`
//! consecutive requests went unanswered or came back empty: real devices
//! expose one contiguous block of parameters followed by empty memory.
//!
//! An answer carries no index, so it is tied to the request only by timing.
//! Whatever arrives during the gap before a request is discarded, and a
//! timed out request is granted a late window while the device is known to
//! answer, so a slow answer is never credited to the next index.

use std::time::Duration;

use gazmodem_proto::frame::{function_code, read_request};
use gazmodem_proto::{decode_read_response, DecodeError, Frame, ParameterRecord};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::ScanConfig;
use crate::error::ScanResult;
use crate::events::{ErrorKind, EventSink, ScanEvent};
use crate::link::FrameLink;
use crate::registry::{DeviceRegistry, DiscoveryPhase};

/// Totals of one scan phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub devices: usize,
    pub requests: u64,
    pub parameters: u64,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Scanner {
    source_address: u16,
    max_index: u16,
    threshold: u32,
    request_timeout: Duration,
    request_gap: Duration,
    late_response: Duration,
    read_timeout: Duration,
    progress_interval: u16,
}

impl Scanner {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            source_address: config.source_address,
            max_index: config.max_index,
            threshold: config.empty_skip_threshold,
            request_timeout: config.request_timeout(),
            request_gap: config.request_gap(),
            late_response: config.late_response(),
            read_timeout: config.read_timeout(),
            progress_interval: config.progress_interval,
        }
    }

    /// Scan every registered device
    ///
    /// Addresses registered while scanning (traffic from other devices seen
    /// between answers) are scanned after the ones already known. Decoded
    /// records are appended to `records` as they arrive, so they survive a
    /// cancellation or a dropped connection.
    pub async fn run(
        &self,
        link: &mut FrameLink,
        registry: &mut DeviceRegistry,
        events: &EventSink,
        records: &mut Vec<ParameterRecord>,
    ) -> ScanResult<ScanSummary> {
        let mut summary = ScanSummary::default();
        let mut position = 0;

        while let Some(entry) = registry.get(position) {
            let address = entry.address;
            position += 1;

            if address == self.source_address {
                debug!(address, "Not scanning own source address");
                continue;
            }

            info!(
                address,
                device = position,
                known = registry.len(),
                "Scanning device"
            );
            summary.devices += 1;
            self.scan_device(address, link, registry, events, records, &mut summary)
                .await?;
        }

        info!(
            devices = summary.devices,
            requests = summary.requests,
            parameters = summary.parameters,
            skipped = summary.skipped,
            "Scan phase finished"
        );
        Ok(summary)
    }

    #[instrument(skip_all, fields(address = address))]
    async fn scan_device(
        &self,
        address: u16,
        link: &mut FrameLink,
        registry: &mut DeviceRegistry,
        events: &EventSink,
        records: &mut Vec<ParameterRecord>,
        summary: &mut ScanSummary,
    ) -> ScanResult<()> {
        let mut previous_answered = true;
        for index in 0..self.max_index {
            link.check_cancelled()?;

            if self.progress_interval > 0 && index % self.progress_interval == 0 {
                events.emit(ScanEvent::ScanProgress { address, index });
            }

            for frame in link.drain(self.request_gap).await? {
                if self.is_answer_from(address, &frame) {
                    debug!(index, "Discarding stale answer");
                } else {
                    observe(&frame, registry, events);
                }
            }
            registry.record_index(address, index);
            link.send(&read_request(address, self.source_address, index)).await?;
            summary.requests += 1;

            let mut answer = self
                .await_response(address, self.request_timeout, link, registry, events)
                .await?;
            if answer.is_none() && previous_answered && !self.late_response.is_zero() {
                answer = self
                    .await_response(address, self.late_response, link, registry, events)
                    .await?;
                if answer.is_some() {
                    debug!(index, "Late answer");
                }
            }
            previous_answered = answer.is_some();
            match answer.map(|frame| decode_read_response(index, &frame)) {
                Some(Ok(record)) => {
                    if let Some(warning) = &record.warning {
                        events.emit(ScanEvent::Error {
                            kind: ErrorKind::UnknownType,
                            context: format!("address {} index {}: {}", address, index, warning),
                        });
                    }
                    debug!(index, name = %record.name, value = %record.display_value(), "Parameter decoded");
                    registry.mark_probed(address);
                    registry.record_success(address);
                    summary.parameters += 1;
                    records.push(record.clone());
                    events.emit(ScanEvent::ParameterDecoded { record });
                }
                Some(Err(DecodeError::EmptySlot)) | None => {
                    registry.record_timeout(address);
                }
                Some(Err(e)) => {
                    debug!(index, error = %e, "Undecodable answer");
                    events.emit(ScanEvent::Error {
                        kind: ErrorKind::Decode,
                        context: format!("address {} index {}: {}", address, index, e),
                    });
                    registry.record_timeout(address);
                }
            }

            if registry.should_skip(address, self.threshold) {
                let streak = registry
                    .entry(address)
                    .map(|entry| entry.empty_streak)
                    .unwrap_or(self.threshold);
                info!(index, streak, "Empty region reached, skipping device");
                registry.mark_skipped(address);
                summary.skipped += 1;
                events.emit(ScanEvent::DeviceSkipped {
                    address,
                    last_index: index,
                    streak,
                });
                break;
            }
        }
        Ok(())
    }

    /// Wait up to `timeout` for a `READ_RESP` from `address` to us
    ///
    /// Other traffic read meanwhile registers its addresses.
    async fn await_response(
        &self,
        address: u16,
        timeout: Duration,
        link: &mut FrameLink,
        registry: &mut DeviceRegistry,
        events: &EventSink,
    ) -> ScanResult<Option<Frame>> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = self.read_timeout.min(deadline - now);

            let mut answer = None;
            for frame in link.read_frames(wait).await? {
                if answer.is_none() && self.is_answer_from(address, &frame) {
                    answer = Some(frame);
                } else {
                    observe(&frame, registry, events);
                }
            }
            if answer.is_some() {
                return Ok(answer);
            }
        }
    }

    fn is_answer_from(&self, address: u16, frame: &Frame) -> bool {
        frame.cmd == function_code::READ_RESP
            && frame.src == address
            && frame.dest == self.source_address
    }
}

fn observe(frame: &Frame, registry: &mut DeviceRegistry, events: &EventSink) {
    for address in [frame.src, frame.dest] {
        if registry.mark_sniffed(address) {
            info!(address, "Device discovered during scan");
            events.emit(ScanEvent::DeviceDiscovered {
                address,
                phase: DiscoveryPhase::Sniffed,
            });
        }
    }
}
