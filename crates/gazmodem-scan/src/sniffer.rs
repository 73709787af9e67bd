//! Passive discovery
//!
//! Listens to existing bus traffic until a wall-clock deadline and registers
//! every address seen as SRC or DEST. Nothing is transmitted.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ScanConfig;
use crate::error::ScanResult;
use crate::events::{EventSink, ScanEvent};
use crate::link::FrameLink;
use crate::registry::{DeviceRegistry, DiscoveryPhase};

/// Outcome of the sniff phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SniffSummary {
    pub frames: u64,
    pub discovered: usize,
    /// Fallback addresses were registered because nothing was heard
    pub used_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct Sniffer {
    duration: Duration,
    read_timeout: Duration,
    fallback_addresses: Vec<u16>,
}

impl Sniffer {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            duration: config.sniff_duration(),
            read_timeout: config.read_timeout(),
            fallback_addresses: config.fallback_addresses.clone(),
        }
    }

    pub async fn run(
        &self,
        link: &mut FrameLink,
        registry: &mut DeviceRegistry,
        events: &EventSink,
    ) -> ScanResult<SniffSummary> {
        let mut summary = SniffSummary::default();

        if self.duration.is_zero() {
            debug!("Sniff phase disabled");
        } else {
            info!(duration = ?self.duration, "Sniffing bus traffic");
            let deadline = Instant::now() + self.duration;

            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let wait = self.read_timeout.min(deadline - now);

                for frame in link.read_frames(wait).await? {
                    summary.frames += 1;
                    for address in [frame.src, frame.dest] {
                        if registry.mark_sniffed(address) {
                            summary.discovered += 1;
                            info!(address, "Device discovered");
                            events.emit(ScanEvent::DeviceDiscovered {
                                address,
                                phase: DiscoveryPhase::Sniffed,
                            });
                        }
                    }
                }
            }
            info!(
                frames = summary.frames,
                devices = summary.discovered,
                "Sniff phase finished"
            );
        }

        if registry.is_empty() {
            info!(addresses = ?self.fallback_addresses, "No traffic detected, using fallback addresses");
            for &address in &self.fallback_addresses {
                if registry.mark_fallback(address) {
                    events.emit(ScanEvent::DeviceDiscovered {
                        address,
                        phase: DiscoveryPhase::Fallback,
                    });
                }
            }
            summary.used_fallback = true;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::error::ScanError;
    use crate::transport::MockBus;
    use gazmodem_proto::frame::{encode_request, function_code, read_request, BROADCAST_ADDRESS};
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    fn config(sniff_ms: u64) -> ScanConfig {
        ScanConfig {
            sniff_duration_ms: sniff_ms,
            ..Default::default()
        }
    }

    fn link(bus: MockBus) -> FrameLink {
        FrameLink::new(Box::new(bus), 512, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_addresses_from_src_and_dest() {
        let bus = MockBus::new(&MockConfig::default())
            .with_chatter(read_request(1, 0, 10))
            .with_chatter(encode_request(0, 32, function_code::READ_RESP, b"x\0\0\x04\x00\x01").unwrap())
            .with_chatter(encode_request(BROADCAST_ADDRESS, 1, function_code::PING, &[]).unwrap());

        let mut link = link(bus);
        let mut registry = DeviceRegistry::new();
        let events = EventSink::new(16);
        let mut rx = events.subscribe();

        let start = Instant::now();
        let summary = Sniffer::new(&config(5000))
            .run(&mut link, &mut registry, &events)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(registry.addresses(), vec![0, 1, 32]);
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.discovered, 3);
        assert!(!summary.used_fallback);

        let mut discovered = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ScanEvent::DeviceDiscovered { address, .. } = event {
                discovered.push(address);
            }
        }
        assert_eq!(discovered, vec![0, 1, 32]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_bus_uses_fallback() {
        let mut link = link(MockBus::new(&MockConfig::default()));
        let mut registry = DeviceRegistry::new();

        let summary = Sniffer::new(&config(2000))
            .run(&mut link, &mut registry, &EventSink::new(16))
            .await
            .unwrap();

        assert!(summary.used_fallback);
        assert_eq!(registry.addresses(), vec![1, 100]);
        assert_eq!(
            registry.entry(100).unwrap().discovered_phase,
            DiscoveryPhase::Fallback
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_skips_listening() {
        let bus = MockBus::new(&MockConfig::default()).with_chatter(read_request(7, 0, 1));
        let mut link = link(bus);
        let mut registry = DeviceRegistry::new();
        registry.mark_configured(5);

        let start = Instant::now();
        let summary = Sniffer::new(&config(0))
            .run(&mut link, &mut registry, &EventSink::new(16))
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(summary, SniffSummary::default());
        assert_eq!(registry.addresses(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sniff() {
        let cancel = CancellationToken::new();
        let mut link = FrameLink::new(
            Box::new(MockBus::new(&MockConfig::default())),
            512,
            cancel.clone(),
        );
        cancel.cancel();

        let result = Sniffer::new(&config(30_000))
            .run(&mut link, &mut DeviceRegistry::new(), &EventSink::new(16))
            .await;
        assert_eq!(result, Err(ScanError::Cancelled));
    }
}
