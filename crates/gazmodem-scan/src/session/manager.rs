//! Session manager

use std::sync::Arc;

use gazmodem_proto::framer::FramerStats;
use gazmodem_proto::ParameterRecord;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::ScanReport;
use crate::config::ScanConfig;
use crate::error::{ScanError, ScanResult};
use crate::events::{EndReason, ErrorKind, EventSink, ScanEvent, SessionPhase};
use crate::link::FrameLink;
use crate::registry::{DeviceRegistry, DiscoveryPhase};
use crate::scanner::Scanner;
use crate::sniffer::Sniffer;
use crate::transport::{create_transport, TransportAdapter};

/// One discovery-and-scan run against one bus
///
/// Subscribe before calling [`ScanSession::run`] or [`ScanSession::spawn`];
/// the last event every subscriber sees is `SessionEnded`.
pub struct ScanSession {
    config: ScanConfig,
    transport: Option<Box<dyn TransportAdapter>>,
    events: EventSink,
    cancel: CancellationToken,
    phase: Arc<RwLock<SessionPhase>>,
}

/// Control a session running on its own task
pub struct SessionHandle {
    task: JoinHandle<ScanReport>,
    events: EventSink,
    cancel: CancellationToken,
    phase: Arc<RwLock<SessionPhase>>,
}

impl ScanSession {
    /// Create a session that opens the configured transport when run
    pub fn new(config: ScanConfig) -> ScanResult<Self> {
        config.validate()?;
        Ok(Self::build(config, None))
    }

    /// Create a session over an already opened transport
    pub fn with_transport(config: ScanConfig, transport: Box<dyn TransportAdapter>) -> Self {
        Self::build(config, Some(transport))
    }

    fn build(config: ScanConfig, transport: Option<Box<dyn TransportAdapter>>) -> Self {
        let events = EventSink::new(config.event_capacity);
        Self {
            config,
            transport,
            events,
            cancel: CancellationToken::new(),
            phase: Arc::new(RwLock::new(SessionPhase::Idle)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Token that aborts the session when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.read()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run on a new task
    pub fn spawn(self) -> SessionHandle {
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let phase = self.phase.clone();
        let task = tokio::spawn(self.run());
        SessionHandle {
            task,
            events,
            cancel,
            phase,
        }
    }

    /// Run to completion, cancellation or failure
    pub async fn run(mut self) -> ScanReport {
        let started = Instant::now();
        let mut registry = DeviceRegistry::new();
        let mut records = Vec::new();
        let mut link = None;

        let result = self.execute(&mut link, &mut registry, &mut records).await;

        let mut framer = FramerStats::default();
        if let Some(link) = link.as_mut() {
            framer = link.framer_stats();
            link.close().await;
        }

        let reason = match result {
            Ok(()) => EndReason::Completed,
            Err(ScanError::Cancelled) => {
                info!("Scan cancelled");
                EndReason::Cancelled
            }
            Err(e) if e.is_connection_error() => {
                warn!(error = %e, "Connection lost, scan failed");
                self.events.emit(ScanEvent::Error {
                    kind: ErrorKind::Connection,
                    context: e.to_string(),
                });
                EndReason::Failed(e.to_string())
            }
            Err(e) => {
                error!(error = %e, "Scan failed");
                EndReason::Failed(e.to_string())
            }
        };

        let outcome = reason.phase();
        self.set_phase(outcome);
        let duration = started.elapsed();
        info!(
            %outcome,
            devices = registry.len(),
            parameters = records.len(),
            ?duration,
            "Session ended"
        );
        self.events.emit(ScanEvent::SessionEnded {
            reason: reason.clone(),
        });

        ScanReport {
            outcome,
            reason,
            devices: registry.into_entries(),
            parameters: records,
            duration,
            framer,
        }
    }

    async fn execute(
        &mut self,
        link: &mut Option<FrameLink>,
        registry: &mut DeviceRegistry,
        records: &mut Vec<ParameterRecord>,
    ) -> ScanResult<()> {
        self.config.validate()?;

        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ScanError::Cancelled),
                transport = create_transport(&self.config.transport) => transport?,
            },
        };
        let link = link.insert(FrameLink::new(
            transport,
            self.config.max_frame_len,
            self.cancel.clone(),
        ));
        info!(transport = %link.describe(), "Session started");

        for &address in &self.config.addresses {
            if registry.mark_configured(address) {
                self.events.emit(ScanEvent::DeviceDiscovered {
                    address,
                    phase: DiscoveryPhase::Configured,
                });
            }
        }

        self.set_phase(SessionPhase::Sniffing);
        Sniffer::new(&self.config)
            .run(link, registry, &self.events)
            .await?;

        if registry.is_empty() {
            warn!("No devices to scan");
        }

        self.set_phase(SessionPhase::Scanning);
        Scanner::new(&self.config)
            .run(link, registry, &self.events, records)
            .await?;

        Ok(())
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.write() = phase;
        info!(%phase, "Phase changed");
        self.events.emit(ScanEvent::PhaseChanged { phase });
    }
}

impl SessionHandle {
    /// Request cancellation; the session ends with `Aborted`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.read()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task
    pub async fn wait(self) -> Result<ScanReport, tokio::task::JoinError> {
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::transport::MockBus;
    use gazmodem_proto::encode_payload;
    use gazmodem_proto::frame::read_request;
    use pretty_assertions::assert_eq;

    fn config() -> ScanConfig {
        ScanConfig {
            sniff_duration_ms: 1000,
            request_timeout_ms: 100,
            read_timeout_ms: 100,
            empty_skip_threshold: 3,
            max_index: 50,
            ..Default::default()
        }
    }

    fn drain(rx: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn phases(events: &[ScanEvent]) -> Vec<SessionPhase> {
        events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::PhaseChanged { phase } => Some(*phase),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_run() {
        let bus = MockBus::new(&MockConfig::default())
            .with_chatter(read_request(1, 0, 0))
            .with_device(1, [(0, encode_payload("Mode", "", 0x04, 0, &[2]))]);
        let handle = bus.handle();

        let session = ScanSession::with_transport(config(), Box::new(bus));
        let mut rx = session.subscribe();
        assert_eq!(session.phase(), SessionPhase::Idle);

        let report = session.run().await;
        assert!(report.is_complete());
        assert_eq!(report.reason, EndReason::Completed);
        assert_eq!(report.parameters.len(), 1);
        assert_eq!(report.parameters_for(1).count(), 1);
        assert_eq!(
            report.devices.iter().map(|d| d.address).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(report.framer.frames, 1 + 1);
        assert!(!handle.is_connected(), "transport must be closed");

        let events = drain(&mut rx);
        assert_eq!(
            phases(&events),
            vec![
                SessionPhase::Sniffing,
                SessionPhase::Scanning,
                SessionPhase::Complete
            ]
        );
        assert_eq!(
            events.last(),
            Some(&ScanEvent::SessionEnded {
                reason: EndReason::Completed
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_addresses_skip_fallback() {
        let bus = MockBus::new(&MockConfig::default()).with_silent_device(9);
        let handle = bus.handle();
        let config = ScanConfig {
            sniff_duration_ms: 0,
            addresses: vec![9],
            ..config()
        };

        let report = ScanSession::with_transport(config, Box::new(bus)).run().await;
        assert!(report.is_complete());
        assert_eq!(
            report.devices[0].discovered_phase,
            DiscoveryPhase::Configured
        );
        assert_eq!(handle.requested_addresses(), vec![9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_fails_session() {
        let bus = MockBus::new(&MockConfig::default())
            .with_silent_device(1)
            .disconnect_after(2);
        let session = ScanSession::with_transport(
            ScanConfig {
                addresses: vec![1],
                sniff_duration_ms: 0,
                ..config()
            },
            Box::new(bus),
        );
        let mut rx = session.subscribe();

        let report = session.run().await;
        assert_eq!(report.outcome, SessionPhase::Failed);
        assert_eq!(
            report.reason,
            EndReason::Failed("Transport error: Connection closed".to_string())
        );

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ScanEvent::Error {
                kind: ErrorKind::Connection,
                ..
            }
        )));
        assert!(matches!(
            events.last(),
            Some(ScanEvent::SessionEnded {
                reason: EndReason::Failed(_)
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_run() {
        let session =
            ScanSession::with_transport(config(), Box::new(MockBus::new(&MockConfig::default())));
        session.cancellation_token().cancel();

        let report = session.run().await;
        assert_eq!(report.outcome, SessionPhase::Aborted);
        assert_eq!(report.reason, EndReason::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_handle() {
        let bus = MockBus::new(&MockConfig::default()).with_silent_device(1);
        let session = ScanSession::with_transport(
            ScanConfig {
                addresses: vec![1],
                sniff_duration_ms: 0,
                ..config()
            },
            Box::new(bus),
        );

        let handle = session.spawn();
        let mut rx = handle.subscribe();
        let report = handle.wait().await.unwrap();

        assert!(report.is_complete());
        // subscribed after spawn, but before the task got to run
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ScanEvent::SessionEnded { .. })));
    }

    #[test]
    fn test_new_validates_config() {
        let config = ScanConfig {
            empty_skip_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(
            ScanSession::new(config),
            Err(ScanError::Config(_))
        ));
    }
}
