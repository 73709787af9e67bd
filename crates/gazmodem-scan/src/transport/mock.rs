//! Mock transport simulating a bus in memory

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gazmodem_proto::frame::{decode_frame, read_response};
use gazmodem_proto::{Frame, StreamFramer};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{TransportAdapter, TransportError};
use crate::config::MockConfig;

/// Something the bus does once a given number of read requests were sent
#[derive(Debug, Clone)]
enum Scheduled {
    Inject(Vec<u8>),
    Disconnect,
}

#[derive(Debug)]
struct Shared {
    sent: Mutex<Vec<Vec<u8>>>,
    connected: AtomicBool,
}

/// In-memory bus with simulated devices
///
/// Devices answer `READ_REQ` for the indices they hold and stay silent for
/// everything else. Chatter queued with [`MockBus::with_chatter`] is
/// delivered before anything else, as traffic already on the wire.
/// With `latency_ms` set, each queued chunk becomes readable that long after
/// the first read that finds it waiting.
pub struct MockBus {
    config: MockConfig,
    devices: BTreeMap<u16, BTreeMap<u16, Vec<u8>>>,
    inbound: VecDeque<Vec<u8>>,
    front_ready: Option<Instant>,
    schedule: Vec<(usize, Scheduled)>,
    requests: usize,
    framer: StreamFramer,
    shared: Arc<Shared>,
}

/// Inspect and control a [`MockBus`] after it was handed to a session
#[derive(Debug, Clone)]
pub struct MockBusHandle {
    shared: Arc<Shared>,
}

impl MockBus {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            config: config.clone(),
            devices: BTreeMap::new(),
            inbound: VecDeque::new(),
            front_ready: None,
            schedule: Vec::new(),
            requests: 0,
            framer: StreamFramer::new(),
            shared: Arc::new(Shared {
                sent: Mutex::new(Vec::new()),
                connected: AtomicBool::new(true),
            }),
        }
    }

    /// Add a device answering the given `(index, payload)` pairs
    pub fn with_device(
        mut self,
        address: u16,
        parameters: impl IntoIterator<Item = (u16, Vec<u8>)>,
    ) -> Self {
        self.devices.entry(address).or_default().extend(parameters);
        self
    }

    /// Add a device that never answers
    pub fn with_silent_device(mut self, address: u16) -> Self {
        self.devices.entry(address).or_default();
        self
    }

    /// Queue raw bytes as pre-existing bus traffic
    pub fn with_chatter(mut self, bytes: Vec<u8>) -> Self {
        self.inbound.push_back(bytes);
        self
    }

    /// Queue raw bytes once `requests` read requests were sent
    pub fn inject_after(mut self, requests: usize, bytes: Vec<u8>) -> Self {
        self.schedule.push((requests, Scheduled::Inject(bytes)));
        self
    }

    /// Drop the connection once `requests` read requests were sent
    pub fn disconnect_after(mut self, requests: usize) -> Self {
        self.schedule.push((requests, Scheduled::Disconnect));
        self
    }

    pub fn handle(&self) -> MockBusHandle {
        MockBusHandle {
            shared: self.shared.clone(),
        }
    }

    fn connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn answer(&mut self, request: &Frame, index: u16) {
        let payload = self
            .devices
            .get(&request.dest)
            .and_then(|params| params.get(&index));
        if let Some(payload) = payload {
            match read_response(request.src, request.dest, payload) {
                Ok(bytes) => self.inbound.push_back(bytes),
                Err(e) => debug!(error = %e, "Mock bus: cannot encode response"),
            }
        }
    }

    fn run_schedule(&mut self) {
        let due: Vec<Scheduled> = self
            .schedule
            .iter()
            .filter(|(at, _)| *at == self.requests)
            .map(|(_, action)| action.clone())
            .collect();
        for action in due {
            match action {
                Scheduled::Inject(bytes) => self.inbound.push_back(bytes),
                Scheduled::Disconnect => self.shared.connected.store(false, Ordering::SeqCst),
            }
        }
    }
}

#[async_trait]
impl TransportAdapter for MockBus {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.connected() {
            return Err(TransportError::ConnectionClosed);
        }
        self.shared.sent.lock().push(bytes.to_vec());

        for frame in self.framer.feed(bytes) {
            if let Some(index) = frame.read_request_index() {
                self.requests += 1;
                self.answer(&frame, index);
                self.run_schedule();
            }
        }
        Ok(())
    }

    async fn read_chunk(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        if !self.connected() {
            return Err(TransportError::ConnectionClosed);
        }
        if self.inbound.is_empty() {
            tokio::time::sleep(timeout).await;
            return if self.connected() {
                Ok(None)
            } else {
                Err(TransportError::ConnectionClosed)
            };
        }

        let latency = Duration::from_millis(self.config.latency_ms);
        let ready = *self.front_ready.get_or_insert_with(|| Instant::now() + latency);
        if ready > Instant::now() + timeout {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }
        tokio::time::sleep_until(ready).await;
        self.front_ready = None;
        Ok(self.inbound.pop_front())
    }

    async fn close(&mut self) {
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        format!("mock://{}-devices", self.devices.len())
    }
}

impl MockBusHandle {
    /// Raw bytes of every `send` call
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.shared.sent.lock().clone()
    }

    /// Sent bytes decoded as frames
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent()
            .iter()
            .filter_map(|bytes| decode_frame(bytes).ok())
            .collect()
    }

    /// Indices requested from `address`, in order
    pub fn requested_indices(&self, address: u16) -> Vec<u16> {
        self.sent_frames()
            .iter()
            .filter(|frame| frame.dest == address)
            .filter_map(Frame::read_request_index)
            .collect()
    }

    /// Addresses in the order they were first requested
    pub fn requested_addresses(&self) -> Vec<u16> {
        let mut order = Vec::new();
        for frame in self.sent_frames() {
            if frame.read_request_index().is_some() && !order.contains(&frame.dest) {
                order.push(frame.dest);
            }
        }
        order
    }

    /// Simulate the bridge dropping the connection
    pub fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}
