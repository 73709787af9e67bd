//! Simulated bus: answers requests and produces background traffic

use std::collections::BTreeMap;

use gazmodem_proto::frame::{encode_request, function_code, read_response};
use gazmodem_proto::Frame;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::device::SimDevice;

/// Function code a device uses to acknowledge a ping
const PING_RESP: u8 = function_code::PING | 0x80;

/// Devices sharing one RS485 segment
#[derive(Debug)]
pub struct SimulatedBus {
    devices: RwLock<BTreeMap<u16, SimDevice>>,
    master: Option<u16>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
            master: None,
        }
    }

    /// Demo installation: boiler controller at 1, mixer module at 32
    pub fn demo() -> Self {
        Self::new()
            .with_device(SimDevice::boiler(1))
            .with_device(SimDevice::mixer(32))
            .with_master(1)
    }

    pub fn with_device(self, device: SimDevice) -> Self {
        self.devices.write().insert(device.address, device);
        self
    }

    /// The device that polls the others in the background
    pub fn with_master(mut self, address: u16) -> Self {
        self.master = Some(address);
        self
    }

    pub fn addresses(&self) -> Vec<u16> {
        self.devices.read().keys().copied().collect()
    }

    /// Answer a frame seen on the bus, if a device is addressed by it
    pub fn respond(&self, frame: &Frame) -> Option<Vec<u8>> {
        let devices = self.devices.read();
        let device = devices.get(&frame.dest)?;

        match frame.cmd {
            function_code::READ_REQ => {
                let index = frame.read_request_index()?;
                let parameter = device.parameter(index)?;
                debug!(address = device.address, index, name = %parameter.name, "Answering read");
                match read_response(frame.src, device.address, &parameter.payload()) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        warn!(error = %e, "Cannot encode response");
                        None
                    }
                }
            }
            function_code::PING => encode_request(frame.src, device.address, PING_RESP, &[]).ok(),
            _ => None,
        }
    }

    /// Background traffic for one tick: the master pings the next device
    ///
    /// Returns the ping and the addressed device's answer.
    pub fn chatter(&self, tick: usize) -> Vec<u8> {
        let Some(master) = self.master else {
            return Vec::new();
        };
        let peers: Vec<u16> = self
            .devices
            .read()
            .keys()
            .copied()
            .filter(|&address| address != master)
            .collect();
        if peers.is_empty() {
            return Vec::new();
        }

        let peer = peers[tick % peers.len()];
        let mut bytes = encode_request(peer, master, function_code::PING, &[]).unwrap_or_default();
        bytes.extend(encode_request(master, peer, PING_RESP, &[]).unwrap_or_default());
        bytes
    }

    /// Let varying parameters drift
    pub fn update_values(&self) {
        let mut rng = rand::thread_rng();
        for device in self.devices.write().values_mut() {
            device.update_values(&mut rng);
        }
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazmodem_proto::frame::{decode_frame, read_request};
    use gazmodem_proto::{decode_read_response, StreamFramer};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_request_answered_by_addressed_device() {
        let bus = SimulatedBus::demo();
        let request = decode_frame(&read_request(32, 0, 0)).unwrap();

        let answer = decode_frame(&bus.respond(&request).unwrap()).unwrap();
        assert_eq!((answer.src, answer.dest), (32, 0));

        let record = decode_read_response(0, &answer).unwrap();
        assert_eq!(record.name, "Tmiesz");
    }

    #[test]
    fn test_unknown_address_and_index_stay_silent() {
        let bus = SimulatedBus::demo();
        let to_nobody = decode_frame(&read_request(7, 0, 0)).unwrap();
        let past_end = decode_frame(&read_request(32, 0, 500)).unwrap();

        assert!(bus.respond(&to_nobody).is_none());
        assert!(bus.respond(&past_end).is_none());
    }

    #[test]
    fn test_chatter_cycles_through_peers() {
        let bus = SimulatedBus::demo()
            .with_device(SimDevice::new(40, "panel"));

        let mut framer = StreamFramer::new();
        let first = framer.feed(&bus.chatter(0));
        let second = framer.feed(&bus.chatter(1));

        assert_eq!(first.len(), 2);
        assert_eq!((first[0].src, first[0].dest), (1, 32));
        assert_eq!((first[1].src, first[1].dest), (32, 1));
        assert_eq!(second[0].dest, 40);
    }

    #[test]
    fn test_no_master_no_chatter() {
        let bus = SimulatedBus::new().with_device(SimDevice::mixer(32));
        assert!(bus.chatter(0).is_empty());
    }
}
