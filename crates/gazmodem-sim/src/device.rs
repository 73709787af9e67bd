//! Simulated devices and their parameter tables

use std::collections::BTreeMap;

use gazmodem_proto::encode_payload;
use gazmodem_proto::types::latin1_encode;
use rand::Rng;

/// `Info` bit marking a parameter writable
const RW: u8 = 0x20;

/// One parameter slot
#[derive(Debug, Clone, PartialEq)]
pub struct SimParameter {
    pub name: String,
    pub unit: String,
    pub info: u8,
    pub exponent: i8,
    pub value: Vec<u8>,
    /// Random walk applied by [`SimDevice::update_values`], in raw units
    pub jitter: Option<f32>,
}

impl SimParameter {
    fn new(name: &str, unit: &str, info: u8, exponent: i8, value: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            info,
            exponent,
            value,
            jitter: None,
        }
    }

    /// SHORT REAL
    pub fn float(name: &str, unit: &str, exponent: i8, value: f32) -> Self {
        Self::new(name, unit, 0x07, exponent, value.to_le_bytes().to_vec())
    }

    /// INT
    pub fn int(name: &str, unit: &str, exponent: i8, value: i16) -> Self {
        Self::new(name, unit, 0x02, exponent, value.to_le_bytes().to_vec())
    }

    /// BYTE
    pub fn byte(name: &str, unit: &str, value: u8) -> Self {
        Self::new(name, unit, 0x04, 0, vec![value])
    }

    /// WORD
    pub fn word(name: &str, unit: &str, value: u16) -> Self {
        Self::new(name, unit, 0x05, 0, value.to_le_bytes().to_vec())
    }

    /// BOOLEAN
    pub fn boolean(name: &str, value: bool) -> Self {
        Self::new(name, "", 0x0A, 0, vec![value as u8])
    }

    /// STRING
    pub fn text(name: &str, value: &str) -> Self {
        let mut bytes = latin1_encode(value);
        bytes.push(0);
        Self::new(name, "", 0x0C, 0, bytes)
    }

    /// Raw type id, for exercising decoder edge cases
    pub fn raw(name: &str, type_id: u8, value: Vec<u8>) -> Self {
        Self::new(name, "", type_id & 0x0F, 0, value)
    }

    pub fn writable(mut self) -> Self {
        self.info |= RW;
        self
    }

    pub fn varying(mut self, jitter: f32) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// READ_RESP payload for this slot
    pub fn payload(&self) -> Vec<u8> {
        encode_payload(&self.name, &self.unit, self.info, self.exponent, &self.value)
    }

    fn wander(&mut self, rng: &mut impl Rng) {
        let Some(jitter) = self.jitter else {
            return;
        };
        let delta = rng.gen_range(-jitter..=jitter);
        match self.info & 0x0F {
            0x07 if self.value.len() == 4 => {
                let current = f32::from_le_bytes([
                    self.value[0],
                    self.value[1],
                    self.value[2],
                    self.value[3],
                ]);
                self.value = (current + delta).to_le_bytes().to_vec();
            }
            0x02 if self.value.len() == 2 => {
                let current = i16::from_le_bytes([self.value[0], self.value[1]]);
                let next = (current as f32 + delta).round() as i16;
                self.value = next.to_le_bytes().to_vec();
            }
            _ => {}
        }
    }
}

/// A device on the bus
#[derive(Debug, Clone, PartialEq)]
pub struct SimDevice {
    pub address: u16,
    pub model: String,
    parameters: BTreeMap<u16, SimParameter>,
}

impl SimDevice {
    pub fn new(address: u16, model: &str) -> Self {
        Self {
            address,
            model: model.to_string(),
            parameters: BTreeMap::new(),
        }
    }

    /// Place a parameter at `index`
    pub fn with(mut self, index: u16, parameter: SimParameter) -> Self {
        self.parameters.insert(index, parameter);
        self
    }

    /// Append parameters at consecutive indices after the last one
    pub fn with_block(mut self, parameters: impl IntoIterator<Item = SimParameter>) -> Self {
        let mut next = self
            .parameters
            .keys()
            .next_back()
            .map(|&last| last + 1)
            .unwrap_or(0);
        for parameter in parameters {
            self.parameters.insert(next, parameter);
            next += 1;
        }
        self
    }

    pub fn parameter(&self, index: u16) -> Option<&SimParameter> {
        self.parameters.get(&index)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn update_values(&mut self, rng: &mut impl Rng) {
        for parameter in self.parameters.values_mut() {
            parameter.wander(rng);
        }
    }

    /// ecoMAX boiler controller, the bus master
    pub fn boiler(address: u16) -> Self {
        Self::new(address, "ecoMAX 860P")
            .with_block([
                SimParameter::text("Soft", "v1.20.41"),
                SimParameter::float("Tpokj", "°C", 0, 62.5).varying(0.4),
                SimParameter::float("Tzew", "°C", 0, -3.5).varying(0.1),
                SimParameter::int("TCWU", "°C", -1, 478).varying(2.0),
                SimParameter::float("Tpowr", "°C", 0, 54.0).varying(0.3),
                SimParameter::byte("Moc", "%", 40),
                SimParameter::byte("Tryb", "", 2).writable(),
                SimParameter::boolean("PompaCO", true),
                SimParameter::boolean("PompaCWU", false),
                SimParameter::int("TzadCO", "°C", -1, 650).writable(),
                SimParameter::int("TzadCWU", "°C", -1, 500).writable(),
                SimParameter::word("Wentylator", "rpm", 1450),
                SimParameter::float("Tspalin", "°C", 0, 128.0).varying(1.5),
                SimParameter::raw("Reserved", 0x0F, vec![0xDE, 0xAD]),
            ])
            .with(30, SimParameter::text("Serial", "PL-0815-4711"))
    }

    /// Mixer expansion module
    pub fn mixer(address: u16) -> Self {
        Self::new(address, "ecoSTER mixer").with_block([
            SimParameter::float("Tmiesz", "°C", 0, 41.0).varying(0.2),
            SimParameter::int("TzadMiesz", "°C", -1, 420).writable(),
            SimParameter::byte("Zawor", "%", 35),
            SimParameter::boolean("PompaMiesz", true),
        ])
    }
}
