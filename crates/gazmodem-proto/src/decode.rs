//! Decoding `READ_RESP` payloads into parameter records
//!
//! Payload layout:
//!
//! ```text
//! Name\0 Unit\0 Info Exp Value...
//! ```
//!
//! `Info` bits 0-3 select the type, bit 5 flags a writable parameter.
//! `Exp` is a signed power-of-ten exponent applied to numeric values.

use serde::Serialize;

use crate::error::{DecodeError, DecodeResult};
use crate::frame::{function_code, Frame};
use crate::types::{latin1_encode, latin1_until_nul, type_def, RawValue};

/// Largest exponent magnitude accepted from a device
pub const EXPONENT_LIMIT: i8 = 6;

/// `Info` bits selecting the type id
pub const INFO_TYPE_MASK: u8 = 0x0F;
/// `Info` bit flagging read/write access
pub const INFO_RW_BIT: u8 = 0x20;

/// One decoded parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRecord {
    pub address: u16,
    pub index: u16,
    pub name: String,
    pub unit: String,
    pub type_id: u8,
    pub type_name: &'static str,
    pub read_write: bool,
    /// Exponent after clamping to `[-6, 6]`
    pub exponent: i8,
    pub raw_value: RawValue,
    /// Scaled value; `None` for strings and undecodable values
    pub final_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ParameterRecord {
    /// Human readable value
    pub fn display_value(&self) -> String {
        match (&self.raw_value, self.final_value) {
            (RawValue::Bool(on), _) => (if *on { "ON" } else { "OFF" }).to_string(),
            (RawValue::Text(text), _) => text.clone(),
            (RawValue::Raw(bytes), _) => hex::encode(bytes),
            (RawValue::Float(_), Some(value)) => format!("{:.2}", value),
            (_, Some(value)) => format!("{}", value),
            (_, None) => "---".to_string(),
        }
    }

    /// `RW` or `RO`
    pub fn access(&self) -> &'static str {
        if self.read_write {
            "RW"
        } else {
            "RO"
        }
    }
}

/// Clamp a raw exponent byte, forcing anything outside `[-6, 6]` to zero
pub fn clamp_exponent(raw: u8) -> i8 {
    let exponent = raw as i8;
    if exponent.unsigned_abs() > EXPONENT_LIMIT as u8 {
        0
    } else {
        exponent
    }
}

/// `value * 10^exponent`
///
/// Negative exponents divide so that e.g. `215e-1` comes out as `21.5`.
pub fn scale(value: f64, exponent: i8) -> f64 {
    let factor = 10f64.powi(exponent.unsigned_abs() as i32);
    if exponent < 0 {
        value / factor
    } else {
        value * factor
    }
}

/// Decode value bytes for a type id
pub fn decode_value(type_id: u8, bytes: &[u8]) -> DecodeResult<RawValue> {
    match type_def(type_id) {
        Some(def) => def.decode(bytes),
        None => Err(DecodeError::UnknownType {
            type_id,
            raw: bytes.to_vec(),
        }),
    }
}

/// Decode the data field of a `READ_RESP` frame
///
/// An unknown type id still yields a record carrying the raw bytes and a
/// warning, so the name and unit are not lost.
pub fn decode_payload(address: u16, index: u16, payload: &[u8]) -> DecodeResult<ParameterRecord> {
    let (name, cursor) = read_cstr(payload, 0, "name")?;
    let (unit, cursor) = read_cstr(payload, cursor, "unit")?;

    if name.is_empty() || name == "?" {
        return Err(DecodeError::EmptySlot);
    }
    if payload.len() < cursor + 2 {
        return Err(DecodeError::DataTooShort {
            expected: cursor + 2,
            actual: payload.len(),
        });
    }

    let info = payload[cursor];
    let exponent = clamp_exponent(payload[cursor + 1]);
    let type_id = info & INFO_TYPE_MASK;
    let read_write = info & INFO_RW_BIT != 0;
    let value_bytes = &payload[cursor + 2..];

    let (raw_value, warning) = match decode_value(type_id, value_bytes) {
        Ok(value) => (value, None),
        Err(e @ DecodeError::UnknownType { .. }) => {
            (RawValue::Raw(value_bytes.to_vec()), Some(e.to_string()))
        }
        Err(e) => return Err(e),
    };

    let def = type_def(type_id);
    let final_value = match (&raw_value, def) {
        (RawValue::Raw(_) | RawValue::Text(_), _) => None,
        (value, Some(def)) if def.data_type.is_scaled() => value.as_f64().map(|v| scale(v, exponent)),
        (value, _) => value.as_f64(),
    };

    Ok(ParameterRecord {
        address,
        index,
        name,
        unit,
        type_id,
        type_name: def.map(|d| d.name).unwrap_or("UNKNOWN"),
        read_write,
        exponent,
        raw_value,
        final_value,
        warning,
    })
}

/// Decode a validated `READ_RESP` frame for the given index
pub fn decode_read_response(index: u16, frame: &Frame) -> DecodeResult<ParameterRecord> {
    if frame.cmd != function_code::READ_RESP {
        return Err(DecodeError::NotReadResponse(frame.cmd));
    }
    decode_payload(frame.src, index, &frame.data)
}

/// Encode a parameter payload (used by simulators and tests)
pub fn encode_payload(name: &str, unit: &str, info: u8, exponent: i8, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(name.len() + unit.len() + 4 + value.len());
    buf.extend(latin1_encode(name));
    buf.push(0);
    buf.extend(latin1_encode(unit));
    buf.push(0);
    buf.push(info);
    buf.push(exponent as u8);
    buf.extend_from_slice(value);
    buf
}

fn read_cstr(payload: &[u8], start: usize, field: &'static str) -> DecodeResult<(String, usize)> {
    let rest = payload.get(start..).unwrap_or_default();
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::MissingTerminator(field))?;
    Ok((latin1_until_nul(&rest[..end]), start + end + 1))
}
