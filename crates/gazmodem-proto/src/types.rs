//! Parameter type table
//!
//! The low nibble of a parameter's `Info` byte selects one of these types.
//! Each entry maps the wire id to a fixed width (or none, for strings) and
//! to the function that turns the value bytes into a [`RawValue`].

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, DecodeResult};

/// Wire data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Signed 8-bit
    ShortInt,
    /// Signed 16-bit, little-endian
    Int,
    /// Signed 32-bit, little-endian
    LongInt,
    /// Unsigned 8-bit
    Byte,
    /// Unsigned 16-bit, little-endian
    Word,
    /// Unsigned 32-bit, little-endian
    Dword,
    /// IEEE 754 single precision, little-endian
    ShortReal,
    /// IEEE 754 double precision, little-endian
    LongReal,
    /// One byte, zero is false
    Boolean,
    /// One byte, two packed decimal digits
    Bcd,
    /// Null-terminated, one byte per character
    String,
    /// Signed 64-bit, little-endian
    Int64,
    /// Unsigned 64-bit, little-endian
    Uint64,
}

/// A decoded value, before exponent scaling
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// Bytes of a value whose type id is not in the table
    Raw(#[serde(serialize_with = "serialize_hex")] Vec<u8>),
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

impl RawValue {
    /// Numeric view (booleans as 0/1); `None` for text and raw bytes
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Signed(v) => Some(*v as f64),
            RawValue::Unsigned(v) => Some(*v as f64),
            RawValue::Float(v) => Some(*v),
            RawValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            RawValue::Text(_) | RawValue::Raw(_) => None,
        }
    }
}

/// One row of the type table
#[derive(Debug, Clone, Copy)]
pub struct TypeDef {
    pub id: u8,
    pub data_type: DataType,
    pub name: &'static str,
    /// Value width in bytes, `None` for null-terminated strings
    pub width: Option<usize>,
    decode: fn(&[u8]) -> DecodeResult<RawValue>,
}

impl TypeDef {
    /// Decode the value bytes of a parameter of this type
    pub fn decode(&self, bytes: &[u8]) -> DecodeResult<RawValue> {
        match self.width {
            Some(width) => {
                check_length(bytes, width)?;
                (self.decode)(&bytes[..width])
            }
            None => (self.decode)(bytes),
        }
    }
}

/// Ids 0 and 8 are reserved zero-width types and have no entry.
pub static TYPE_TABLE: [TypeDef; 13] = [
    TypeDef {
        id: 1,
        data_type: DataType::ShortInt,
        name: "SHORT INT",
        width: Some(1),
        decode: |b| Ok(RawValue::Signed(b[0] as i8 as i64)),
    },
    TypeDef {
        id: 2,
        data_type: DataType::Int,
        name: "INT",
        width: Some(2),
        decode: |b| Ok(RawValue::Signed(i16::from_le_bytes([b[0], b[1]]) as i64)),
    },
    TypeDef {
        id: 3,
        data_type: DataType::LongInt,
        name: "LONG INT",
        width: Some(4),
        decode: |b| Ok(RawValue::Signed(i32::from_le_bytes(array(b)) as i64)),
    },
    TypeDef {
        id: 4,
        data_type: DataType::Byte,
        name: "BYTE",
        width: Some(1),
        decode: |b| Ok(RawValue::Unsigned(b[0] as u64)),
    },
    TypeDef {
        id: 5,
        data_type: DataType::Word,
        name: "WORD",
        width: Some(2),
        decode: |b| Ok(RawValue::Unsigned(u16::from_le_bytes([b[0], b[1]]) as u64)),
    },
    TypeDef {
        id: 6,
        data_type: DataType::Dword,
        name: "DWORD",
        width: Some(4),
        decode: |b| Ok(RawValue::Unsigned(u32::from_le_bytes(array(b)) as u64)),
    },
    TypeDef {
        id: 7,
        data_type: DataType::ShortReal,
        name: "SHORT REAL",
        width: Some(4),
        decode: |b| Ok(RawValue::Float(f32::from_le_bytes(array(b)) as f64)),
    },
    TypeDef {
        id: 9,
        data_type: DataType::LongReal,
        name: "LONG REAL",
        width: Some(8),
        decode: |b| Ok(RawValue::Float(f64::from_le_bytes(array(b)))),
    },
    TypeDef {
        id: 10,
        data_type: DataType::Boolean,
        name: "BOOLEAN",
        width: Some(1),
        decode: |b| Ok(RawValue::Bool(b[0] != 0)),
    },
    TypeDef {
        id: 11,
        data_type: DataType::Bcd,
        name: "BCD",
        width: Some(1),
        decode: decode_bcd,
    },
    TypeDef {
        id: 12,
        data_type: DataType::String,
        name: "STRING",
        width: None,
        decode: |b| Ok(RawValue::Text(latin1_until_nul(b))),
    },
    TypeDef {
        id: 13,
        data_type: DataType::Int64,
        name: "INT 64",
        width: Some(8),
        decode: |b| Ok(RawValue::Signed(i64::from_le_bytes(array(b)))),
    },
    TypeDef {
        id: 14,
        data_type: DataType::Uint64,
        name: "UINT 64",
        width: Some(8),
        decode: |b| Ok(RawValue::Unsigned(u64::from_le_bytes(array(b)))),
    },
];

/// Look up a type id
pub fn type_def(id: u8) -> Option<&'static TypeDef> {
    TYPE_TABLE.iter().find(|def| def.id == id)
}

impl DataType {
    pub fn from_id(id: u8) -> Option<Self> {
        type_def(id).map(|def| def.data_type)
    }

    pub fn id(self) -> u8 {
        self.def().id
    }

    /// Display name as shown by the vendor tooling
    pub fn name(self) -> &'static str {
        self.def().name
    }

    /// Byte width, `None` for strings
    pub fn byte_size(self) -> Option<usize> {
        self.def().width
    }

    /// Whether the exponent applies to this type
    pub fn is_scaled(self) -> bool {
        !matches!(self, DataType::Boolean | DataType::String)
    }

    fn def(self) -> &'static TypeDef {
        // every variant has exactly one row
        TYPE_TABLE
            .iter()
            .find(|def| def.data_type == self)
            .unwrap_or(&TYPE_TABLE[0])
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decode bytes as Latin-1 up to the first NUL, trimming whitespace
pub fn latin1_until_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text: String = bytes[..end].iter().map(|&b| b as char).collect();
    text.trim().to_string()
}

/// Encode as Latin-1; characters outside it become `?`
pub fn latin1_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn decode_bcd(b: &[u8]) -> DecodeResult<RawValue> {
    let (hi, lo) = (b[0] >> 4, b[0] & 0x0F);
    if hi > 9 || lo > 9 {
        return Err(DecodeError::InvalidBcd(b[0]));
    }
    Ok(RawValue::Unsigned((hi * 10 + lo) as u64))
}

fn array<const N: usize>(b: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&b[..N]);
    out
}

fn check_length(data: &[u8], required: usize) -> DecodeResult<()> {
    if required > data.len() {
        Err(DecodeError::DataTooShort {
            expected: required,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_ids_are_unique_and_round_trip() {
        for def in TYPE_TABLE.iter() {
            assert_eq!(DataType::from_id(def.id), Some(def.data_type));
            assert_eq!(def.data_type.id(), def.id);
            assert_eq!(def.data_type.name(), def.name);
        }
    }

    #[test]
    fn test_reserved_ids_are_unknown() {
        for id in [0u8, 8, 15, 0xFF] {
            assert!(type_def(id).is_none(), "id {} should be unknown", id);
        }
    }

    #[test]
    fn test_byte_sizes() {
        assert_eq!(DataType::ShortInt.byte_size(), Some(1));
        assert_eq!(DataType::Word.byte_size(), Some(2));
        assert_eq!(DataType::ShortReal.byte_size(), Some(4));
        assert_eq!(DataType::LongReal.byte_size(), Some(8));
        assert_eq!(DataType::String.byte_size(), None);
    }

    #[test]
    fn test_bcd() {
        let bcd = type_def(11).unwrap();
        assert_eq!(bcd.decode(&[0x42]).unwrap(), RawValue::Unsigned(42));
        assert_eq!(bcd.decode(&[0x09]).unwrap(), RawValue::Unsigned(9));
        assert_eq!(bcd.decode(&[0x4A]), Err(DecodeError::InvalidBcd(0x4A)));
    }

    #[test]
    fn test_short_input() {
        let dword = type_def(6).unwrap();
        assert_eq!(
            dword.decode(&[0x01, 0x02]),
            Err(DecodeError::DataTooShort {
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn test_latin1() {
        assert_eq!(latin1_until_nul(b"\xB0C\0junk"), "°C");
        assert_eq!(latin1_until_nul(b"  Pump  "), "Pump");
        assert_eq!(latin1_until_nul(b""), "");

        assert_eq!(latin1_encode("Zawór °C"), b"Zaw\xF3r \xB0C".to_vec());
        assert_eq!(latin1_encode("zł€"), b"z??".to_vec());
    }

    #[test]
    fn test_raw_value_serializes_tagged() {
        let json = serde_json::to_value(RawValue::Raw(vec![0xAB, 0xCD])).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "raw", "value": "abcd"}));

        let json = serde_json::to_value(RawValue::Signed(-5)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "signed", "value": -5}));
    }
}
