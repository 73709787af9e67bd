//! Error types for frame handling and payload decoding

use thiserror::Error;

/// Errors raised while validating a single frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the smallest possible frame
    #[error("frame too short: {actual} bytes (minimum {minimum})")]
    TooShort { minimum: usize, actual: usize },

    /// START or STOP delimiter missing at its expected offset
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// LEN field disagrees with the byte range handed to the decoder
    #[error("length mismatch: header declares {declared} bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Embedded CRC disagrees with the recomputed one
    #[error("CRC mismatch: frame carries 0x{embedded:04X}, computed 0x{computed:04X}")]
    CrcMismatch { embedded: u16, computed: u16 },

    /// Payload does not fit in the 16-bit LEN field
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Errors raised while decoding a `READ_RESP` payload
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Frame carries a function code other than `READ_RESP`
    #[error("not a read response: function code 0x{0:02X}")]
    NotReadResponse(u8),

    /// A null-terminated string ran off the end of the payload
    #[error("missing null terminator after {0}")]
    MissingTerminator(&'static str),

    /// The slot exists but holds no parameter (empty or `?` name)
    #[error("empty parameter slot")]
    EmptySlot,

    /// Not enough bytes for the field being read
    #[error("data too short: expected {expected} bytes, got {actual}")]
    DataTooShort { expected: usize, actual: usize },

    /// Type id outside the type table; the value bytes are kept for display
    #[error("unknown type id {type_id} (raw {})", hex::encode(raw))]
    UnknownType { type_id: u8, raw: Vec<u8> },

    /// BCD byte with a nibble above 9
    #[error("invalid BCD byte 0x{0:02X}")]
    InvalidBcd(u8),
}

/// Result type for payload decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Parse a bus address given as decimal (`32`) or hex (`0x20`)
pub fn parse_address(s: &str) -> Option<u16> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("1"), Some(1));
        assert_eq!(parse_address("  32 "), Some(32));
        assert_eq!(parse_address("0x20"), Some(32));
        assert_eq!(parse_address("0XFFFF"), Some(0xFFFF));
        assert_eq!(parse_address("65536"), None);
        assert_eq!(parse_address("boiler"), None);
    }

    #[test]
    fn test_unknown_type_message_shows_bytes() {
        let err = DecodeError::UnknownType {
            type_id: 15,
            raw: vec![0xDE, 0xAD],
        };
        assert_eq!(err.to_string(), "unknown type id 15 (raw dead)");
    }
}
