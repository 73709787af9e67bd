//! gazmodem-proto - PLUM/GazModem wire protocol
//!
//! Pure, I/O-free building blocks for talking to ecoMAX/ecoNET/ecoSTER
//! heating controllers through a transparent RS485-to-TCP bridge.
//!
//! # Modules
//!
//! - [`crc`] - CRC-16/XMODEM
//! - [`frame`] - encode requests, validate complete frames
//! - [`framer`] - extract frames from an unaligned byte stream
//! - [`types`] - the parameter type table
//! - [`decode`] - `READ_RESP` payload to [`ParameterRecord`]
//!
//! # Quick Start
//!
//! ```rust
//! use gazmodem_proto::{decode_read_response, frame, StreamFramer};
//!
//! // A controller at address 1 answering index 17
//! let payload = b"Tpokj\0\xB0C\0\x07\xFF\x00\x00\xA0\x41";
//! let wire = frame::read_response(0, 1, payload).unwrap();
//!
//! // Bytes arrive in arbitrary chunks
//! let mut framer = StreamFramer::new();
//! assert!(framer.feed(&wire[..5]).is_empty());
//! let frames = framer.feed(&wire[5..]);
//!
//! let record = decode_read_response(17, &frames[0]).unwrap();
//! assert_eq!(record.name, "Tpokj");
//! assert_eq!(record.unit, "°C");
//! assert_eq!(record.final_value, Some(2.0));
//! ```

pub mod crc;
pub mod decode;
pub mod error;
pub mod frame;
pub mod framer;
pub mod types;

pub use decode::{
    clamp_exponent, decode_payload, decode_read_response, decode_value, encode_payload, scale,
    ParameterRecord,
};
pub use error::{parse_address, DecodeError, DecodeResult, FrameError};
pub use frame::{decode_frame, encode_request, function_code, read_request, Frame};
pub use framer::{FramerState, FramerStats, StreamFramer};
pub use types::{DataType, RawValue, TypeDef, TYPE_TABLE};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::decode::ParameterRecord;
    pub use crate::error::{DecodeError, FrameError};
    pub use crate::frame::Frame;
    pub use crate::framer::StreamFramer;
    pub use crate::types::{DataType, RawValue};
}
