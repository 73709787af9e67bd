//! Frame codec
//!
//! # Wire format
//!
//! ```text
//! ┌────────┬────────┬────────┬────────┬──────┬──────────┬────────┬────────┐
//! │ START  │  LEN   │  DEST  │  SRC   │ CMD  │   DATA   │  CRC   │  STOP  │
//! │  0x68  │ u16 LE │ u16 LE │ u16 LE │  u8  │ N bytes  │ u16 LE │  0x16  │
//! └────────┴────────┴────────┴────────┴──────┴──────────┴────────┴────────┘
//!   0x00     0x01     0x03     0x05    0x07    0x08      LEN-3    LEN-1
//! ```
//!
//! `LEN` counts every byte from `START` through `STOP`. The CRC covers
//! `START` up to the last `DATA` byte.

use serde::Serialize;

use crate::crc;
use crate::error::FrameError;

/// Start delimiter
pub const START: u8 = 0x68;
/// Stop delimiter
pub const STOP: u8 = 0x16;

/// START + LEN + DEST + SRC + CMD
pub const HEADER_LEN: usize = 8;
/// CRC + STOP
pub const TRAILER_LEN: usize = 3;
/// A frame with an empty payload
pub const MIN_FRAME_LEN: usize = HEADER_LEN + TRAILER_LEN;
/// Largest frame the LEN field can describe
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Destination used for bus-wide broadcasts
pub const BROADCAST_ADDRESS: u16 = 0xFFFF;

/// First payload byte of a `READ_REQ`
pub const READ_SELECTOR: u8 = 0x01;

/// Function codes
pub mod function_code {
    pub const READ_REQ: u8 = 0x02;
    pub const WRITE_REQ: u8 = 0x03;
    pub const PING: u8 = 0x09;
    pub const READ_RESP: u8 = 0x82;
}

/// A validated frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub dest: u16,
    pub src: u16,
    pub cmd: u8,
    pub data: Vec<u8>,
    /// CRC as carried on the wire
    pub crc: u16,
}

impl Frame {
    /// Total encoded length (the LEN field)
    pub fn len(&self) -> usize {
        MIN_FRAME_LEN + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_read_response(&self) -> bool {
        self.cmd == function_code::READ_RESP
    }

    /// Parameter index carried by a `READ_REQ` frame
    pub fn read_request_index(&self) -> Option<u16> {
        match (self.cmd, self.data.as_slice()) {
            (function_code::READ_REQ, [READ_SELECTOR, lo, hi, ..]) => {
                Some(u16::from_le_bytes([*lo, *hi]))
            }
            _ => None,
        }
    }

    /// Re-encode to wire bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        encode_request(self.dest, self.src, self.cmd, &self.data)
    }
}

/// Encode a frame for transmission
pub fn encode_request(dest: u16, src: u16, cmd: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_LEN - MIN_FRAME_LEN {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }
    Ok(build(dest, src, cmd, payload))
}

/// Encode a `READ_REQ` for one parameter index
pub fn read_request(dest: u16, src: u16, index: u16) -> Vec<u8> {
    let [lo, hi] = index.to_le_bytes();
    build(dest, src, function_code::READ_REQ, &[READ_SELECTOR, lo, hi])
}

/// Encode a `READ_RESP` carrying an already-serialized parameter payload
pub fn read_response(dest: u16, src: u16, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    encode_request(dest, src, function_code::READ_RESP, payload)
}

fn build(dest: u16, src: u16, cmd: u8, payload: &[u8]) -> Vec<u8> {
    let total = MIN_FRAME_LEN + payload.len();
    let mut buf = Vec::with_capacity(total);

    buf.push(START);
    buf.extend_from_slice(&(total as u16).to_le_bytes());
    buf.extend_from_slice(&dest.to_le_bytes());
    buf.extend_from_slice(&src.to_le_bytes());
    buf.push(cmd);
    buf.extend_from_slice(payload);

    let checksum = crc::compute(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf.push(STOP);

    debug_assert_eq!(buf.len(), total);
    buf
}

/// Decode one complete frame
///
/// `bytes` must span exactly one frame, START through STOP.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort {
            minimum: MIN_FRAME_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[0] != START {
        return Err(FrameError::MalformedHeader(format!(
            "expected START 0x{:02X}, found 0x{:02X}",
            START, bytes[0]
        )));
    }
    let last = bytes[bytes.len() - 1];
    if last != STOP {
        return Err(FrameError::MalformedHeader(format!(
            "expected STOP 0x{:02X}, found 0x{:02X}",
            STOP, last
        )));
    }

    let declared = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
    if declared != bytes.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }

    let crc_pos = bytes.len() - TRAILER_LEN;
    let embedded = u16::from_le_bytes([bytes[crc_pos], bytes[crc_pos + 1]]);
    let computed = crc::compute(&bytes[..crc_pos]);
    if embedded != computed {
        return Err(FrameError::CrcMismatch { embedded, computed });
    }

    Ok(Frame {
        dest: u16::from_le_bytes([bytes[3], bytes[4]]),
        src: u16::from_le_bytes([bytes[5], bytes[6]]),
        cmd: bytes[7],
        data: bytes[HEADER_LEN..crc_pos].to_vec(),
        crc: embedded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_read_request_layout() {
        let bytes = read_request(1, 0, 0x0105);

        assert_eq!(bytes.len(), 14);
        assert_eq!(bytes[0], START);
        assert_eq!(&bytes[1..3], &[14, 0]);
        assert_eq!(&bytes[3..5], &[1, 0]); // dest
        assert_eq!(&bytes[5..7], &[0, 0]); // src
        assert_eq!(bytes[7], function_code::READ_REQ);
        assert_eq!(&bytes[8..11], &[0x01, 0x05, 0x01]);
        let crc = crate::crc::compute(&bytes[..11]);
        assert_eq!(&bytes[11..13], &crc.to_le_bytes());
        assert_eq!(bytes[13], STOP);
    }

    #[rstest]
    #[case(1, 0, function_code::READ_REQ, vec![0x01, 0x00, 0x00])]
    #[case(0, 32, function_code::READ_RESP, b"Tpokj\0\xB0C\0\x07\xFF\x00\x00\xA0\x41".to_vec())]
    #[case(0xFFFF, 100, function_code::PING, vec![])]
    #[case(0x1234, 0xABCD, 0x55, vec![0x68; 300])]
    fn test_encode_decode_preserves_fields(
        #[case] dest: u16,
        #[case] src: u16,
        #[case] cmd: u8,
        #[case] payload: Vec<u8>,
    ) {
        let bytes = encode_request(dest, src, cmd, &payload).unwrap();
        let frame = decode_frame(&bytes).unwrap();

        assert_eq!(frame.dest, dest);
        assert_eq!(frame.src, src);
        assert_eq!(frame.cmd, cmd);
        assert_eq!(frame.data, payload);
        assert_eq!(frame.len(), bytes.len());
        assert_eq!(frame.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_crc_mismatch() {
        let mut bytes = read_request(1, 0, 7);
        bytes[9] ^= 0xFF;

        match decode_frame(&bytes) {
            Err(FrameError::CrcMismatch { embedded, computed }) => assert_ne!(embedded, computed),
            other => panic!("Expected CrcMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_delimiters() {
        let good = read_request(1, 0, 7);

        let mut no_start = good.clone();
        no_start[0] = 0x00;
        assert!(matches!(
            decode_frame(&no_start),
            Err(FrameError::MalformedHeader(_))
        ));

        let mut no_stop = good.clone();
        *no_stop.last_mut().unwrap() = 0x17;
        assert!(matches!(
            decode_frame(&no_stop),
            Err(FrameError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_length_mismatch_and_short_input() {
        let mut bytes = read_request(1, 0, 7);
        bytes[1] = 20;
        assert_eq!(
            decode_frame(&bytes),
            Err(FrameError::LengthMismatch {
                declared: 20,
                actual: 14
            })
        );

        assert!(matches!(
            decode_frame(&[START, 0x05, 0x00, STOP]),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn test_read_request_index() {
        let frame = decode_frame(&read_request(32, 0, 999)).unwrap();
        assert_eq!(frame.read_request_index(), Some(999));

        let ping = decode_frame(&encode_request(32, 0, function_code::PING, &[]).unwrap()).unwrap();
        assert_eq!(ping.read_request_index(), None);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; MAX_FRAME_LEN];
        assert_eq!(
            encode_request(1, 0, function_code::READ_RESP, &payload),
            Err(FrameError::PayloadTooLarge(MAX_FRAME_LEN))
        );
    }
}
