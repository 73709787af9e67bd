//! CRC-16/XMODEM checksum
//!
//! Polynomial `0x1021`, initial register `0x0000`, no reflection, no final XOR.
//! Every PLUM frame carries this checksum over the bytes from `START` up to
//! (but not including) the CRC field itself.

use crc::{Crc, CRC_16_XMODEM};

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Compute the checksum of `bytes`
pub fn compute(bytes: &[u8]) -> u16 {
    XMODEM.checksum(bytes)
}

/// Check `bytes` against an expected checksum
pub fn verify(bytes: &[u8], expected: u16) -> bool {
    compute(bytes) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-by-bit reference, MSB first
    fn reference(data: &[u8]) -> u16 {
        let mut crc: u16 = 0;
        for &b in data {
            crc ^= (b as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x1021
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn test_check_value() {
        assert_eq!(compute(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(compute(&[]), 0x0000);
        assert!(verify(&[], 0x0000));
    }

    #[test]
    fn test_matches_bitwise_reference() {
        let samples: [&[u8]; 5] = [
            &[0x00],
            &[0xFF, 0xFF],
            &[0x68, 0x0E, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01, 0x05, 0x00],
            b"Tpokj\0",
            &[0x16; 64],
        ];
        for data in samples {
            assert_eq!(compute(data), reference(data), "data = {:02X?}", data);
        }
    }

    #[test]
    fn test_verify_round_trip() {
        let mut data: Vec<u8> = (0u8..=255).collect();
        for len in [1usize, 7, 64, 256] {
            let slice = &data[..len];
            assert!(verify(slice, compute(slice)));
        }
        // any single-bit error is detected
        let crc = compute(&data);
        data[10] ^= 0x01;
        assert!(!verify(&data, crc));
    }
}
