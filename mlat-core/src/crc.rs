//! CRC-24 parity for extended squitters.
//!
//! ICAO polynomial x^24 + x^23 + ... + x^10 + x^3 + 1, generator 0xFFF409.
//! DF17/18 carry the plain CRC in their last 24 bits, so a clean frame
//! divides to a remainder of 0. Frames that fail are dropped; no bit
//! correction is attempted.

use crate::types::hex_decode;

const GENERATOR: u32 = 0xFFF409;

/// Length in bytes of the PI (parity) field.
pub const PI_BYTES: usize = 3;

// ---------------------------------------------------------------------------
// Lookup table
// ---------------------------------------------------------------------------

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x800000 != 0 {
                (crc << 1) ^ GENERATOR
            } else {
                crc << 1
            };
            crc &= 0xFFFFFF;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u32; 256] = build_table();

fn divide(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |crc, &b| {
        ((crc << 8) ^ TABLE[((crc >> 16) ^ b as u32) as usize & 0xFF]) & 0xFFFFFF
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Remainder of a whole message: CRC over the payload XOR the PI field.
///
/// Zero for an intact DF17/18 frame.
pub fn crc24(data: &[u8]) -> u32 {
    if data.len() <= PI_BYTES {
        return data.iter().fold(0u32, |v, &b| (v << 8) | b as u32) & 0xFFFFFF;
    }
    let split = data.len() - PI_BYTES;
    let pi = (data[split] as u32) << 16 | (data[split + 1] as u32) << 8 | data[split + 2] as u32;
    divide(&data[..split]) ^ pi
}

/// Parity for `payload`, suitable for appending as the PI field.
pub fn parity(payload: &[u8]) -> u32 {
    divide(payload)
}

/// Append the 3-byte PI field computed over `payload`.
pub fn append_parity(payload: &mut Vec<u8>) {
    let pi = parity(payload);
    payload.extend_from_slice(&[(pi >> 16) as u8, (pi >> 8) as u8, pi as u8]);
}

/// True if a hex-encoded message has a zero remainder.
pub fn validate(msg_hex: &str) -> bool {
    hex_decode(msg_hex).is_some_and(|data| crc24(&data) == 0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hex_encode;

    const VALID_FRAMES: &[&str] = &[
        "8D4840D6202CC371C32CE0576098",
        "8D40621D58C382D690C8AC2863A7",
        "8D40621D58C386435CC412692AD6",
        "8D485020994409940838175B284F",
    ];

    #[test]
    fn test_table_entry_zero() {
        assert_eq!(TABLE[0], 0);
        assert_eq!(TABLE[1], GENERATOR);
    }

    #[test]
    fn test_valid_frames_remainder_zero() {
        for hex in VALID_FRAMES {
            let data = hex_decode(hex).unwrap();
            assert_eq!(crc24(&data), 0, "remainder should be 0 for {hex}");
            assert!(validate(hex));
        }
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let mut data = hex_decode(VALID_FRAMES[0]).unwrap();
        data[5] ^= 0x01;
        assert!(!validate(&hex_encode(&data)));
    }

    #[test]
    fn test_parity_matches_pi_field() {
        let data = hex_decode(VALID_FRAMES[1]).unwrap();
        let pi = (data[11] as u32) << 16 | (data[12] as u32) << 8 | data[13] as u32;
        assert_eq!(parity(&data[..11]), pi);
    }

    #[test]
    fn test_append_parity() {
        let data = hex_decode(VALID_FRAMES[2]).unwrap();
        let mut rebuilt = data[..11].to_vec();
        append_parity(&mut rebuilt);
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_validate_rejects_bad_hex() {
        assert!(!validate("not hex"));
        assert!(!validate("8D4"));
    }
}
