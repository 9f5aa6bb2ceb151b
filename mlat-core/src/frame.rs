//! Parse raw hex strings into extended squitter frames.
//!
//! Only DF17 (ADS-B) and DF18 (TIS-B / non-transponder ADS-B) carry the
//! position messages this crate consumes. Both are 112 bits with the ICAO
//! address in bytes 1-3 and a plain CRC in the last 3 bytes.

use tracing::trace;

use crate::crc;
use crate::types::{hex_decode, AdsbError, Icao, Result};

/// Extended squitter length in bits.
pub const EXTENDED_SQUITTER_BITS: usize = 112;

// ---------------------------------------------------------------------------
// ModeFrame
// ---------------------------------------------------------------------------

/// A CRC-checked extended squitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeFrame {
    /// Downlink Format, 17 or 18
    pub df: u8,
    pub icao: Icao,
    /// Full 14-byte message
    pub raw: Vec<u8>,
    /// Reception time, seconds
    pub timestamp: f64,
    pub rssi: Option<f64>,
}

impl ModeFrame {
    /// Message Extended field, bytes 4-10.
    pub fn me(&self) -> &[u8] {
        &self.raw[4..11]
    }

    /// ME field as the low 56 bits of a u64.
    pub fn me_bits(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf[1..8].copy_from_slice(self.me());
        u64::from_be_bytes(buf)
    }

    /// ADS-B Type Code, first 5 bits of ME.
    pub fn type_code(&self) -> u8 {
        (self.raw[4] >> 3) & 0x1F
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and CRC-check a hex-encoded DF17/18 frame.
///
/// Frames with a nonzero CRC remainder are rejected outright.
pub fn parse_frame(hex_str: &str, timestamp: f64, rssi: Option<f64>) -> Result<ModeFrame> {
    let hex_str = hex_str.trim();
    let raw = hex_decode(hex_str).ok_or_else(|| AdsbError::InvalidHex(hex_str.to_string()))?;

    let Some(&first) = raw.first() else {
        return Err(AdsbError::InvalidLength {
            expected: EXTENDED_SQUITTER_BITS,
            actual: 0,
        });
    };
    let df = (first >> 3) & 0x1F;
    if df != 17 && df != 18 {
        return Err(AdsbError::UnsupportedDf(df));
    }

    let bits = raw.len() * 8;
    if bits != EXTENDED_SQUITTER_BITS {
        return Err(AdsbError::InvalidLength {
            expected: EXTENDED_SQUITTER_BITS,
            actual: bits,
        });
    }

    if crc::crc24(&raw) != 0 {
        trace!(frame = hex_str, "CRC check failed");
        return Err(AdsbError::CrcFailed);
    }

    Ok(ModeFrame {
        df,
        icao: [raw[1], raw[2], raw[3]],
        raw,
        timestamp,
        rssi,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
