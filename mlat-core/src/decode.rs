//! Extract CPR position reports from extended squitters, and build them.
//!
//! Position-bearing Type Codes:
//! - TC 5-8:   Surface position (no altitude)
//! - TC 9-18:  Airborne position, barometric altitude
//! - TC 20-22: Airborne position, GNSS height
//!
//! ME layout shared by all three, bit 0 = first bit of ME:
//! TC(5) | 15 bits TC-specific | T(1) | F(1) | LAT-CPR(17) | LON-CPR(17)

use crate::cpr::CPR_MASK;
use crate::crc;
use crate::frame::ModeFrame;
use crate::reports::PositionReport;
use crate::types::{hex_encode, CprFrame, CprParity, Icao};

/// TC used when building airborne frames (barometric, 25 ft).
const AIRBORNE_TC: u64 = 11;
/// TC used when building surface frames.
const SURFACE_TC: u64 = 6;

// ---------------------------------------------------------------------------
// Altitude decoding
// ---------------------------------------------------------------------------

/// Decode the 12-bit altitude field of an airborne position message.
///
/// Bit layout: C1 A1 C2 A2 C4 A4 B1 Q B2 D2 B4 D4. Q=1 selects 25 ft
/// resolution; Q=0 is 100 ft Gillham code. Returns None when unavailable.
pub fn decode_altitude(alt_code: u32) -> Option<i32> {
    let alt_code = alt_code & 0x0FFF;
    if alt_code == 0 {
        return None;
    }

    if (alt_code >> 4) & 1 == 1 {
        // Drop the Q bit to get an 11-bit count
        let n = ((alt_code >> 5) << 4) | (alt_code & 0x0F);
        Some(n as i32 * 25 - 1000)
    } else {
        decode_gillham(alt_code)
    }
}

/// Encode an altitude into the 12-bit field at 25 ft resolution.
///
/// Values outside the encodable range give 0 (altitude unavailable).
pub fn encode_altitude(altitude_ft: i32) -> u32 {
    let n = (altitude_ft + 1000) / 25;
    if !(0..=0x7FF).contains(&n) || altitude_ft < -1000 {
        return 0;
    }
    let n = n as u32;
    ((n >> 4) << 5) | 0x10 | (n & 0x0F)
}

fn gray_to_binary(mut gray: u32) -> u32 {
    let mut bin = 0;
    while gray != 0 {
        bin ^= gray;
        gray >>= 1;
    }
    bin
}

/// 100 ft Gillham (Mode C) altitude.
fn decode_gillham(alt_code: u32) -> Option<i32> {
    let bit = |i: u32| (alt_code >> i) & 1;
    let (c1, a1, c2, a2, c4, a4) = (bit(11), bit(10), bit(9), bit(8), bit(7), bit(6));
    let (b1, b2, d2, b4, d4) = (bit(5), bit(3), bit(2), bit(1), bit(0));

    // D1 is never transmitted
    let gray_500 = d2 << 7 | d4 << 6 | a1 << 5 | a2 << 4 | a4 << 3 | b1 << 2 | b2 << 1 | b4;
    let gray_100 = c1 << 2 | c2 << 1 | c4;

    let n500 = gray_to_binary(gray_500) as i32;
    let mut n100 = gray_to_binary(gray_100) as i32;

    if matches!(n100, 0 | 5 | 6) {
        return None;
    }
    if n100 == 7 {
        n100 = 5;
    }
    // 100 ft count runs backwards in odd 500 ft bands
    if n500 % 2 == 1 {
        n100 = 6 - n100;
    }

    Some(n500 * 500 + n100 * 100 - 1300)
}

// ---------------------------------------------------------------------------
// Position extraction
// ---------------------------------------------------------------------------

/// True for TCs that carry a CPR position.
pub fn is_position_tc(tc: u8) -> bool {
    matches!(tc, 5..=18 | 20..=22)
}

/// Extract a position report from a frame. None for non-position TCs.
pub fn decode_position(frame: &ModeFrame) -> Option<PositionReport> {
    let tc = frame.type_code();
    if !is_position_tc(tc) {
        return None;
    }
    let is_surface = (5..=8).contains(&tc);
    let bits = frame.me_bits();

    let altitude_ft = if is_surface {
        None
    } else {
        decode_altitude(((bits >> 36) & 0x0FFF) as u32)
    };

    Some(PositionReport {
        icao: frame.icao,
        frame: CprFrame {
            enc_lat: ((bits >> 17) & CPR_MASK as u64) as u32,
            enc_lon: (bits & CPR_MASK as u64) as u32,
            parity: CprParity::from_odd((bits >> 34) & 1 == 1),
            is_surface,
        },
        altitude_ft,
        timestamp: frame.timestamp,
        rssi: frame.rssi,
    })
}

// ---------------------------------------------------------------------------
// Frame building
// ---------------------------------------------------------------------------

/// Build a DF17 position frame as uppercase hex, CRC included.
///
/// Airborne frames are TC 11 with 25 ft altitude (0 if `altitude_ft` is
/// None). Surface frames are TC 6 with movement and track unavailable.
pub fn encode_position(icao: Icao, frame: &CprFrame, altitude_ft: Option<i32>) -> String {
    let cpr = (frame.parity.index() as u64) << 34
        | ((frame.enc_lat & CPR_MASK) as u64) << 17
        | (frame.enc_lon & CPR_MASK) as u64;

    let me = if frame.is_surface {
        SURFACE_TC << 51 | cpr
    } else {
        let alt = altitude_ft.map_or(0, encode_altitude) as u64;
        AIRBORNE_TC << 51 | alt << 36 | cpr
    };

    // DF17, CA=5
    let mut msg = Vec::with_capacity(14);
    msg.push(0x8D);
    msg.extend_from_slice(&icao);
    msg.extend_from_slice(&me.to_be_bytes()[1..]);
    crc::append_parity(&mut msg);
    hex_encode(&msg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
