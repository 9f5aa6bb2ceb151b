//! Shared types, error enums, and position value types for mlat-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Outcomes of a CPR decode that produce no position.
///
/// All three are expected in steady-state operation and call for different
/// handling: wait for more frames, discard the pair, or fix the integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CprError {
    /// The complementary even/odd frame is missing or has aged out.
    #[error("no complementary CPR frame available")]
    NoPosition,
    /// The even/odd pair straddles a longitude-zone-count transition.
    #[error("CPR pair straddles a latitude zone boundary")]
    BoundaryStraddle,
    /// Surface global decode attempted without a reference position.
    #[error("surface CPR decode requires a reference position")]
    NoReference,
}

/// Multilateration failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MlatError {
    #[error("solver did not converge within {rounds} rounds")]
    NonConverge { rounds: usize },
    #[error("at least 2 stations are required, got {0}")]
    TooFewStations(usize),
    #[error("least-squares step could not be computed")]
    Singular,
    #[error("altitude, station position or timestamp is not finite")]
    NonFinite,
}

/// Errors at the frame-extraction and configuration boundary.
#[derive(Debug, Error)]
pub enum AdsbError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("invalid frame length: expected {expected} bits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unsupported downlink format: {0}")]
    UnsupportedDf(u8),
    #[error("CRC validation failed")]
    CrcFailed,
    #[error(transparent)]
    Cpr(#[from] CprError),
    #[error(transparent)]
    Mlat(#[from] MlatError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AdsbError>;

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Geodetic position. Degrees for lat/lon, meters for altitude.
///
/// Altitude is MSL unless the producing function says height-above-ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl GeodeticPosition {
    pub const fn new(lat: f64, lon: f64, alt: f64) -> Self {
        GeodeticPosition { lat, lon, alt }
    }
}

/// Earth-centered, earth-fixed Cartesian position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EcefPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EcefPosition {
    pub const ORIGIN: EcefPosition = EcefPosition {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        EcefPosition { x, y, z }
    }

    /// Euclidean length of the position vector.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &EcefPosition) -> f64 {
        (*self - *other).norm()
    }
}

impl std::ops::Add for EcefPosition {
    type Output = EcefPosition;

    fn add(self, rhs: EcefPosition) -> EcefPosition {
        EcefPosition::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for EcefPosition {
    type Output = EcefPosition;

    fn sub(self, rhs: EcefPosition) -> EcefPosition {
        EcefPosition::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Neg for EcefPosition {
    type Output = EcefPosition;

    fn neg(self) -> EcefPosition {
        EcefPosition::new(-self.x, -self.y, -self.z)
    }
}

// ---------------------------------------------------------------------------
// CPR frame fields
// ---------------------------------------------------------------------------

/// CPR format bit of a position message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CprParity {
    Even,
    Odd,
}

impl CprParity {
    pub fn from_odd(is_odd: bool) -> Self {
        if is_odd {
            CprParity::Odd
        } else {
            CprParity::Even
        }
    }

    pub fn is_odd(self) -> bool {
        self == CprParity::Odd
    }

    /// 0 for even, 1 for odd. Used directly in the zone-count formulas.
    pub fn index(self) -> i32 {
        match self {
            CprParity::Even => 0,
            CprParity::Odd => 1,
        }
    }
}

impl std::fmt::Display for CprParity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CprParity::Even => write!(f, "even"),
            CprParity::Odd => write!(f, "odd"),
        }
    }
}

/// One CPR-encoded position as carried in an extended squitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CprFrame {
    /// 17-bit encoded latitude.
    pub enc_lat: u32,
    /// 17-bit encoded longitude.
    pub enc_lon: u32,
    pub parity: CprParity,
    pub is_surface: bool,
}

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 3-byte ICAO address.
pub type Icao = [u8; 3];

/// Format ICAO address as 6-char uppercase hex string.
pub fn icao_to_string(icao: &Icao) -> String {
    format!("{:02X}{:02X}{:02X}", icao[0], icao[1], icao[2])
}

/// Parse a 6-char hex string into an ICAO address.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    if hex.len() != 6 {
        return None;
    }
    let val = u32::from_str_radix(hex, 16).ok()?;
    Some(icao_from_u32(val))
}

pub fn icao_to_u32(icao: &Icao) -> u32 {
    ((icao[0] as u32) << 16) | ((icao[1] as u32) << 8) | (icao[2] as u32)
}

/// Build ICAO from a 24-bit integer.
pub fn icao_from_u32(val: u32) -> Icao {
    [
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ]
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if !hex.len().is_multiple_of(2) {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
