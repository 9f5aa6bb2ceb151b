//! Report records flowing between field extraction, the CPR decoder,
//! the MLAT solver, and downstream consumers.

use serde::{Deserialize, Serialize};

use crate::types::{CprFrame, GeodeticPosition, Icao};

const METERS_PER_FOOT: f64 = 0.3048;

/// TC 5-8 (surface) or TC 9-18/20-22 (airborne): one CPR position message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub icao: Icao,
    pub frame: CprFrame,
    /// Barometric (TC 9-18) or GNSS (TC 20-22) altitude. None for surface.
    pub altitude_ft: Option<i32>,
    /// Reception time, seconds.
    pub timestamp: f64,
    /// Signal strength if available.
    pub rssi: Option<f64>,
}

impl PositionReport {
    pub fn altitude_m(&self) -> Option<f64> {
        self.altitude_ft.map(|ft| ft as f64 * METERS_PER_FOOT)
    }
}

/// One ground station's reception of a transmission, input to MLAT.
///
/// Station timestamps must share a common time base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationReport {
    /// Surveyed station position, MSL altitude.
    pub position: GeodeticPosition,
    /// Arrival time, seconds.
    pub timestamp: f64,
}

impl StationReport {
    pub fn new(position: GeodeticPosition, timestamp: f64) -> Self {
        StationReport {
            position,
            timestamp,
        }
    }
}

/// How a fix was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixSource {
    Cpr,
    Mlat,
}

/// Range and bearing from the receiver to a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeBearing {
    /// Statute miles.
    pub range_mi: f64,
    /// Degrees clockwise from true north, [0, 360).
    pub bearing_deg: f64,
}

/// A resolved aircraft position, handed to output adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub icao: Icao,
    pub timestamp: f64,
    pub position: GeodeticPosition,
    pub source: FixSource,
    pub range_bearing: Option<RangeBearing>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
