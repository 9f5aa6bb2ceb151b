//! WGS84 geodesy: geodetic <-> ECEF conversion and geoid height lookup.
//!
//! Altitudes passed to `llh_to_ecef` are height above the ellipsoid (HAE).
//! Barometric and surveyed altitudes are MSL; use `llh_to_ecef_msl` for
//! those, which adds the local geoid undulation first.
//!
//! Latitudes outside [-90, 90] are not checked and give meaningless output.

use crate::types::{EcefPosition, GeodeticPosition};

/// Semi-major axis (meters).
pub const WGS84_A: f64 = 6378137.0;

/// Semi-minor axis (meters).
pub const WGS84_B: f64 = 6356752.314245;

/// First eccentricity squared.
pub const WGS84_E2: f64 = 0.0066943799901975848;

const WGS84_A2: f64 = WGS84_A * WGS84_A;
const WGS84_B2: f64 = WGS84_B * WGS84_B;

/// Second eccentricity squared, (a² - b²) / b².
const WGS84_EP2: f64 = (WGS84_A2 - WGS84_B2) / WGS84_B2;

/// Prime-vertical radius of curvature at a latitude given in radians.
fn prime_vertical_radius(lat_rad: f64) -> f64 {
    WGS84_A / (1.0 - WGS84_E2 * lat_rad.sin().powi(2)).sqrt()
}

/// Geodetic (degrees, meters HAE) to ECEF.
pub fn llh_to_ecef(lat: f64, lon: f64, alt_hae: f64) -> EcefPosition {
    let lat = lat.to_radians();
    let lon = lon.to_radians();
    let n = prime_vertical_radius(lat);

    EcefPosition {
        x: (n + alt_hae) * lat.cos() * lon.cos(),
        y: (n + alt_hae) * lat.cos() * lon.sin(),
        z: (n * (1.0 - WGS84_E2) + alt_hae) * lat.sin(),
    }
}

/// Geodetic position with MSL altitude to ECEF, applying the geoid correction.
pub fn llh_to_ecef_msl(lat: f64, lon: f64, alt_msl: f64) -> EcefPosition {
    llh_to_ecef(lat, lon, alt_msl + geoid_height(lat, lon))
}

/// ECEF to geodetic. Returned altitude is HAE.
///
/// Single-step Bowring approximation, not iterated. Residual error is far
/// below a millimeter for terrestrial and aircraft altitudes.
pub fn ecef_to_llh(pos: &EcefPosition) -> GeodeticPosition {
    let p = pos.x.hypot(pos.y);
    let theta = (WGS84_A * pos.z).atan2(WGS84_B * p);
    let lon = pos.y.atan2(pos.x);
    let lat = (pos.z + WGS84_EP2 * WGS84_B * theta.sin().powi(3))
        .atan2(p - WGS84_E2 * WGS84_A * theta.cos().powi(3));
    let alt = p / lat.cos() - prime_vertical_radius(lat);

    GeodeticPosition {
        lat: lat.to_degrees(),
        lon: lon.to_degrees(),
        alt,
    }
}

// ---------------------------------------------------------------------------
// Geoid
// ---------------------------------------------------------------------------

const GEOID_ROWS: usize = 19;
const GEOID_COLS: usize = 36;

/// Geoid undulation (meters) on a 10° grid, NIMA dataset.
///
/// Rows run 90N to 90S, columns 180W to 170E.
#[rustfmt::skip]
static GEOID_TABLE: [[i16; GEOID_COLS]; GEOID_ROWS] = [
    [13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13, 13], // 90N
    [3, 1, -2, -3, -3, -3, -1, 3, 1, 5, 9, 11, 19, 27, 31, 34, 33, 34, 33, 34, 28, 23, 17, 13, 9, 4, 4, 1, -2, -2, 0, 2, 3, 2, 1, 1], // 80N
    [2, 2, 1, -1, -3, -7, -14, -24, -27, -25, -19, 3, 24, 37, 47, 60, 61, 58, 51, 43, 29, 20, 12, 5, -2, -10, -14, -12, -10, -14, -12, -6, -2, 3, 6, 4], // 70N
    [2, 9, 17, 10, 13, 1, -14, -30, -39, -46, -42, -21, 6, 29, 49, 65, 60, 57, 47, 41, 21, 18, 14, 7, -3, -22, -29, -32, -32, -26, -15, -2, 13, 17, 19, 6], // 60N
    [-8, 8, 8, 1, -11, -19, -16, -18, -22, -35, -40, -26, -12, 24, 45, 63, 62, 59, 47, 48, 42, 28, 12, -10, -19, -33, -43, -42, -43, -29, -2, 17, 23, 22, 6, 2], // 50N
    [-12, -10, -13, -20, -31, -34, -21, -16, -26, -34, -33, -35, -26, 2, 33, 59, 52, 51, 52, 48, 35, 40, 33, -9, -28, -39, -48, -59, -50, -28, 3, 23, 37, 18, -1, -11], // 40N
    [-7, -5, -8, -15, -28, -40, -42, -29, -22, -26, -32, -51, -40, -17, 17, 31, 34, 44, 36, 28, 29, 17, 12, -20, -15, -40, -33, -34, -34, -28, 7, 29, 43, 20, 4, -6], // 30N
    [5, 10, 7, -7, -23, -39, -47, -34, -9, -10, -20, -45, -48, -32, -9, 17, 25, 31, 31, 26, 15, 6, 1, -29, -44, -61, -67, -59, -36, -11, 21, 39, 49, 39, 22, 10], // 20N
    [13, 12, 11, 2, -11, -28, -38, -29, -10, 3, 1, -11, -41, -42, -16, 3, 17, 33, 22, 23, 2, -3, -7, -36, -59, -90, -95, -63, -24, 12, 53, 60, 58, 46, 36, 26], // 10N
    [22, 16, 17, 13, 1, -12, -23, -20, -14, -3, 14, 10, -15, -27, -18, 3, 12, 20, 18, 12, -13, -9, -28, -49, -62, -89, -102, -95, -65, -39, -14, 14, 47, 62, 51, 36], // 0
    [36, 22, 11, 6, -1, -8, -10, -8, -11, -9, 1, 32, 4, -18, -13, -9, 4, 14, 12, 13, -2, -14, -25, -32, -38, -60, -75, -63, -26, 0, 35, 52, 68, 76, 64, 52], // 10S
    [51, 27, 10, 0, -9, -11, -5, -2, -3, -1, 9, 35, 20, -5, -6, -5, 0, 13, 17, 23, 21, 8, -9, -10, -11, -20, -40, -47, -45, -25, 5, 23, 45, 58, 57, 63], // 20S
    [46, 22, 5, -2, -8, -13, -10, -7, -4, 1, 9, 32, 16, 4, -8, 4, 12, 15, 22, 27, 34, 29, 14, 15, 15, 7, -9, -25, -37, -39, -23, -14, 15, 33, 34, 45], // 30S
    [21, 6, 1, -7, -12, -12, -12, -10, -7, -1, 8, 23, 15, -2, -6, 6, 21, 24, 18, 26, 31, 33, 39, 41, 30, 24, 13, -2, -20, -32, -33, -27, -14, -2, 5, 20], // 40S
    [-15, -18, -18, -16, -17, -15, -10, -10, -8, -2, 6, 14, 13, 3, 3, 10, 20, 27, 25, 26, 34, 39, 45, 45, 38, 39, 28, 13, -1, -15, -22, -22, -18, -15, -14, -10], // 50S
    [-45, -43, -37, -32, -30, -26, -23, -22, -16, -10, -2, 10, 20, 20, 21, 24, 22, 17, 16, 19, 25, 30, 35, 35, 33, 30, 27, 10, -2, -14, -23, -30, -33, -29, -35, -43], // 60S
    [-61, -60, -61, -55, -49, -44, -38, -31, -25, -16, -6, 1, 4, 5, 4, 2, 6, 12, 16, 16, 17, 21, 20, 26, 26, 22, 16, 10, -1, -16, -29, -36, -46, -55, -54, -59], // 70S
    [-53, -54, -55, -52, -48, -42, -38, -38, -29, -26, -26, -24, -23, -21, -19, -16, -12, -8, -4, -1, 1, 4, 4, 6, 5, 4, 2, -6, -15, -24, -33, -40, -48, -50, -53, -52], // 80S
    [-30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30, -30], // 90S
];

fn geoid_node(row: usize, col: usize) -> f64 {
    GEOID_TABLE[row.min(GEOID_ROWS - 1)][col % GEOID_COLS] as f64
}

/// Geoid height above the WGS84 ellipsoid (meters) at a geodetic position.
///
/// Bilinear interpolation over the 10° table. Longitude wraps at the
/// antimeridian; latitude is clamped to the polar rows.
pub fn geoid_height(lat: f64, lon: f64) -> f64 {
    let yi = (9.0 - lat / 10.0).clamp(0.0, (GEOID_ROWS - 1) as f64);
    let xi = (18.0 + lon / 10.0).rem_euclid(GEOID_COLS as f64);

    let y0 = yi.floor();
    let x0 = xi.floor();
    let fy = yi - y0;
    let fx = xi - x0;
    let (r, c) = (y0 as usize, x0 as usize);

    let top = geoid_node(r, c) * (1.0 - fx) + geoid_node(r, c + 1) * fx;
    let bottom = geoid_node(r + 1, c) * (1.0 - fx) + geoid_node(r + 1, c + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
