//! Compact Position Reporting — CPR encode/decode for ADS-B positions.
//!
//! Decode modes:
//! - Global: even+odd frame pair for the same aircraft. Airborne needs no
//!   reference; surface needs a rough reference to pick the 90° quadrant.
//! - Local: single frame + reference position within half a zone.
//!
//! Key constants:
//! - NZ = 15 (latitude zones per quadrant)
//! - Nb = 17 (bits per coordinate)
//! - Dlat_even = 360 / 60 = 6.0 degrees (1.5 for surface)
//! - Dlat_odd = 360 / 59 ≈ 6.1017 degrees (≈1.525 for surface)

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::config::CprConfig;
use crate::reports::{FixSource, PositionFix, PositionReport, RangeBearing};
use crate::types::{CprError, CprFrame, CprParity, GeodeticPosition, Icao};

/// Number of latitude zones per quadrant.
const NZ: f64 = 15.0;

/// Bits per CPR coordinate.
const NB: u32 = 17;

/// 2^17 = 131072.
const CPR_MAX: f64 = (1u32 << NB) as f64;

pub const CPR_MASK: u32 = (1u32 << NB) - 1;

/// Airborne frames older than this are dropped from the pairing cache (seconds).
pub const AIRBORNE_TIMEOUT: f64 = 10.0;

/// Surface frames are sent less often, so they are kept longer (seconds).
pub const SURFACE_TIMEOUT: f64 = 25.0;

// ---------------------------------------------------------------------------
// Zone arithmetic
// ---------------------------------------------------------------------------

/// Number of latitude zones: 60 for even frames, 59 for odd.
pub fn nz(parity: CprParity) -> f64 {
    4.0 * NZ - parity.index() as f64
}

fn span(is_surface: bool) -> f64 {
    if is_surface {
        90.0
    } else {
        360.0
    }
}

/// Latitude zone size in degrees.
pub fn dlat(parity: CprParity, is_surface: bool) -> f64 {
    let zones = nz(parity);
    if zones == 0.0 {
        span(is_surface)
    } else {
        span(is_surface) / zones
    }
}

/// Number of longitude zones at a given latitude (NL function).
///
/// Ranges from 1 near poles to 59 at equator.
pub fn nl(lat: f64) -> i32 {
    if lat.abs() >= 87.0 {
        return 1;
    }

    let a = 1.0 - (std::f64::consts::PI / (2.0 * NZ)).cos();
    let b = lat.abs().to_radians().cos().powi(2);
    let nl_val = (2.0 * std::f64::consts::PI / (1.0 - a / b).acos()).floor() as i32;
    nl_val.max(1)
}

/// Longitude zone size in degrees at a given latitude.
pub fn dlon(lat: f64, parity: CprParity, is_surface: bool) -> f64 {
    let zones = (nl(lat) - parity.index()).max(1);
    span(is_surface) / zones as f64
}

/// Modulo that always returns a non-negative result.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

// ---------------------------------------------------------------------------
// Stateless codec
// ---------------------------------------------------------------------------

/// Encode a position into 17-bit CPR fields `(enc_lat, enc_lon)`.
///
/// Surface positions are encoded at 2^19 scale over the airborne zone sizes
/// and truncated to 17 bits, which is the same as 2^17 over the 90° zones.
///
/// The longitude zone count is taken at the quantised latitude `rlat`, as
/// DO-260 specifies. Encoders that use the raw latitude produce different
/// longitude bits only within about 1e-5° of an NL transition.
pub fn encode(position: &GeodeticPosition, parity: CprParity, is_surface: bool) -> (u32, u32) {
    let scale = if is_surface {
        (1u32 << (NB + 2)) as f64
    } else {
        CPR_MAX
    };

    let dlat_i = dlat(parity, false);
    let yz = (scale * modulo(position.lat, dlat_i) / dlat_i + 0.5).floor();
    let rlat = dlat_i * (yz / scale + (position.lat / dlat_i).floor());

    let dlon_i = dlon(rlat, parity, false);
    let xz = (scale * modulo(position.lon, dlon_i) / dlon_i + 0.5).floor();

    ((yz as i64 as u32) & CPR_MASK, (xz as i64 as u32) & CPR_MASK)
}

/// Local CPR decode using a reference position.
///
/// Valid when the true position is within half a zone of the reference.
/// The returned altitude is 0: CPR carries no altitude.
pub fn decode_local(reference: &GeodeticPosition, frame: &CprFrame) -> GeodeticPosition {
    let dlat_i = dlat(frame.parity, frame.is_surface);
    let cpr_lat = frame.enc_lat as f64 / CPR_MAX;
    let cpr_lon = frame.enc_lon as f64 / CPR_MAX;

    let j = (reference.lat / dlat_i).floor()
        + (0.5 + modulo(reference.lat, dlat_i) / dlat_i - cpr_lat).floor();
    let lat = dlat_i * (j + cpr_lat);

    let dlon_i = dlon(lat, frame.parity, frame.is_surface);
    let m = (reference.lon / dlon_i).floor()
        + (0.5 + modulo(reference.lon, dlon_i) / dlon_i - cpr_lon).floor();
    let lon = dlon_i * (m + cpr_lon);

    GeodeticPosition::new(normalize_lat(lat), normalize_lon(lon), 0.0)
}

/// Global CPR decode from an even/odd frame pair.
///
/// `even` and `odd` are `(enc_lat, enc_lon)`. `most_recent` picks which frame
/// the result is reported for. Surface pairs need `hint` to resolve the
/// quadrant; airborne pairs ignore it. The returned altitude is 0.
pub fn decode_global(
    even: (u32, u32),
    odd: (u32, u32),
    hint: Option<&GeodeticPosition>,
    most_recent: CprParity,
    is_surface: bool,
) -> Result<GeodeticPosition, CprError> {
    let hint = match (is_surface, hint) {
        (true, None) => return Err(CprError::NoReference),
        (_, hint) => hint,
    };

    let lat_even = even.0 as f64;
    let lat_odd = odd.0 as f64;
    let lon_even = even.1 as f64;
    let lon_odd = odd.1 as f64;

    // Latitude zone index
    let j = ((nz(CprParity::Odd) * lat_even - nz(CprParity::Even) * lat_odd) / CPR_MAX + 0.5)
        .floor();

    let mut rlat_even = dlat(CprParity::Even, is_surface)
        * (modulo(j, nz(CprParity::Even)) + lat_even / CPR_MAX);
    let mut rlat_odd =
        dlat(CprParity::Odd, is_surface) * (modulo(j, nz(CprParity::Odd)) + lat_odd / CPR_MAX);

    if rlat_even > 270.0 {
        rlat_even -= 360.0;
    }
    if rlat_odd > 270.0 {
        rlat_odd -= 360.0;
    }

    // Surface latitudes come out in [0, 90); the other candidate is 90° south
    if let Some(h) = hint.filter(|_| is_surface) {
        if h.lat < rlat_even - 45.0 {
            rlat_even -= 90.0;
            rlat_odd -= 90.0;
        }
    }

    if nl(rlat_even) != nl(rlat_odd) {
        return Err(CprError::BoundaryStraddle);
    }

    let (rlat, enc_lon) = match most_recent {
        CprParity::Even => (rlat_even, lon_even),
        CprParity::Odd => (rlat_odd, lon_odd),
    };

    let nl_rlat = nl(rlat);
    let dl = dlon(rlat, most_recent, is_surface);

    // Longitude zone index
    let m = ((lon_even * (nl_rlat - 1) as f64 - lon_odd * nl_rlat as f64) / CPR_MAX + 0.5).floor();
    let zones = (nl_rlat - most_recent.index()).max(1) as f64;
    let mut rlon = dl * (modulo(m, zones) + enc_lon / CPR_MAX);

    if let Some(h) = hint.filter(|_| is_surface) {
        // Pick the 90° segment nearest the reference
        rlon += 90.0 * ((h.lon - rlon) / 90.0).round();
    }

    Ok(GeodeticPosition::new(
        normalize_lat(rlat),
        normalize_lon(rlon),
        0.0,
    ))
}

/// Fold latitudes above 90° back into the southern hemisphere.
pub fn normalize_lat(lat: f64) -> f64 {
    if lat > 90.0 {
        lat - 360.0
    } else {
        lat
    }
}

/// Map longitude into (-180, 180].
pub fn normalize_lon(lon: f64) -> f64 {
    let lon = modulo(lon, 360.0);
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

// ---------------------------------------------------------------------------
// Range and bearing
// ---------------------------------------------------------------------------

/// WGS84 flattening.
const FLATTENING: f64 = 1.0 / 298.257223563;

/// Equatorial radius in statute miles, per degree.
const EARTH_RADIUS_MI_PER_DEG: f64 = 3963.19059 * (std::f64::consts::PI / 180.0);

/// Range (statute miles) and initial bearing from `from` to `to`.
///
/// Flat-earth approximation using the meridional and prime-vertical radii
/// of curvature at the mean latitude. Good for receiver-range distances.
pub fn range_bearing(from: &GeodeticPosition, to: &GeodeticPosition) -> RangeBearing {
    let e2 = FLATTENING * (2.0 - FLATTENING);

    let delta_lat = to.lat - from.lat;
    let delta_lon = normalize_lon(to.lon - from.lon);
    let avg_lat = ((from.lat + to.lat) / 2.0).to_radians();
    let sin2 = avg_lat.sin().powi(2);

    let r1 = EARTH_RADIUS_MI_PER_DEG * (1.0 - e2) / (1.0 - e2 * sin2).powf(1.5);
    let r2 = EARTH_RADIUS_MI_PER_DEG / (1.0 - e2 * sin2).sqrt();

    let north = r1 * delta_lat;
    let east = r2 * avg_lat.cos() * delta_lon;

    let mut bearing = east.atan2(north).to_degrees();
    if bearing < 0.0 {
        bearing += 360.0;
    }

    RangeBearing {
        range_mi: east.hypot(north),
        bearing_deg: bearing,
    }
}

// ---------------------------------------------------------------------------
// Stateful decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct CprSlot {
    enc_lat: u32,
    enc_lon: u32,
    timestamp: f64,
}

/// Most recent even and odd frame for one aircraft and surface/air category.
#[derive(Debug, Clone, Default)]
struct SlotPair {
    even: Option<CprSlot>,
    odd: Option<CprSlot>,
}

impl SlotPair {
    fn is_empty(&self) -> bool {
        self.even.is_none() && self.odd.is_none()
    }
}

/// Pairs even/odd CPR frames per aircraft and resolves them globally.
///
/// Keyed by `(icao, is_surface)`, so airborne and surface frames never mix.
/// Stale frames are evicted on every call, using the incoming frame's
/// timestamp as the current time. A pair further apart in time than the
/// category timeout is never resolved, so a late frame cannot pair with a
/// complement that is newer than it.
#[derive(Debug, Clone)]
pub struct CprDecoder {
    reference: Option<GeodeticPosition>,
    airborne_timeout: f64,
    surface_timeout: f64,
    slots: HashMap<(Icao, bool), SlotPair>,

    global_decodes: u64,
    straddles: u64,
}

impl CprDecoder {
    pub fn new(reference: Option<GeodeticPosition>) -> Self {
        Self::with_timeouts(reference, AIRBORNE_TIMEOUT, SURFACE_TIMEOUT)
    }

    pub fn with_timeouts(
        reference: Option<GeodeticPosition>,
        airborne_timeout: f64,
        surface_timeout: f64,
    ) -> Self {
        CprDecoder {
            reference,
            airborne_timeout,
            surface_timeout,
            slots: HashMap::new(),
            global_decodes: 0,
            straddles: 0,
        }
    }

    pub fn from_config(reference: Option<GeodeticPosition>, config: &CprConfig) -> Self {
        Self::with_timeouts(reference, config.airborne_timeout, config.surface_timeout)
    }

    pub fn reference(&self) -> Option<&GeodeticPosition> {
        self.reference.as_ref()
    }

    pub fn set_reference(&mut self, reference: Option<GeodeticPosition>) {
        self.reference = reference;
    }

    /// Number of (aircraft, category) entries currently cached.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Successful global decodes so far.
    pub fn global_decodes(&self) -> u64 {
        self.global_decodes
    }

    /// Pairs discarded because they straddled an NL boundary.
    pub fn straddles(&self) -> u64 {
        self.straddles
    }

    fn timeout(&self, is_surface: bool) -> f64 {
        if is_surface {
            self.surface_timeout
        } else {
            self.airborne_timeout
        }
    }

    /// Record a frame and try a global decode against its complement.
    pub fn decode(
        &mut self,
        icao: Icao,
        frame: &CprFrame,
        timestamp: f64,
    ) -> Result<GeodeticPosition, CprError> {
        let slot = CprSlot {
            enc_lat: frame.enc_lat,
            enc_lon: frame.enc_lon,
            timestamp,
        };
        let key = (icao, frame.is_surface);
        let pair = self.slots.entry(key).or_default();
        match frame.parity {
            CprParity::Even => pair.even = Some(slot),
            CprParity::Odd => pair.odd = Some(slot),
        }
        trace!(icao = ?icao, parity = %frame.parity, surface = frame.is_surface, "CPR frame recorded");

        self.prune(timestamp);

        let (even, odd) = match self.slots.get(&key) {
            Some(SlotPair {
                even: Some(even),
                odd: Some(odd),
            }) => (*even, *odd),
            _ => return Err(CprError::NoPosition),
        };

        // Out-of-order input can leave a complement newer than `timestamp`
        if (even.timestamp - odd.timestamp).abs() > self.timeout(frame.is_surface) {
            trace!(icao = ?icao, "CPR pair too far apart in time");
            return Err(CprError::NoPosition);
        }

        let most_recent = if odd.timestamp > even.timestamp {
            CprParity::Odd
        } else {
            CprParity::Even
        };

        match decode_global(
            (even.enc_lat, even.enc_lon),
            (odd.enc_lat, odd.enc_lon),
            self.reference.as_ref(),
            most_recent,
            frame.is_surface,
        ) {
            Ok(pos) => {
                self.global_decodes += 1;
                Ok(pos)
            }
            Err(CprError::BoundaryStraddle) => {
                self.straddles += 1;
                debug!(icao = ?icao, "CPR pair straddles zone boundary, discarded");
                Err(CprError::BoundaryStraddle)
            }
            Err(e) => Err(e),
        }
    }

    /// Decode a parsed position report into a downstream fix.
    ///
    /// Altitude comes from the report (MSL meters, 0 when absent). Range and
    /// bearing are filled in when the decoder has a reference position.
    pub fn decode_report(&mut self, report: &PositionReport) -> Result<PositionFix, CprError> {
        let mut position = self.decode(report.icao, &report.frame, report.timestamp)?;
        position.alt = report.altitude_m().unwrap_or(0.0);

        Ok(PositionFix {
            icao: report.icao,
            timestamp: report.timestamp,
            position,
            source: FixSource::Cpr,
            range_bearing: self.reference.map(|r| range_bearing(&r, &position)),
        })
    }

    /// Drop frames older than the category timeout. Returns frames removed.
    pub fn prune(&mut self, now: f64) -> usize {
        let (air, sfc) = (self.airborne_timeout, self.surface_timeout);
        let mut removed = 0;

        for ((_, is_surface), pair) in self.slots.iter_mut() {
            let timeout = if *is_surface { sfc } else { air };
            for slot in [&mut pair.even, &mut pair.odd] {
                if slot.is_some_and(|s| now - s.timestamp > timeout) {
                    *slot = None;
                    removed += 1;
                }
            }
        }
        self.slots.retain(|_, pair| !pair.is_empty());

        if removed > 0 {
            trace!(removed, "evicted stale CPR frames");
        }
        removed
    }
}

impl Default for CprDecoder {
    fn default() -> Self {
        CprDecoder::new(None)
    }
}

/// `CprDecoder` behind one mutex, for feeding reports from several threads.
///
/// The lock is held across the whole record/evict/resolve sequence.
#[derive(Debug, Default)]
pub struct SharedCprDecoder {
    inner: Mutex<CprDecoder>,
}

impl SharedCprDecoder {
    pub fn new(decoder: CprDecoder) -> Self {
        SharedCprDecoder {
            inner: Mutex::new(decoder),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CprDecoder> {
        // Decoder state is always consistent between calls
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn decode(
        &self,
        icao: Icao,
        frame: &CprFrame,
        timestamp: f64,
    ) -> Result<GeodeticPosition, CprError> {
        self.lock().decode(icao, frame, timestamp)
    }

    pub fn decode_report(&self, report: &PositionReport) -> Result<PositionFix, CprError> {
        self.lock().decode_report(report)
    }

    pub fn set_reference(&self, reference: Option<GeodeticPosition>) {
        self.lock().set_reference(reference);
    }

    pub fn into_inner(self) -> CprDecoder {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ICAO: Icao = [0x40, 0x62, 0x1D];

    fn frame(enc: (u32, u32), parity: CprParity, is_surface: bool) -> CprFrame {
        CprFrame {
            enc_lat: enc.0,
            enc_lon: enc.1,
            parity,
            is_surface,
        }
    }

    /// Signed longitude difference in degrees, wrapped to [-180, 180).
    fn lon_diff(a: f64, b: f64) -> f64 {
        modulo(a - b + 180.0, 360.0) - 180.0
    }

    #[test]
    fn test_nz_and_dlat() {
        assert_eq!(nz(CprParity::Even), 60.0);
        assert_eq!(nz(CprParity::Odd), 59.0);
        assert_eq!(dlat(CprParity::Even, false), 6.0);
        assert!((dlat(CprParity::Odd, false) - 360.0 / 59.0).abs() < 1e-12);
        assert_eq!(dlat(CprParity::Even, true), 1.5);
    }

    #[test]
    fn test_nl_equator() {
        assert_eq!(nl(0.0), 59);
    }

    #[test]
    fn test_nl_poles() {
        assert_eq!(nl(87.0), 1);
        assert_eq!(nl(-87.0), 1);
        assert_eq!(nl(90.0), 1);
    }

    #[test]
    fn test_nl_known_transitions() {
        // Transition latitudes from the DO-260 NL table
        assert_eq!(nl(10.47), 59);
        assert_eq!(nl(10.48), 58);
        assert_eq!(nl(52.2572), 36);
        assert_eq!(nl(-52.2572), 36);
        assert_eq!(nl(86.53), 3);
        assert_eq!(nl(86.54), 2);
    }

    #[test]
    fn test_dlon_never_divides_by_zero() {
        assert_eq!(dlon(88.0, CprParity::Odd, false), 360.0);
        assert_eq!(dlon(88.0, CprParity::Even, true), 90.0);
    }

    #[test]
    fn test_global_decode_known_pair() {
        // Test vectors from "The 1090MHz Riddle"
        let pos = decode_global((93000, 51372), (74158, 50194), None, CprParity::Even, false)
            .expect("global decode should succeed");
        assert!((pos.lat - 52.25720).abs() < 1e-4, "lat={}", pos.lat);
        assert!((pos.lon - 3.91937).abs() < 1e-4, "lon={}", pos.lon);
    }

    #[test]
    fn test_global_decode_known_pair_odd_most_recent() {
        let pos = decode_global((93000, 51372), (74158, 50194), None, CprParity::Odd, false)
            .expect("global decode should succeed");
        assert!((pos.lat - 52.26578).abs() < 1e-4, "lat={}", pos.lat);
        assert!((pos.lon - 3.93892).abs() < 1e-4, "lon={}", pos.lon);
    }

    #[test]
    fn test_local_decode() {
        let reference = GeodeticPosition::new(52.258, 3.918, 0.0);
        let pos = decode_local(&reference, &frame((93000, 51372), CprParity::Even, false));
        assert!((pos.lat - 52.25720).abs() < 1e-4, "lat={}", pos.lat);
        assert!((pos.lon - 3.91937).abs() < 1e-4, "lon={}", pos.lon);
    }

    #[test]
    fn test_encode_known_pair() {
        let pos = decode_global((93000, 51372), (74158, 50194), None, CprParity::Even, false)
            .unwrap();
        assert_eq!(encode(&pos, CprParity::Even, false), (93000, 51372));
    }

    #[test]
    fn test_local_roundtrip() {
        let mut lat = -85.0;
        while lat <= 85.0 {
            for (k, parity) in [CprParity::Even, CprParity::Odd].into_iter().enumerate() {
                let lon = -179.9 + modulo(lat * 13.7 + k as f64 * 91.0, 359.8);
                let truth = GeodeticPosition::new(lat, lon, 0.0);
                let enc = encode(&truth, parity, false);

                // Reference a little way off the truth still resolves
                let reference = GeodeticPosition::new(lat + 0.3, lon - 0.4, 0.0);
                let pos = decode_local(&reference, &frame(enc, parity, false));
                assert!((pos.lat - lat).abs() < 1e-3, "lat {lat}: got {}", pos.lat);
                assert!(lon_diff(pos.lon, lon).abs() < 1e-3, "lon {lon}: got {}", pos.lon);
            }
            lat += 0.37;
        }
    }

    /// Even frame at `lat`, odd frame `EPS` further north and east, decoded
    /// for the odd frame, over a 0.01° latitude sweep.
    ///
    /// A straddle is only accepted near an NL transition. Encoding quantises
    /// latitude to 1/2^17 of a zone (up to ~2.3e-5°), so the decoded `rlat`
    /// of either frame can land on the other side of a transition than the
    /// raw input. That is why the check widens the interval by
    /// `QUANT_MARGIN` on each side rather than comparing `nl(lat)` with
    /// `nl(lat + EPS)`: near -27.94° the raw NL values agree but the
    /// quantised latitudes do not.
    #[test]
    fn test_global_roundtrip_airborne() {
        const EPS: f64 = 0.001;
        const QUANT_MARGIN: f64 = 1e-4;
        let mut straddles = 0;
        let mut decodes = 0;

        for i in 0..=17000 {
            let lat = -85.0 + i as f64 * 0.01;
            let lon = -180.0 + modulo(i as f64 * 7.31, 360.0);
            let even = encode(&GeodeticPosition::new(lat, lon, 0.0), CprParity::Even, false);
            let odd = encode(
                &GeodeticPosition::new(lat + EPS, lon + EPS, 0.0),
                CprParity::Odd,
                false,
            );

            match decode_global(even, odd, None, CprParity::Odd, false) {
                Ok(pos) => {
                    decodes += 1;
                    assert!((pos.lat - (lat + EPS)).abs() < 1e-3, "lat {lat}: got {}", pos.lat);
                    assert!(
                        lon_diff(pos.lon, lon + EPS).abs() < 1e-3,
                        "lon {lon}: got {}",
                        pos.lon
                    );
                    assert!(pos.lon > -180.0 && pos.lon <= 180.0);
                }
                Err(CprError::BoundaryStraddle) => {
                    straddles += 1;
                    assert_ne!(
                        nl(lat - QUANT_MARGIN),
                        nl(lat + EPS + QUANT_MARGIN),
                        "spurious straddle at lat {lat}"
                    );
                }
                Err(e) => panic!("unexpected error at lat {lat}: {e}"),
            }
        }

        assert!(decodes > 16900);
        assert!(straddles < 50);
    }

    #[test]
    fn test_global_detects_straddle() {
        // NL drops from 59 to 58 at ~10.4705°
        let even = encode(&GeodeticPosition::new(10.4700, 20.0, 0.0), CprParity::Even, false);
        let odd = encode(&GeodeticPosition::new(10.4710, 20.0, 0.0), CprParity::Odd, false);
        assert_eq!(
            decode_global(even, odd, None, CprParity::Odd, false),
            Err(CprError::BoundaryStraddle)
        );
    }

    #[test]
    fn test_global_surface_requires_reference() {
        assert_eq!(
            decode_global((1000, 2000), (1000, 2000), None, CprParity::Even, true),
            Err(CprError::NoReference)
        );
    }

    #[test]
    fn test_global_roundtrip_surface() {
        let cases = [
            // (truth, receiver)
            ((37.6189, -122.3750), (37.7, -122.4)),
            ((51.4700, -0.4543), (51.5, -0.1)),
            ((-33.9461, 151.1772), (-33.8, 151.2)),
            ((-22.8100, -43.2506), (-22.9, -43.2)),
            ((1.3644, 103.9915), (1.3, 103.8)),
        ];

        for ((lat, lon), (ref_lat, ref_lon)) in cases {
            let truth = GeodeticPosition::new(lat, lon, 0.0);
            let hint = GeodeticPosition::new(ref_lat, ref_lon, 0.0);
            let even = encode(&truth, CprParity::Even, true);
            let odd = encode(&truth, CprParity::Odd, true);

            for most_recent in [CprParity::Even, CprParity::Odd] {
                let pos = decode_global(even, odd, Some(&hint), most_recent, true)
                    .expect("surface decode should succeed");
                assert!((pos.lat - lat).abs() < 1e-3, "lat {lat}: got {}", pos.lat);
                assert!(lon_diff(pos.lon, lon).abs() < 1e-3, "lon {lon}: got {}", pos.lon);
            }
        }
    }

    #[test]
    fn test_global_surface_reference_on_segment_edge() {
        // Receiver positions rounded onto the equator and the antimeridian
        let cases = [
            ((-0.5, 33.3), (0.0, 33.0)),
            ((-45.0, 179.99), (-45.0, 180.0)),
            ((10.0, -90.2), (10.0, -90.0)),
            ((-89.0, 10.0), (-89.0, 10.0)),
        ];

        for ((lat, lon), (ref_lat, ref_lon)) in cases {
            let truth = GeodeticPosition::new(lat, lon, 0.0);
            let hint = GeodeticPosition::new(ref_lat, ref_lon, 0.0);
            let even = encode(&truth, CprParity::Even, true);
            let odd = encode(&truth, CprParity::Odd, true);

            for most_recent in [CprParity::Even, CprParity::Odd] {
                let pos = decode_global(even, odd, Some(&hint), most_recent, true).unwrap();
                assert!((pos.lat - lat).abs() < 1e-3, "lat {lat}: got {}", pos.lat);
                assert!(lon_diff(pos.lon, lon).abs() < 1e-3, "lon {lon}: got {}", pos.lon);
            }
        }
    }

    #[test]
    fn test_range_bearing() {
        let a = GeodeticPosition::new(37.0, -122.0, 0.0);

        let north = range_bearing(&a, &GeodeticPosition::new(38.0, -122.0, 0.0));
        assert!(north.bearing_deg.abs() < 1e-9);
        // One degree of latitude is ~69 statute miles
        assert!((north.range_mi - 69.0).abs() < 0.5, "range={}", north.range_mi);

        let east = range_bearing(&a, &GeodeticPosition::new(37.0, -121.0, 0.0));
        assert!((east.bearing_deg - 90.0).abs() < 1e-9);

        let sw = range_bearing(&a, &GeodeticPosition::new(36.9, -122.1, 0.0));
        assert!(sw.bearing_deg > 180.0 && sw.bearing_deg < 270.0);

        // Across the antimeridian the short way round
        let fiji = GeodeticPosition::new(-17.0, 179.5, 0.0);
        let west = range_bearing(&fiji, &GeodeticPosition::new(-17.0, -179.5, 0.0));
        assert!((west.bearing_deg - 90.0).abs() < 1e-9);
        assert!(west.range_mi < 70.0, "range={}", west.range_mi);
    }

    // -- Stateful decoder --

    fn airborne(lat: f64, lon: f64, parity: CprParity) -> CprFrame {
        frame(
            encode(&GeodeticPosition::new(lat, lon, 0.0), parity, false),
            parity,
            false,
        )
    }

    #[test]
    fn test_decoder_needs_pair() {
        let mut decoder = CprDecoder::default();
        let even = frame((93000, 51372), CprParity::Even, false);
        let odd = frame((74158, 50194), CprParity::Odd, false);

        assert_eq!(decoder.decode(ICAO, &even, 1.0), Err(CprError::NoPosition));
        let pos = decoder.decode(ICAO, &odd, 2.0).expect("pair should decode");
        assert!((pos.lat - 52.26578).abs() < 1e-4);
        assert_eq!(decoder.global_decodes(), 1);

        // Each following frame pairs with the retained complement
        let pos = decoder.decode(ICAO, &even, 3.0).unwrap();
        assert!((pos.lat - 52.25720).abs() < 1e-4);
    }

    #[test]
    fn test_decoder_evicts_stale_airborne() {
        let mut decoder = CprDecoder::default();
        let even = airborne(45.0, 10.0, CprParity::Even);
        let odd = airborne(45.01, 10.01, CprParity::Odd);

        assert_eq!(decoder.decode(ICAO, &even, 100.0), Err(CprError::NoPosition));
        assert_eq!(decoder.decode(ICAO, &odd, 110.5), Err(CprError::NoPosition));
        assert_eq!(decoder.len(), 1);
    }

    #[test]
    fn test_decoder_surface_timeout_is_longer() {
        let reference = GeodeticPosition::new(37.7, -122.4, 0.0);
        let mut decoder = CprDecoder::new(Some(reference));
        let truth = GeodeticPosition::new(37.6189, -122.375, 0.0);
        let even = frame(encode(&truth, CprParity::Even, true), CprParity::Even, true);
        let odd = frame(encode(&truth, CprParity::Odd, true), CprParity::Odd, true);

        assert_eq!(decoder.decode(ICAO, &even, 0.0), Err(CprError::NoPosition));
        let pos = decoder.decode(ICAO, &odd, 20.0).expect("within surface timeout");
        assert!((pos.lat - truth.lat).abs() < 1e-3);

        // 26s after the odd frame both are gone
        assert_eq!(decoder.decode(ICAO, &even, 46.5), Err(CprError::NoPosition));
    }

    #[test]
    fn test_decoder_rejects_late_frame_against_newer_complement() {
        let mut decoder = CprDecoder::default();
        let even = frame((93000, 51372), CprParity::Even, false);
        let odd = frame((74158, 50194), CprParity::Odd, false);

        assert_eq!(decoder.decode(ICAO, &even, 100.0), Err(CprError::NoPosition));
        assert_eq!(decoder.decode(ICAO, &odd, 50.0), Err(CprError::NoPosition));
        assert_eq!(decoder.global_decodes(), 0);

        // A fresh odd frame still pairs with the retained even one
        assert!(decoder.decode(ICAO, &odd, 101.0).is_ok());
    }

    #[test]
    fn test_decoder_pairs_out_of_order_within_timeout() {
        let mut decoder = CprDecoder::default();
        let even = frame((93000, 51372), CprParity::Even, false);
        let odd = frame((74158, 50194), CprParity::Odd, false);

        assert!(decoder.decode(ICAO, &even, 100.0).is_err());
        let pos = decoder.decode(ICAO, &odd, 95.0).expect("5 s apart pairs");
        // The even frame is the newer one
        assert!((pos.lat - 52.25720).abs() < 1e-4);
    }

    #[test]
    fn test_decoder_keeps_categories_apart() {
        let mut decoder = CprDecoder::new(Some(GeodeticPosition::new(45.0, 10.0, 0.0)));
        let even = airborne(45.0, 10.0, CprParity::Even);
        let truth = GeodeticPosition::new(45.0, 10.0, 0.0);
        let odd_sfc = frame(encode(&truth, CprParity::Odd, true), CprParity::Odd, true);

        assert_eq!(decoder.decode(ICAO, &even, 1.0), Err(CprError::NoPosition));
        assert_eq!(decoder.decode(ICAO, &odd_sfc, 2.0), Err(CprError::NoPosition));
        assert_eq!(decoder.len(), 2);
    }

    #[test]
    fn test_decoder_keeps_aircraft_apart() {
        let mut decoder = CprDecoder::default();
        let even = airborne(45.0, 10.0, CprParity::Even);
        let odd = airborne(45.01, 10.01, CprParity::Odd);

        assert!(decoder.decode([0x01, 0x02, 0x03], &even, 1.0).is_err());
        assert_eq!(
            decoder.decode([0x0A, 0x0B, 0x0C], &odd, 2.0),
            Err(CprError::NoPosition)
        );
    }

    #[test]
    fn test_decoder_surface_without_reference() {
        let mut decoder = CprDecoder::default();
        let truth = GeodeticPosition::new(37.6189, -122.375, 0.0);
        let even = frame(encode(&truth, CprParity::Even, true), CprParity::Even, true);
        let odd = frame(encode(&truth, CprParity::Odd, true), CprParity::Odd, true);

        assert!(decoder.decode(ICAO, &even, 0.0).is_err());
        assert_eq!(decoder.decode(ICAO, &odd, 1.0), Err(CprError::NoReference));
    }

    #[test]
    fn test_decoder_counts_straddles() {
        let mut decoder = CprDecoder::default();
        let even = airborne(10.4700, 20.0, CprParity::Even);
        let odd = airborne(10.4710, 20.0, CprParity::Odd);

        assert!(decoder.decode(ICAO, &even, 0.0).is_err());
        assert_eq!(decoder.decode(ICAO, &odd, 0.5), Err(CprError::BoundaryStraddle));
        assert_eq!(decoder.straddles(), 1);
    }

    #[test]
    fn test_decoder_prune() {
        let mut decoder = CprDecoder::default();
        let even = airborne(45.0, 10.0, CprParity::Even);
        assert!(decoder.decode(ICAO, &even, 0.0).is_err());

        assert_eq!(decoder.prune(5.0), 0);
        assert_eq!(decoder.prune(10.5), 1);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decode_report_fills_fix() {
        let reference = GeodeticPosition::new(52.0, 4.0, 0.0);
        let mut decoder = CprDecoder::new(Some(reference));

        let report = |enc: (u32, u32), parity, ts| PositionReport {
            icao: ICAO,
            frame: frame(enc, parity, false),
            altitude_ft: Some(38000),
            timestamp: ts,
            rssi: None,
        };

        assert!(decoder
            .decode_report(&report((93000, 51372), CprParity::Even, 1.0))
            .is_err());
        let fix = decoder
            .decode_report(&report((74158, 50194), CprParity::Odd, 2.0))
            .unwrap();

        assert_eq!(fix.icao, ICAO);
        assert_eq!(fix.source, FixSource::Cpr);
        assert!((fix.position.alt - 11582.4).abs() < 1e-6);
        let rb = fix.range_bearing.expect("reference set");
        assert!(rb.range_mi > 15.0 && rb.range_mi < 25.0, "range={}", rb.range_mi);
    }

    #[test]
    fn test_shared_decoder_across_threads() {
        use std::sync::Arc;

        let shared = Arc::new(SharedCprDecoder::default());
        let handles: Vec<_> = (0..4u8)
            .map(|n| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    let icao = [n, n, n];
                    let even = airborne(40.0 + n as f64, 5.0, CprParity::Even);
                    let odd = airborne(40.0 + n as f64, 5.0, CprParity::Odd);
                    assert!(shared.decode(icao, &even, 1.0).is_err());
                    shared.decode(icao, &odd, 2.0).expect("pair should decode")
                })
            })
            .collect();

        for (n, handle) in handles.into_iter().enumerate() {
            let pos = handle.join().unwrap();
            assert!((pos.lat - (40.0 + n as f64)).abs() < 1e-3);
        }

        let decoder = Arc::try_unwrap(shared).unwrap().into_inner();
        assert_eq!(decoder.global_decodes(), 4);
    }
}
