//! Multilateration — locate a transmitter from arrival times at ground stations.
//!
//! A GPS-style pseudorange solve with the stations as "satellites". The
//! earliest station is the origin of a local ECEF-aligned frame, and the
//! reported barometric altitude stands in for one range equation as a
//! range from the Earth's center. The stations' clocks must already share
//! a time base; no clock offset is estimated.
//!
//! Solved by Newton-Gauss iteration in two passes. The first pass assumes
//! the aircraft is above station 0 when computing the altitude range; the
//! second recomputes it above the first-pass fix, which removes tens of
//! meters of error caused by the ellipsoid's curvature.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::config::MlatConfig;
use crate::reports::StationReport;
use crate::types::{EcefPosition, GeodeticPosition, MlatError};
use crate::wgs84::{ecef_to_llh, llh_to_ecef, llh_to_ecef_msl};

/// Propagation speed, vacuum speed of light slowed by the refractive index of air (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0 / 1.0003;

/// Stop iterating once a correction step is shorter than this (meters).
pub const DEFAULT_LIMIT_M: f64 = 20.0;

/// Maximum Newton-Gauss rounds per pass.
pub const DEFAULT_MAX_ROUNDS: usize = 100;

/// Singular values below this are treated as zero in the least-squares step.
const SVD_EPS: f64 = 1e-10;

/// Sweep cap for the SVD of one Jacobian.
const SVD_MAX_ITER: usize = 1000;

/// Result of a solve, with the number of iterations it took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlatSolution {
    /// Solved position. Altitude is height above the ellipsoid.
    pub position: GeodeticPosition,
    /// Newton-Gauss rounds over both passes.
    pub rounds: usize,
}

/// Newton-Gauss pseudorange solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlatSolver {
    /// Convergence threshold on the step length (meters).
    pub limit_m: f64,
    /// Round limit per pass.
    pub max_rounds: usize,
}

impl Default for MlatSolver {
    fn default() -> Self {
        MlatSolver {
            limit_m: DEFAULT_LIMIT_M,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl MlatSolver {
    pub fn new(limit_m: f64, max_rounds: usize) -> Self {
        MlatSolver {
            limit_m,
            max_rounds,
        }
    }

    pub fn from_config(config: &MlatConfig) -> Self {
        MlatSolver::new(config.limit_m, config.max_rounds)
    }

    /// Solve for the transmitter position.
    ///
    /// `altitude` is the aircraft's reported barometric altitude in meters.
    pub fn solve(
        &self,
        replies: &[StationReport],
        altitude: f64,
    ) -> Result<GeodeticPosition, MlatError> {
        self.solve_detailed(replies, altitude).map(|s| s.position)
    }

    pub fn solve_detailed(
        &self,
        replies: &[StationReport],
        altitude: f64,
    ) -> Result<MlatSolution, MlatError> {
        if replies.len() < 2 {
            return Err(MlatError::TooFewStations(replies.len()));
        }
        let finite = |r: &StationReport| {
            [r.position.lat, r.position.lon, r.position.alt, r.timestamp]
                .iter()
                .all(|v| v.is_finite())
        };
        if !altitude.is_finite() || !replies.iter().all(finite) {
            return Err(MlatError::NonFinite);
        }

        let mut sorted = replies.to_vec();
        sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let me_llh = sorted[0].position;
        let me = llh_to_ecef_msl(me_llh.lat, me_llh.lon, me_llh.alt);
        let t0 = sorted[0].timestamp;

        // Stations relative to station 0, then the Earth's center for the altitude range
        let mut rel_stations: Vec<EcefPosition> = sorted[1..]
            .iter()
            .map(|r| llh_to_ecef_msl(r.position.lat, r.position.lon, r.position.alt) - me)
            .collect();
        rel_stations.push(-me);

        let mut prange_obs: Vec<f64> = sorted[1..]
            .iter()
            .map(|r| SPEED_OF_LIGHT * (r.timestamp - t0))
            .collect();
        // Altitude is MSL and so is the model here: no geoid correction
        prange_obs.push(llh_to_ecef(me_llh.lat, me_llh.lon, altitude).norm());

        let guess = llh_to_ecef(me_llh.lat, me_llh.lon, altitude) - me;
        let (first, first_rounds) = self.iterate(&rel_stations, &prange_obs, guess)?;
        let first_llh = ecef_to_llh(&(first + me));
        trace!(lat = first_llh.lat, lon = first_llh.lon, "MLAT first pass");

        if let Some(alt_range) = prange_obs.last_mut() {
            *alt_range = llh_to_ecef(first_llh.lat, first_llh.lon, altitude).norm();
        }
        let (second, second_rounds) = self.iterate(&rel_stations, &prange_obs, first)?;

        Ok(MlatSolution {
            position: ecef_to_llh(&(second + me)),
            rounds: first_rounds + second_rounds,
        })
    }

    /// Newton-Gauss iteration on the pseudorange equations.
    ///
    /// Returns the converged position (relative frame) and rounds used.
    fn iterate(
        &self,
        rel_stations: &[EcefPosition],
        prange_obs: &[f64],
        mut guess: EcefPosition,
    ) -> Result<(EcefPosition, usize), MlatError> {
        let n = rel_stations.len();

        for round in 1..=self.max_rounds {
            let prange_est: Vec<f64> = rel_stations.iter().map(|s| s.distance(&guess)).collect();
            if prange_est.iter().any(|&r| r == 0.0) {
                return Err(MlatError::Singular);
            }

            let dphat = DVector::from_iterator(
                n,
                prange_obs.iter().zip(&prange_est).map(|(obs, est)| obs - est),
            );

            // Jacobian rows: unit vector from each station toward the guess
            let h = DMatrix::from_fn(n, 3, |i, j| {
                let d = guess - rel_stations[i];
                let c = match j {
                    0 => d.x,
                    1 => d.y,
                    _ => d.z,
                };
                c / prange_est[i]
            });

            let xerr = h
                .try_svd(true, true, f64::EPSILON, SVD_MAX_ITER)
                .ok_or(MlatError::Singular)?
                .solve(&dphat, SVD_EPS)
                .map_err(|_| MlatError::Singular)?;
            let step = EcefPosition::new(xerr[0], xerr[1], xerr[2]);
            if !step.norm().is_finite() {
                return Err(MlatError::Singular);
            }

            guess = guess + step;
            trace!(round, step_m = step.norm(), "MLAT iteration");

            if step.norm() < self.limit_m {
                return Ok((guess, round));
            }
        }

        debug!(rounds = self.max_rounds, "MLAT solve did not converge");
        Err(MlatError::NonConverge {
            rounds: self.max_rounds,
        })
    }
}

/// Solve with the default 20 m / 100 round limits.
pub fn mlat(replies: &[StationReport], altitude: f64) -> Result<GeodeticPosition, MlatError> {
    MlatSolver::default().solve(replies, altitude)
}

/// Arrival times at each station for a transmission from `target` at time `t0`.
///
/// `target` is HAE. The first station is given `t0` itself, so station 0
/// acts as the time reference the solver expects. Used for self-tests.
pub fn synthetic_replies(
    stations: &[GeodeticPosition],
    target: &GeodeticPosition,
    t0: f64,
) -> Vec<StationReport> {
    let target = llh_to_ecef(target.lat, target.lon, target.alt);
    stations
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let timestamp = if i == 0 {
                t0
            } else {
                t0 + llh_to_ecef_msl(s.lat, s.lon, s.alt).distance(&target) / SPEED_OF_LIGHT
            };
            StationReport::new(*s, timestamp)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
