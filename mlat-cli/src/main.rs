//! mlat: CPR position decoding and multilateration from the command line.
//!
//! - `decode`: run recorded hex frames through the stateful CPR decoder
//! - `solve`: multilaterate one transmission from a JSON description
//! - `selftest`: CPR round trips over a global sweep plus a synthetic MLAT fix

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use mlat_core::config::{self, Config};
use mlat_core::cpr::{self, CprDecoder};
use mlat_core::decode::decode_position;
use mlat_core::frame::parse_frame;
use mlat_core::mlat::{synthetic_replies, MlatSolver};
use mlat_core::types::*;
use mlat_core::{FixSource, PositionFix, PositionReport, StationReport};

mod capture;

#[derive(Parser)]
#[command(
    name = "mlat",
    version,
    about = "ADS-B CPR decoding and multilateration"
)]
struct Cli {
    /// Config file (defaults to ~/.adsb-mlat/config.yaml)
    #[arg(long, global = true, env = "ADSB_MLAT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode positions from a file of hex frames ("-" for stdin)
    Decode {
        file: PathBuf,

        /// Receiver latitude, overrides config
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Receiver longitude, overrides config
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Fall back to single-frame decoding against the receiver position
        #[arg(long)]
        local: bool,
    },

    /// Multilaterate one transmission described in a JSON file
    Solve { file: PathBuf },

    /// Run CPR and MLAT self-tests
    Selftest {
        /// Latitude step of the CPR sweep, degrees
        #[arg(long, default_value = "0.25")]
        step: f64,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config_from(path).unwrap_or_else(|e| fail(&e.to_string())),
        None => config::load_config(),
    };

    match cli.command {
        Commands::Decode {
            file,
            lat,
            lon,
            local,
        } => {
            let reference = match (lat, lon) {
                (Some(lat), Some(lon)) => Some(GeodeticPosition::new(lat, lon, 0.0)),
                (None, None) => config.receiver_position(),
                _ => fail("--lat and --lon must be given together"),
            };
            cmd_decode(&file, reference, local, &config);
        }
        Commands::Solve { file } => cmd_solve(&file, &config),
        Commands::Selftest { step } => cmd_selftest(step, &config),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn fail(msg: &str) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// Per-aircraft tally for the summary table.
struct AircraftSummary {
    fixes: u64,
    last: PositionFix,
    altitude_ft: Option<i32>,
}

#[derive(Default)]
struct DecodeCounts {
    frames: u64,
    rejected: u64,
    positions: u64,
    global: u64,
    local: u64,
    straddles: u64,
    no_reference: u64,
}

fn open_input(file: &Path) -> Box<dyn BufRead> {
    if file.to_str() == Some("-") {
        return Box::new(io::stdin().lock());
    }
    let f = std::fs::File::open(file).unwrap_or_else(|e| {
        fail(&format!("opening {}: {e}", file.display()));
    });
    Box::new(io::BufReader::new(f))
}

fn cmd_decode(file: &Path, reference: Option<GeodeticPosition>, local: bool, config: &Config) {
    if local && reference.is_none() {
        fail("--local needs a receiver position (--lat/--lon or config)");
    }

    let frames = capture::read_frames(open_input(file))
        .unwrap_or_else(|e| fail(&format!("reading {}: {e}", file.display())));
    info!(frames = frames.len(), path = %file.display(), "decoding");

    let mut decoder = CprDecoder::from_config(reference, &config.cpr);
    let mut aircraft: HashMap<Icao, AircraftSummary> = HashMap::new();
    let mut counts = DecodeCounts::default();

    for input in &frames {
        counts.frames += 1;
        let frame = match parse_frame(&input.hex, input.timestamp, None) {
            Ok(f) => f,
            Err(e) => {
                counts.rejected += 1;
                debug!(frame = %input.hex, error = %e, "frame rejected");
                continue;
            }
        };
        let Some(report) = decode_position(&frame) else {
            continue;
        };
        counts.positions += 1;

        let fix = match decoder.decode_report(&report) {
            Ok(fix) => {
                counts.global += 1;
                fix
            }
            Err(CprError::NoPosition) if local => match reference {
                Some(r) => {
                    counts.local += 1;
                    local_fix(&r, &report)
                }
                None => continue,
            },
            Err(CprError::NoPosition) => continue,
            Err(CprError::BoundaryStraddle) => {
                counts.straddles += 1;
                continue;
            }
            Err(CprError::NoReference) => {
                if counts.no_reference == 0 {
                    warn!("surface positions need a receiver position; set --lat/--lon");
                }
                counts.no_reference += 1;
                continue;
            }
        };

        print_fix(&fix);
        aircraft
            .entry(fix.icao)
            .and_modify(|a| {
                a.fixes += 1;
                a.last = fix.clone();
                a.altitude_ft = report.altitude_ft.or(a.altitude_ft);
            })
            .or_insert_with(|| AircraftSummary {
                fixes: 1,
                last: fix.clone(),
                altitude_ft: report.altitude_ft,
            });
    }

    info!(
        frames = counts.frames,
        rejected = counts.rejected,
        positions = counts.positions,
        global = counts.global,
        local = counts.local,
        straddles = counts.straddles,
        no_reference = counts.no_reference,
        "decode finished"
    );
    print_summary(&aircraft);
}

/// Single-frame decode against the receiver, for aircraft without a fresh pair.
fn local_fix(reference: &GeodeticPosition, report: &PositionReport) -> PositionFix {
    let mut position = cpr::decode_local(reference, &report.frame);
    position.alt = report.altitude_m().unwrap_or(0.0);
    PositionFix {
        icao: report.icao,
        timestamp: report.timestamp,
        position,
        source: FixSource::Cpr,
        range_bearing: Some(cpr::range_bearing(reference, &position)),
    }
}

fn print_fix(fix: &PositionFix) {
    let p = &fix.position;
    let mut line = format!(
        "{:.3} {} {:.5} {:.5} {:.0}",
        fix.timestamp,
        icao_to_string(&fix.icao),
        p.lat,
        p.lon,
        p.alt
    );
    if let Some(rb) = &fix.range_bearing {
        line.push_str(&format!(" {:.1}mi {:.0}deg", rb.range_mi, rb.bearing_deg));
    }
    println!("{line}");
}

fn print_summary(aircraft: &HashMap<Icao, AircraftSummary>) {
    println!();
    println!("{} aircraft with positions", aircraft.len());
    if aircraft.is_empty() {
        return;
    }
    println!();

    let mut table = Table::new();
    table.set_header(vec!["ICAO", "Fixes", "Lat", "Lon", "Alt (ft)", "Range (mi)", "Brg"]);

    let mut sorted: Vec<_> = aircraft.values().collect();
    sorted.sort_by_key(|a| std::cmp::Reverse(a.fixes));

    for ac in sorted {
        let p = &ac.last.position;
        let rb = ac.last.range_bearing.as_ref();
        table.add_row(vec![
            Cell::new(icao_to_string(&ac.last.icao)),
            Cell::new(ac.fixes),
            Cell::new(format!("{:.5}", p.lat)),
            Cell::new(format!("{:.5}", p.lon)),
            Cell::new(ac.altitude_ft.map_or("-".into(), |a| a.to_string())),
            Cell::new(rb.map_or("-".into(), |r| format!("{:.1}", r.range_mi))),
            Cell::new(rb.map_or("-".into(), |r| format!("{:.0}", r.bearing_deg))),
        ]);
    }

    println!("{table}");
}

// ---------------------------------------------------------------------------
// solve
// ---------------------------------------------------------------------------

/// One transmission heard by several stations.
#[derive(Deserialize)]
struct SolveRequest {
    /// Reported aircraft altitude, meters
    altitude: f64,
    replies: Vec<StationReport>,
}

#[derive(Serialize)]
struct SolveResponse {
    lat: f64,
    lon: f64,
    alt: f64,
    rounds: usize,
}

fn cmd_solve(file: &Path, config: &Config) {
    let text = std::fs::read_to_string(file)
        .unwrap_or_else(|e| fail(&format!("reading {}: {e}", file.display())));
    let request: SolveRequest = serde_json::from_str(&text)
        .unwrap_or_else(|e| fail(&format!("parsing {}: {e}", file.display())));

    let solver = MlatSolver::from_config(&config.mlat);
    match solver.solve_detailed(&request.replies, request.altitude) {
        Ok(solution) => {
            let p = solution.position;
            info!(rounds = solution.rounds, stations = request.replies.len(), "solved");
            let response = SolveResponse {
                lat: p.lat,
                lon: p.lon,
                alt: p.alt,
                rounds: solution.rounds,
            };
            match serde_json::to_string_pretty(&response) {
                Ok(json) => println!("{json}"),
                Err(e) => fail(&e.to_string()),
            }
        }
        Err(e) => fail(&AdsbError::from(e).to_string()),
    }
}

// ---------------------------------------------------------------------------
// selftest
// ---------------------------------------------------------------------------

const SWEEP_LONS: &[f64] = &[-179.9, -120.5, -45.25, 0.0, 33.3, 90.0, 151.7, 179.99];

/// Worst-case CPR error allowed by the self-test, degrees.
const CPR_TOLERANCE_DEG: f64 = 1e-3;

/// Worst-case MLAT error allowed by the self-test, meters.
const MLAT_TOLERANCE_M: f64 = 1.0;

#[derive(Default)]
struct SweepStats {
    decodes: u64,
    straddles: u64,
    max_err_deg: f64,
}

impl SweepStats {
    fn record(&mut self, truth: &GeodeticPosition, got: &GeodeticPosition) {
        let dlat = (truth.lat - got.lat).abs();
        let dlon = cpr::normalize_lon(truth.lon - got.lon).abs();
        self.decodes += 1;
        self.max_err_deg = self.max_err_deg.max(dlat).max(dlon);
    }
}

fn cpr_sweep(step: f64, is_surface: bool) -> SweepStats {
    let mut stats = SweepStats::default();
    let n = (170.0 / step).floor() as i64;

    for i in 0..=n {
        let lat = -85.0 + i as f64 * step;
        for &lon in SWEEP_LONS {
            let truth = GeodeticPosition::new(lat, lon, 0.0);
            let even = cpr::encode(&truth, CprParity::Even, is_surface);
            let odd = cpr::encode(&truth, CprParity::Odd, is_surface);
            let hint = GeodeticPosition::new(lat.round(), lon.round(), 0.0);

            for most_recent in [CprParity::Even, CprParity::Odd] {
                match cpr::decode_global(even, odd, Some(&hint), most_recent, is_surface) {
                    Ok(pos) => stats.record(&truth, &pos),
                    Err(CprError::BoundaryStraddle) => stats.straddles += 1,
                    Err(e) => fail(&format!("CPR sweep at ({lat}, {lon}): {e}")),
                }

                let (enc_lat, enc_lon) = if most_recent.is_odd() { odd } else { even };
                let frame = CprFrame {
                    enc_lat,
                    enc_lon,
                    parity: most_recent,
                    is_surface,
                };
                stats.record(&truth, &cpr::decode_local(&hint, &frame));
            }
        }
    }
    stats
}

fn cmd_selftest(step: f64, config: &Config) {
    if !(step > 0.0 && step <= 10.0) {
        fail("--step must be in (0, 10]");
    }
    let mut ok = true;

    for (label, is_surface) in [("airborne", false), ("surface", true)] {
        let stats = cpr_sweep(step, is_surface);
        let pass = stats.max_err_deg < CPR_TOLERANCE_DEG;
        ok &= pass;
        println!(
            "CPR {label:<8} {} decodes, {} straddles, max error {:.2e} deg  {}",
            stats.decodes,
            stats.straddles,
            stats.max_err_deg,
            if pass { "ok" } else { "FAIL" }
        );
    }

    let stations = [
        GeodeticPosition::new(37.76225, -122.44254, 100.0),
        GeodeticPosition::new(37.680016, -121.772461, 100.0),
        GeodeticPosition::new(37.385844, -122.083082, 100.0),
        GeodeticPosition::new(37.701207, -122.309418, 100.0),
    ];
    let target = GeodeticPosition::new(37.617175, -122.400843, 8000.0 * 0.3048);
    let replies = synthetic_replies(&stations, &target, 10.0);

    let solver = MlatSolver::from_config(&config.mlat);
    match solver.solve_detailed(&replies, target.alt) {
        Ok(solution) => {
            let p = solution.position;
            let err = mlat_core::wgs84::llh_to_ecef(p.lat, p.lon, p.alt).distance(
                &mlat_core::wgs84::llh_to_ecef(target.lat, target.lon, target.alt),
            );
            let pass = err < MLAT_TOLERANCE_M;
            ok &= pass;
            println!(
                "MLAT     {} stations, {} rounds, error {err:.3} m  {}",
                stations.len(),
                solution.rounds,
                if pass { "ok" } else { "FAIL" }
            );
        }
        Err(e) => {
            ok = false;
            println!("MLAT     {e}  FAIL");
        }
    }

    if !ok {
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
