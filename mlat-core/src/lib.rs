//! mlat-core: Aircraft positioning from Mode S / ADS-B.
//!
//! Two independent paths over the same report stream: CPR decoding of
//! broadcast positions, and multilateration from arrival times at several
//! ground stations. Both sit on WGS84 geodesy with a geoid model.
//!
//! No async, no I/O beyond the config file — just algorithms. `mlat-cli`
//! wraps this crate for file-driven decoding and self-tests.

pub mod config;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod frame;
pub mod mlat;
pub mod reports;
pub mod types;
pub mod wgs84;

// Re-export commonly used types at crate root
pub use cpr::{CprDecoder, SharedCprDecoder};
pub use decode::decode_position;
pub use frame::{parse_frame, ModeFrame};
pub use mlat::{mlat, MlatSolution, MlatSolver};
pub use reports::{FixSource, PositionFix, PositionReport, RangeBearing, StationReport};
pub use types::*;
