//! Reading recorded hex frames.
//!
//! Accepted line forms:
//! - `<hex>`                 plain hex, one frame per line
//! - `*<hex>;`               dump1090 `--raw` output
//! - `<timestamp> <hex>`     either hex form, preceded by seconds
//!
//! Lines without a timestamp are spaced `FRAME_SPACING` after the previous
//! frame, so CPR pairing still sees a plausible clock.

use std::io::{self, BufRead};

/// Assumed gap between untimestamped frames, seconds.
pub const FRAME_SPACING: f64 = 0.1;

/// One hex frame from an input file.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFrame {
    pub timestamp: f64,
    /// Uppercase hex, 14 or 28 digits
    pub hex: String,
}

/// Read every frame from `reader`, skipping blank, comment, and malformed lines.
pub fn read_frames<R: BufRead>(reader: R) -> io::Result<Vec<InputFrame>> {
    let mut frames = Vec::new();
    let mut next_ts = 0.0;

    for line in reader.lines() {
        if let Some(frame) = parse_line(&line?, next_ts) {
            next_ts = frame.timestamp + FRAME_SPACING;
            frames.push(frame);
        }
    }
    Ok(frames)
}

/// Parse one input line. `default_ts` is used when the line has no timestamp.
pub fn parse_line(line: &str, default_ts: f64) -> Option<InputFrame> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (timestamp, hex_part) = match line.split_once(char::is_whitespace) {
        Some((ts, rest)) => (ts.parse::<f64>().ok()?, rest.trim()),
        None => (default_ts, line),
    };
    if !timestamp.is_finite() {
        return None;
    }

    clean_hex(hex_part).map(|hex| InputFrame { timestamp, hex })
}

/// Extract a Mode S hex string, handling the dump1090 `*hex;` wrapper.
pub fn clean_hex(s: &str) -> Option<String> {
    let s = s.trim();
    let inner = s
        .strip_prefix('*')
        .and_then(|r| r.strip_suffix(';'))
        .unwrap_or(s);
    is_valid_hex(inner).then(|| inner.to_ascii_uppercase())
}

fn is_valid_hex(s: &str) -> bool {
    (s.len() == 14 || s.len() == 28) && s.chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
