//! Configuration file management for adsb-mlat.
//!
//! Reads/writes `~/.adsb-mlat/config.yaml` with the receiver position,
//! CPR pairing timeouts, and MLAT solver limits.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cpr::{AIRBORNE_TIMEOUT, SURFACE_TIMEOUT};
use crate::mlat::{DEFAULT_LIMIT_M, DEFAULT_MAX_ROUNDS};
use crate::types::{AdsbError, GeodeticPosition};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub cpr: CprConfig,
    pub mlat: MlatConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Antenna height, meters MSL
    pub alt: Option<f64>,
}

/// Pairing cache staleness, seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CprConfig {
    pub airborne_timeout: f64,
    pub surface_timeout: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlatConfig {
    /// Convergence threshold on the step length, meters
    pub limit_m: f64,
    pub max_rounds: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            name: "default".into(),
            lat: None,
            lon: None,
            alt: None,
        }
    }
}

impl Default for CprConfig {
    fn default() -> Self {
        CprConfig {
            airborne_timeout: AIRBORNE_TIMEOUT,
            surface_timeout: SURFACE_TIMEOUT,
        }
    }
}

impl Default for MlatConfig {
    fn default() -> Self {
        MlatConfig {
            limit_m: DEFAULT_LIMIT_M,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl Config {
    /// Receiver position for local decode and range/bearing, if lat and lon are set.
    pub fn receiver_position(&self) -> Option<GeodeticPosition> {
        let r = &self.receiver;
        Some(GeodeticPosition::new(r.lat?, r.lon?, r.alt.unwrap_or(0.0)))
    }
}

/// Get the config directory path (`~/.adsb-mlat/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".adsb-mlat")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.adsb-mlat/config.yaml`.
///
/// Returns default config if the file is missing or unreadable.
pub fn load_config() -> Config {
    let path = config_file();
    if !path.exists() {
        return Config::default();
    }
    match load_config_from(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "using default config");
            Config::default()
        }
    }
}

/// Load config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<Config, AdsbError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AdsbError::Config(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), "loaded config");
    Ok(parse_config(&text))
}

/// Save config to `~/.adsb-mlat/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, AdsbError> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), AdsbError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| AdsbError::Config(e.to_string()))?;
    }
    std::fs::write(path, serialize_config(config)).map_err(|e| AdsbError::Config(e.to_string()))
}

/// Parse simple YAML-like config text. Unknown keys are ignored.
fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut section: Option<&str> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let (key, val) = (key.trim(), val.trim());

        let is_indented = line.starts_with("  ") || line.starts_with('\t');
        if !is_indented {
            section = val.is_empty().then_some(key);
            continue;
        }

        match (section, key) {
            (Some("receiver"), "name") => {
                if let Some(v) = parse_string_value(val) {
                    config.receiver.name = v;
                }
            }
            (Some("receiver"), "lat") => config.receiver.lat = parse_float_value(val),
            (Some("receiver"), "lon") => config.receiver.lon = parse_float_value(val),
            (Some("receiver"), "alt") => config.receiver.alt = parse_float_value(val),
            (Some("cpr"), "airborne_timeout") => {
                if let Some(v) = parse_float_value(val) {
                    config.cpr.airborne_timeout = v;
                }
            }
            (Some("cpr"), "surface_timeout") => {
                if let Some(v) = parse_float_value(val) {
                    config.cpr.surface_timeout = v;
                }
            }
            (Some("mlat"), "limit_m") => {
                if let Some(v) = parse_float_value(val) {
                    config.mlat.limit_m = v;
                }
            }
            (Some("mlat"), "max_rounds") => {
                if let Ok(v) = val.parse::<usize>() {
                    config.mlat.max_rounds = v;
                }
            }
            _ => {}
        }
    }

    config
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

fn optional(val: Option<f64>) -> String {
    val.map_or_else(|| "null".to_string(), |v| v.to_string())
}

/// Serialize config to YAML-like text.
fn serialize_config(config: &Config) -> String {
    let lines = [
        "# adsb-mlat configuration".to_string(),
        String::new(),
        "receiver:".into(),
        format!("  name: \"{}\"", config.receiver.name),
        format!("  lat: {}", optional(config.receiver.lat)),
        format!("  lon: {}", optional(config.receiver.lon)),
        format!("  alt: {}", optional(config.receiver.alt)),
        String::new(),
        "cpr:".into(),
        format!("  airborne_timeout: {}", config.cpr.airborne_timeout),
        format!("  surface_timeout: {}", config.cpr.surface_timeout),
        String::new(),
        "mlat:".into(),
        format!("  limit_m: {}", config.mlat.limit_m),
        format!("  max_rounds: {}", config.mlat.max_rounds),
    ];
    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
