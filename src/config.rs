//! Configuration loaded from environment variables

use std::str::FromStr;

use tracing::warn;

use crate::adsb::Position;

/// How the live view is written to the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the readsb executable
    pub readsb_path: String,

    /// SDR device type passed to readsb
    pub device_type: String,

    /// Tuner gain in dB
    pub gain_db: f32,

    /// Center frequency in Hz
    pub frequency_hz: u64,

    /// Receiver latitude, if known
    pub receiver_lat: Option<f64>,

    /// Receiver longitude, if known
    pub receiver_lon: Option<f64>,

    /// readsb statistics period in seconds
    pub stats_every_secs: u32,

    /// Maximum number of aircraft rows shown
    pub max_display_rows: usize,

    /// Decode single CPR frames against the receiver position
    pub local_decoding: bool,

    /// Show the raw receiver output instead of the aircraft table
    pub debug_raw: bool,

    /// Live view format
    pub output_format: OutputFormat,

    /// Live view refresh period in milliseconds
    pub refresh_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            readsb_path: lookup("READSB_PATH").unwrap_or_else(|| "readsb".to_string()),

            device_type: lookup("DEVICE_TYPE").unwrap_or_else(|| "hackrf".to_string()),

            gain_db: parse_var(&lookup, "DEVICE_GAIN").unwrap_or(20.0),

            frequency_hz: parse_var(&lookup, "FREQUENCY_HZ").unwrap_or(1_090_000_000),

            receiver_lat: parse_var(&lookup, "RECEIVER_LAT")
                .filter(|lat: &f64| (-90.0..=90.0).contains(lat)),

            receiver_lon: parse_var(&lookup, "RECEIVER_LON")
                .filter(|lon: &f64| (-180.0..=180.0).contains(lon)),

            stats_every_secs: parse_var(&lookup, "STATS_EVERY").unwrap_or(10),

            max_display_rows: parse_var(&lookup, "MAX_DISPLAY_AIRCRAFT").unwrap_or(30),

            local_decoding: parse_flag(&lookup, "LOCAL_DECODING"),

            debug_raw: parse_flag(&lookup, "DEBUG_RAW"),

            output_format: parse_var(&lookup, "OUTPUT_FORMAT").unwrap_or(OutputFormat::Table),

            refresh_interval_ms: parse_var(&lookup, "REFRESH_INTERVAL_MS")
                .filter(|ms: &u64| *ms > 0)
                .unwrap_or(1000),
        }
    }

    /// Receiver position, when both coordinates are configured
    pub fn reference(&self) -> Option<Position> {
        Some(Position::new(self.receiver_lat?, self.receiver_lon?))
    }

    /// Command line for readsb
    pub fn receiver_args(&self) -> Vec<String> {
        let mut args = vec![
            "--device-type".to_string(),
            self.device_type.clone(),
            "--gain".to_string(),
            self.gain_db.to_string(),
            "--freq".to_string(),
            self.frequency_hz.to_string(),
        ];
        if let Some(reference) = self.reference() {
            args.extend([
                "--lat".to_string(),
                reference.lat.to_string(),
                "--lon".to_string(),
                reference.lon.to_string(),
            ]);
        }
        args.extend(["--stats-every".to_string(), self.stats_every_secs.to_string()]);
        args
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return false;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "" | "0" | "false" | "no" | "off" => false,
        _ => {
            warn!("Ignoring {}={:?}: expected a boolean", key, raw);
            false
        }
    }
}
