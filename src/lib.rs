//! ADS-B Monitor - live aircraft tracking from readsb's verbose output
//!
//! Runs readsb as a child process, splits its output into per-message
//! blocks, extracts aircraft fields, resolves CPR positions and keeps a
//! table of the aircraft heard in the last minute.

pub mod adsb;
pub mod aircraft_tracker;
pub mod config;
pub mod decoder;
pub mod display;
pub mod pipeline;
