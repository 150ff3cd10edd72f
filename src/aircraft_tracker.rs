//! Aircraft state tracking and aggregation
//!
//! Merges the partial reports extracted from individual message blocks into
//! one track per aircraft. A report only overwrites the fields it carries.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::adsb::{Icao, PartialReport, Position, Speed};

/// Maximum age for aircraft state before removal
pub const AIRCRAFT_TIMEOUT_SECS: i64 = 60;

/// Position update threshold for logging
const POSITION_LOG_INTERVAL_SECS: i64 = 5;

/// Aggregated aircraft state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftTrack {
    /// ICAO 24-bit address
    pub icao: Icao,
    /// Flight callsign
    pub callsign: Option<String>,
    /// Altitude in feet
    pub altitude_ft: Option<i32>,
    /// Speed with its source
    pub speed: Option<Speed>,
    /// Track or heading in degrees
    pub heading_deg: Option<f64>,
    /// Vertical rate in feet per minute
    pub vertical_rate_fpm: Option<i32>,
    /// Last known position
    pub position: Option<Position>,
    /// Last time any message for this aircraft was processed
    pub last_seen: DateTime<Utc>,
    /// Message count
    pub messages: u64,
    /// Last position log line (for rate limiting logs)
    #[serde(skip)]
    last_position_log: Option<DateTime<Utc>>,
}

impl AircraftTrack {
    pub fn new(icao: Icao, now: DateTime<Utc>) -> Self {
        Self {
            icao,
            callsign: None,
            altitude_ft: None,
            speed: None,
            heading_deg: None,
            vertical_rate_fpm: None,
            position: None,
            last_seen: now,
            messages: 0,
            last_position_log: None,
        }
    }

    /// Speed as shown to the operator, e.g. `"431 kt (TAS)"`
    pub fn speed_display(&self) -> Option<String> {
        self.speed.map(|speed| speed.to_string())
    }

    /// Merge the fields present in `report`
    fn merge(&mut self, report: &PartialReport, now: DateTime<Utc>) {
        self.last_seen = now;
        self.messages += 1;

        if let Some(ref cs) = report.callsign {
            self.callsign = Some(cs.clone());
        }
        if let Some(alt) = report.altitude_ft {
            self.altitude_ft = Some(alt);
        }
        if let Some(speed) = report.speed {
            self.speed = Some(speed);
        }
        if let Some(hdg) = report.heading_deg {
            self.heading_deg = Some(hdg);
        }
        if let Some(vr) = report.vertical_rate_fpm {
            self.vertical_rate_fpm = Some(vr);
        }
        if let Some(position) = report.position {
            self.position = Some(position);
        }
    }

    /// Check if enough time has passed to log position again
    fn should_log_position(&self, now: DateTime<Utc>) -> bool {
        self.last_position_log
            .map_or(true, |logged| now - logged >= Duration::seconds(POSITION_LOG_INTERVAL_SECS))
    }

    /// Check if aircraft state is stale
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.last_seen < now - Duration::seconds(AIRCRAFT_TIMEOUT_SECS)
    }
}

/// Aircraft tracker - manages state for all tracked aircraft
#[derive(Debug, Default)]
pub struct TrackTable {
    aircraft: HashMap<Icao, AircraftTrack>,
}

impl TrackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a report into its aircraft's track, creating the track on
    /// first sighting, and refresh `last_seen`
    pub fn upsert(&mut self, report: &PartialReport, now: DateTime<Utc>) -> &AircraftTrack {
        let icao = report.icao;
        let track = self.aircraft.entry(icao).or_insert_with(|| {
            debug!("New aircraft tracked: {}", icao);
            AircraftTrack::new(icao, now)
        });
        track.merge(report, now);
        if report.position.is_some() {
            Self::log_position(track, now);
        }
        track
    }

    /// Record a decoded position for an aircraft already being tracked
    pub fn set_position(&mut self, icao: Icao, position: Position, now: DateTime<Utc>) -> bool {
        let Some(track) = self.aircraft.get_mut(&icao) else {
            return false;
        };
        track.position = Some(position);
        Self::log_position(track, now);
        true
    }

    fn log_position(track: &mut AircraftTrack, now: DateTime<Utc>) {
        if !track.should_log_position(now) {
            return;
        }
        track.last_position_log = Some(now);
        info!(
            "Aircraft {} {} at ({}) alt={} spd={} hdg={} | msgs={}",
            track.icao,
            track.callsign.as_deref().unwrap_or("-"),
            track.position.map(|p| p.to_string()).unwrap_or_default(),
            track.altitude_ft.map(|a| a.to_string()).unwrap_or_else(|| "-".into()),
            track.speed_display().unwrap_or_else(|| "-".into()),
            track.heading_deg.map(|h| format!("{h:.0}")).unwrap_or_else(|| "-".into()),
            track.messages
        );
    }

    /// Remove every track last seen more than 60 seconds before `now`
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.aircraft.len();
        self.aircraft.retain(|_, track| !track.is_stale(now));
        let removed = before - self.aircraft.len();
        if removed > 0 {
            debug!(
                "Cleaned up {} stale aircraft, {} remaining",
                removed,
                self.aircraft.len()
            );
        }
        removed
    }

    /// Copy of all tracks, most recently seen first
    pub fn snapshot(&self) -> Vec<AircraftTrack> {
        let mut tracks: Vec<AircraftTrack> = self.aircraft.values().cloned().collect();
        tracks.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(a.icao.cmp(&b.icao)));
        tracks
    }

    /// Get summary statistics
    pub fn stats_summary(&self) -> TrackerStats {
        TrackerStats {
            total_aircraft: self.aircraft.len(),
            with_position: self.aircraft.values().filter(|a| a.position.is_some()).count(),
            with_callsign: self.aircraft.values().filter(|a| a.callsign.is_some()).count(),
            total_messages: self.aircraft.values().map(|a| a.messages).sum(),
        }
    }
}

/// Tracker statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStats {
    pub total_aircraft: usize,
    pub with_position: usize,
    pub with_callsign: usize,
    pub total_messages: u64,
}

impl fmt::Display for TrackerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Aircraft: {} total, {} with position, {} with callsign, {} msgs",
            self.total_aircraft, self.with_position, self.with_callsign, self.total_messages
        )
    }
}
