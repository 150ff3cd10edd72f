//! Terminal rendering of the live aircraft view

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use crate::aircraft_tracker::{AircraftTrack, AIRCRAFT_TIMEOUT_SECS};

const RULE_WIDTH: usize = 125;

/// Raw lines shown in debug mode
pub const RAW_DISPLAY_LINES: usize = 50;

const MISSING: &str = "N/A";

/// Status banner printed above either view
pub fn render_header(now: DateTime<Utc>, debug_raw: bool, has_received_data: bool) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "         AIRCRAFT DATA - ADS-B");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "Last Update: {}",
        now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(
        out,
        "Mode: {}",
        if debug_raw { "RAW DATA (DEBUG)" } else { "DECODED DATA" }
    );
    let _ = writeln!(
        out,
        "Monitoring status: {}",
        if has_received_data {
            "data is being received"
        } else {
            "waiting for first message... (Check device and antenna)"
        }
    );
    out
}

/// Aircraft table, `rows` already ordered and truncated
pub fn render_table(rows: &[AircraftTrack], total: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Aircraft tracks seen (Last {} seconds): {} (Displaying top {})",
        AIRCRAFT_TIMEOUT_SECS,
        total,
        rows.len()
    );
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));

    if rows.is_empty() {
        let _ = writeln!(out, "No aircraft tracks currently active.");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<10} {:<12} {:<12} {:<12} {:<10} {:<10} {:<25} {:<10}",
        "ICAO Hex", "Callsign", "Altitude", "Speed", "Heading", "V-Rate", "Lat/Lon", "Last Seen"
    );
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    for track in rows {
        let _ = writeln!(out, "{}", render_row(track));
    }
    out
}

fn render_row(track: &AircraftTrack) -> String {
    format!(
        "{:<10} {:<12} {:<12} {:<12} {:<10} {:<10} {:<25} {:<10}",
        track.icao.to_string(),
        track.callsign.as_deref().unwrap_or(MISSING),
        or_missing(track.altitude_ft.map(|alt| format!("{alt} ft"))),
        or_missing(track.speed_display()),
        or_missing(track.heading_deg.map(|hdg| hdg.to_string())),
        or_missing(track.vertical_rate_fpm.map(format_vertical_rate)),
        or_missing(track.position.map(|pos| pos.to_string())),
        track.last_seen.with_timezone(&Local).format("%H:%M:%S").to_string(),
    )
}

fn format_vertical_rate(rate: i32) -> String {
    if rate == 0 {
        "0".to_string()
    } else {
        format!("{rate:+} ft/m")
    }
}

fn or_missing(value: Option<String>) -> String {
    value.unwrap_or_else(|| MISSING.to_string())
}

/// The last raw receiver lines, for debug mode
pub fn render_raw(lines: &[String]) -> String {
    let mut out = format!("--- RAW READSB OUTPUT (Last {RAW_DISPLAY_LINES} lines) ---\n");
    if lines.is_empty() {
        out.push_str("No raw data buffer available yet.\n");
        return out;
    }
    let skip = lines.len().saturating_sub(RAW_DISPLAY_LINES);
    for line in &lines[skip..] {
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adsb::{PartialReport, Position, Speed, SpeedSource};
    use crate::aircraft_tracker::TrackTable;
    use chrono::TimeZone;

    fn track() -> AircraftTrack {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut report = PartialReport::new("4840D6".parse().unwrap());
        report.callsign = Some("KLM1023".into());
        report.altitude_ft = Some(36000);
        report.speed = Some(Speed {
            knots: 431.0,
            source: SpeedSource::TrueAirspeed,
        });
        report.vertical_rate_fpm = Some(-832);
        report.position = Some(Position::new(52.257202, 3.919373));
        let mut table = TrackTable::new();
        table.upsert(&report, now).clone()
    }

    #[test]
    fn test_row_formatting() {
        let track = track();
        let row = render_row(&track);
        assert!(row.starts_with("4840D6     KLM1023      36000 ft     431 kt (TAS) N/A"));
        assert!(row.contains("-832 ft/m"));
        assert!(row.contains("52.2572/3.9194"));
        let last_seen = track.last_seen.with_timezone(&Local).format("%H:%M:%S").to_string();
        assert!(row.contains(&last_seen));
    }

    #[test]
    fn test_vertical_rate_sign() {
        assert_eq!(format_vertical_rate(1088), "+1088 ft/m");
        assert_eq!(format_vertical_rate(-64), "-64 ft/m");
        assert_eq!(format_vertical_rate(0), "0");
    }

    #[test]
    fn test_empty_table() {
        let out = render_table(&[], 0);
        assert!(out.contains("Aircraft tracks seen (Last 60 seconds): 0 (Displaying top 0)"));
        assert!(out.contains("No aircraft tracks currently active."));
    }

    #[test]
    fn test_table_counts() {
        let out = render_table(&[track()], 7);
        assert!(out.contains(": 7 (Displaying top 1)"));
        assert!(out.contains("ICAO Hex"));
    }

    #[test]
    fn test_raw_shows_last_lines() {
        let lines: Vec<String> = (0..60).map(|n| format!("line {n}")).collect();
        let out = render_raw(&lines);
        assert!(!out.contains("line 9\n"));
        assert!(out.contains("line 10\n"));
        assert!(out.ends_with("line 59\n"));
        assert!(render_raw(&[]).contains("No raw data buffer available yet."));
    }
}
