//! Field extraction from readsb's decoded message text
//!
//! Every field is described by an ordered list of rules. A rule names the
//! label that introduces the value and the parser applied to the text that
//! follows it; the first rule that yields a value wins.

use super::types::{
    CprFormat, CprPayload, Icao, PartialReport, Parity, Position, Speed, SpeedSource,
};

/// Callsign readsb prints when the aircraft has not identified itself
const UNKNOWN_CALLSIGN: &str = "unknown";

/// One (label, parser) extraction rule
struct Rule<T> {
    label: &'static str,
    parse: fn(&str) -> Option<T>,
}

impl<T> Rule<T> {
    const fn new(label: &'static str, parse: fn(&str) -> Option<T>) -> Self {
        Self { label, parse }
    }
}

/// Apply `rules` in order; for each rule every occurrence of its label is
/// tried before moving on.
fn first_match<T>(text: &str, rules: &[Rule<T>]) -> Option<T> {
    rules.iter().find_map(|rule| {
        text.match_indices(rule.label)
            .find_map(|(idx, _)| (rule.parse)(&text[idx + rule.label.len()..]))
    })
}

const IDENTIFIER_RULES: &[Rule<Icao>] = &[Rule::new("hex:", parse_hex_field)];

/// Only consulted for blocks that carry a downlink format line
const ADDRESS_RULES: &[Rule<Icao>] = &[Rule::new("AA:", parse_hex_field)];

const CALLSIGN_RULES: &[Rule<String>] = &[Rule::new("Ident:", parse_callsign)];

const ALTITUDE_RULES: &[Rule<i32>] = &[
    Rule::new("Baro altitude:", parse_feet),
    Rule::new("Geom altitude:", parse_feet),
    Rule::new("Altitude:", parse_feet),
];

const SPEED_RULES: &[Rule<Speed>] = &[
    Rule::new("Groundspeed:", parse_groundspeed),
    Rule::new("True Airspeed:", parse_true_airspeed),
    Rule::new("IAS:", parse_indicated_airspeed),
];

const HEADING_RULES: &[Rule<f64>] = &[
    Rule::new("Track/Heading", parse_heading),
    Rule::new("True Track", parse_heading),
    Rule::new("Heading", parse_heading),
    Rule::new("Mag heading", parse_heading),
];

const VERTICAL_RATE_RULES: &[Rule<i32>] = &[
    Rule::new("Vertical Rate:", parse_feet_per_minute),
    Rule::new("Baro rate:", parse_feet_per_minute),
    Rule::new("Airborne rate:", parse_feet_per_minute),
    Rule::new("Surface rate:", parse_feet_per_minute),
];

const CPR_TYPE_RULES: &[Rule<CprFormat>] = &[Rule::new("CPR type:", parse_cpr_format)];

const CPR_PARITY_RULES: &[Rule<Parity>] = &[Rule::new("CPR odd flag:", parse_parity)];

const CPR_LATITUDE_RULES: &[Rule<u32>] = &[Rule::new("CPR latitude:", parse_parenthesized)];

const CPR_LONGITUDE_RULES: &[Rule<u32>] = &[Rule::new("CPR longitude:", parse_parenthesized)];

const POSITION_RULES: &[Rule<Position>] = &[Rule::new("Latitude:", parse_position)];

/// Extract a report from one message block's text.
///
/// Returns `None` when no aircraft identifier can be found; every other
/// field is optional.
pub fn extract(text: &str) -> Option<PartialReport> {
    let icao = first_match(text, IDENTIFIER_RULES).or_else(|| {
        if text.contains("DF:") {
            first_match(text, ADDRESS_RULES)
        } else {
            None
        }
    })?;

    let mut report = PartialReport::new(icao);
    report.callsign = first_match(text, CALLSIGN_RULES);
    report.altitude_ft = first_match(text, ALTITUDE_RULES);
    report.speed = first_match(text, SPEED_RULES);
    report.heading_deg = first_match(text, HEADING_RULES);
    report.vertical_rate_fpm = first_match(text, VERTICAL_RATE_RULES);
    report.cpr = extract_cpr(text);
    report.position = first_match(text, POSITION_RULES);

    Some(report)
}

fn extract_cpr(text: &str) -> Option<CprPayload> {
    Some(CprPayload {
        format: first_match(text, CPR_TYPE_RULES)?,
        parity: first_match(text, CPR_PARITY_RULES)?,
        lat_encoded: first_match(text, CPR_LATITUDE_RULES)?,
        lon_encoded: first_match(text, CPR_LONGITUDE_RULES)?,
    })
}

/// Skip horizontal whitespace (a value never sits on the next line)
fn skip_blanks(s: &str) -> &str {
    s.trim_start_matches([' ', '\t'])
}

/// Split off a leading decimal number. Signs and thousands separators are
/// only accepted when asked for.
fn split_number(s: &str, signed: bool, separators: bool) -> Option<(String, &str)> {
    let mut number = String::new();
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let accepted = c.is_ascii_digit()
            || (c == '.' && !number.contains('.'))
            || (separators && c == ',' && !number.is_empty())
            || (signed && idx == 0 && (c == '+' || c == '-'));
        if !accepted {
            break;
        }
        if c != ',' {
            number.push(c);
        }
        end = idx + c.len_utf8();
    }
    if number.chars().any(|c| c.is_ascii_digit()) {
        Some((number, &s[end..]))
    } else {
        None
    }
}

/// Require `unit` after optional blanks
fn has_unit(rest: &str, unit: &str) -> bool {
    skip_blanks(rest).starts_with(unit)
}

fn parse_hex_field(s: &str) -> Option<Icao> {
    let s = skip_blanks(s);
    let s = s.strip_prefix('~').unwrap_or(s);
    s.get(..6)?.parse().ok()
}

fn parse_callsign(s: &str) -> Option<String> {
    let s = skip_blanks(s);
    let end = s
        .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit()))
        .unwrap_or(s.len());
    let token = &s[..end];
    let terminated = s[end..].chars().next().map_or(true, char::is_whitespace);

    if (2..=8).contains(&token.len())
        && terminated
        && !token.eq_ignore_ascii_case(UNKNOWN_CALLSIGN)
    {
        Some(token.to_string())
    } else {
        None
    }
}

fn parse_feet(s: &str) -> Option<i32> {
    let (number, rest) = split_number(skip_blanks(s), true, true)?;
    if !has_unit(rest, "ft") {
        return None;
    }
    number.parse::<f64>().ok().map(|ft| ft.round() as i32)
}

fn parse_knots(s: &str, source: SpeedSource) -> Option<Speed> {
    let (number, rest) = split_number(skip_blanks(s), false, false)?;
    if !has_unit(rest, "kt") {
        return None;
    }
    let knots = number.parse().ok()?;
    Some(Speed { knots, source })
}

fn parse_groundspeed(s: &str) -> Option<Speed> {
    parse_knots(s, SpeedSource::Groundspeed)
}

fn parse_true_airspeed(s: &str) -> Option<Speed> {
    parse_knots(s, SpeedSource::TrueAirspeed)
}

fn parse_indicated_airspeed(s: &str) -> Option<Speed> {
    parse_knots(s, SpeedSource::IndicatedAirspeed)
}

fn parse_heading(s: &str) -> Option<f64> {
    let s = s.strip_prefix(':').unwrap_or(s);
    let trimmed = skip_blanks(s);
    // The label must be followed by a separator, not run into another word
    if trimmed.len() == s.len() && !s.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let (number, _) = split_number(trimmed, false, false)?;
    number.parse().ok()
}

fn parse_feet_per_minute(s: &str) -> Option<i32> {
    let (number, rest) = split_number(skip_blanks(s), true, false)?;
    if !has_unit(rest, "ft/min") {
        return None;
    }
    number.parse::<f64>().ok().map(|fpm| fpm.round() as i32)
}

fn parse_cpr_format(s: &str) -> Option<CprFormat> {
    let s = skip_blanks(s);
    if s.starts_with("Airborne") {
        Some(CprFormat::Airborne)
    } else if s.starts_with("Surface") {
        Some(CprFormat::Surface)
    } else {
        None
    }
}

fn parse_parity(s: &str) -> Option<Parity> {
    let s = skip_blanks(s);
    if s.starts_with("odd") {
        Some(Parity::Odd)
    } else if s.starts_with("even") {
        Some(Parity::Even)
    } else {
        None
    }
}

/// Encoded CPR values are printed in parentheses after the decimal
/// rendering, e.g. `CPR latitude:  52.25720 (93000)`
fn parse_parenthesized(s: &str) -> Option<u32> {
    let line = s.lines().next()?;
    let open = line.find('(')?;
    let inner = &line[open + 1..];
    let close = inner.find(')')?;
    let digits = inner[..close].trim();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `Latitude: <dec> Longitude: <dec>`, possibly split across lines
fn parse_position(s: &str) -> Option<Position> {
    let (lat, rest) = split_number(skip_blanks(s), true, false)?;
    let rest = rest.trim_start().strip_prefix("Longitude:")?;
    let (lon, _) = split_number(skip_blanks(rest), true, false)?;
    Some(Position::new(lat.parse().ok()?, lon.parse().ok()?))
}
