//! ADS-B data types

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// ICAO 24-bit aircraft address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Icao([u8; 3]);

impl FromStr for Icao {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 3];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Icao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl Serialize for Icao {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Geographic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}/{:.4}", self.lat, self.lon)
    }
}

/// CPR frame parity (format bit `i`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    /// The CPR format bit: 0 for even, 1 for odd
    pub fn bit(self) -> u8 {
        match self {
            Parity::Even => 0,
            Parity::Odd => 1,
        }
    }
}

/// CPR encoding flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CprFormat {
    Airborne,
    Surface,
}

/// Encoded CPR position carried by one message block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CprPayload {
    pub format: CprFormat,
    pub parity: Parity,
    /// 17-bit encoded latitude, valid range [0, 131072)
    pub lat_encoded: u32,
    /// 17-bit encoded longitude, valid range [0, 131072)
    pub lon_encoded: u32,
}

/// Where a speed value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedSource {
    Groundspeed,
    TrueAirspeed,
    IndicatedAirspeed,
}

/// Speed in knots with its source
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Speed {
    pub knots: f64,
    pub source: SpeedSource,
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            SpeedSource::Groundspeed => write!(f, "{} kt", self.knots),
            SpeedSource::TrueAirspeed => write!(f, "{} kt (TAS)", self.knots),
            SpeedSource::IndicatedAirspeed => write!(f, "{} kt (IAS)", self.knots),
        }
    }
}

/// Fields extracted from one message block. Anything the block did not
/// carry stays `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialReport {
    pub icao: Icao,
    pub callsign: Option<String>,
    pub altitude_ft: Option<i32>,
    pub speed: Option<Speed>,
    pub heading_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub cpr: Option<CprPayload>,
    /// Position already decoded by the receiver
    pub position: Option<Position>,
}

impl PartialReport {
    pub fn new(icao: Icao) -> Self {
        Self {
            icao,
            callsign: None,
            altitude_ft: None,
            speed: None,
            heading_deg: None,
            vertical_rate_fpm: None,
            cpr: None,
            position: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icao_normalized_uppercase() {
        let icao: Icao = "abcdef".parse().unwrap();
        assert_eq!(icao.to_string(), "ABCDEF");
        assert_eq!(icao, "ABCDEF".parse().unwrap());
    }

    #[test]
    fn test_icao_rejects_bad_hex() {
        assert!("ABCDEG".parse::<Icao>().is_err());
        assert!("ABCD".parse::<Icao>().is_err());
    }

    #[test]
    fn test_speed_display_tags_source() {
        let gs = Speed {
            knots: 450.0,
            source: SpeedSource::Groundspeed,
        };
        let tas = Speed {
            knots: 431.5,
            source: SpeedSource::TrueAirspeed,
        };
        assert_eq!(gs.to_string(), "450 kt");
        assert_eq!(tas.to_string(), "431.5 kt (TAS)");
    }
}
