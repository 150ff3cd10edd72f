//! CPR (Compact Position Reporting) position decoding
//!
//! Global decode resolves a position from one even and one odd frame received
//! within 10 seconds of each other. Local decode resolves a single frame
//! against a known reference position near the receiver.

use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{CprFormat, Parity, Position};

/// 2^17, the number of encoded steps per zone
pub const CPR_MAX: u32 = 131_072;

const CPR_SCALE: f64 = CPR_MAX as f64;

/// Maximum spacing between an even and an odd frame for global decode
pub const MAX_PAIR_AGE_MS: i64 = 10_000;

/// Reasons a CPR payload could not be turned into a position
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CprError {
    #[error("encoded CPR value {0} outside 17-bit range")]
    OutOfRange(u32),

    #[error("even/odd frames {0} ms apart")]
    PairTooOld(i64),

    #[error("decoded latitude {0:.4} out of bounds")]
    LatitudeOutOfBounds(f64),

    #[error("latitude zone mismatch: NL(even)={even}, NL(odd)={odd}")]
    ZoneMismatch { even: u32, odd: u32 },

    #[error("decoded position too far from reference")]
    OutsideReferenceRange,

    #[error("even and odd frames use different CPR formats")]
    FormatMismatch,
}

impl CprError {
    /// Everything except a malformed encoded value is an ambiguity: the
    /// frames were fine but no trustworthy position follows from them.
    pub fn is_ambiguous(&self) -> bool {
        !matches!(self, CprError::OutOfRange(_))
    }
}

/// One encoded CPR frame as received
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CprFrame {
    pub lat_encoded: u32,
    pub lon_encoded: u32,
    pub captured_at: DateTime<Utc>,
    pub format: CprFormat,
}

impl CprFrame {
    pub fn new(
        lat_encoded: u32,
        lon_encoded: u32,
        captured_at: DateTime<Utc>,
        format: CprFormat,
    ) -> Result<Self, CprError> {
        check_range(lat_encoded)?;
        check_range(lon_encoded)?;
        Ok(Self {
            lat_encoded,
            lon_encoded,
            captured_at,
            format,
        })
    }
}

fn check_range(value: u32) -> Result<(), CprError> {
    if value < CPR_MAX {
        Ok(())
    } else {
        Err(CprError::OutOfRange(value))
    }
}

/// NL (Number of Longitude zones) function
///
/// Closed form of the ICAO NL table: 59 zones at the equator down to a single
/// zone at and beyond 87 degrees.
pub fn nl(lat: f64) -> u32 {
    if lat == 0.0 {
        return 59;
    }
    let lat = lat.abs();
    if lat >= 87.0 {
        return 1;
    }

    let a = 1.0 - (PI / 30.0).cos();
    let b = lat.to_radians().cos().powi(2);
    let t = (1.0 - a / b).clamp(-1.0, 1.0);

    ((2.0 * PI / t.acos()).floor() as u32).max(1)
}

/// Modulo that always returns a non-negative result
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Normalize a longitude to (-180, 180]
fn normalize_lon(lon: f64) -> f64 {
    let lon = modulo(lon, 360.0);
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// Local CPR decode of a single frame against a reference position
pub fn local_decode(
    frame: &CprFrame,
    parity: Parity,
    reference: Position,
) -> Result<Position, CprError> {
    check_range(frame.lat_encoded)?;
    check_range(frame.lon_encoded)?;

    let i = parity.bit() as f64;
    let yz = frame.lat_encoded as f64 / CPR_SCALE;
    let xz = frame.lon_encoded as f64 / CPR_SCALE;

    let dlat = 360.0 / (60.0 - i);
    let j = (reference.lat / dlat).floor()
        + (0.5 + modulo(reference.lat, dlat) / dlat - yz).floor();
    let rlat = dlat * (j + yz);

    if !(-90.0..=90.0).contains(&rlat) {
        return Err(CprError::LatitudeOutOfBounds(rlat));
    }
    if (rlat - reference.lat).abs() > dlat / 2.0 - dlat / 262_144.0 {
        return Err(CprError::OutsideReferenceRange);
    }

    let nli = (nl(rlat) as f64 - i).max(1.0);
    let dlon = 360.0 / nli;

    let ref_lon = modulo(reference.lon, 360.0);
    let m = (ref_lon / dlon).floor() + (0.5 + modulo(ref_lon, dlon) / dlon - xz).floor();
    let rlon = normalize_lon(dlon * (m + xz));

    let mut diff = (rlon - normalize_lon(ref_lon)).abs();
    if diff > 180.0 {
        diff = 360.0 - diff;
    }
    if diff > dlon / 2.0 - dlon / 262_144.0 {
        return Err(CprError::OutsideReferenceRange);
    }

    Ok(Position::new(rlat, rlon))
}

/// Global CPR decode from an even/odd frame pair
///
/// The result is resolved for whichever frame was captured last; on a tie
/// the even frame wins.
pub fn global_decode(even: &CprFrame, odd: &CprFrame) -> Result<Position, CprError> {
    for value in [even.lat_encoded, even.lon_encoded, odd.lat_encoded, odd.lon_encoded] {
        check_range(value)?;
    }
    if even.format != odd.format {
        return Err(CprError::FormatMismatch);
    }

    let spacing = (even.captured_at - odd.captured_at).num_milliseconds().abs();
    if spacing > MAX_PAIR_AGE_MS {
        return Err(CprError::PairTooOld(spacing));
    }

    let scale = CPR_MAX as i64;
    let (even_lat, even_lon) = (even.lat_encoded as i64, even.lon_encoded as i64);
    let (odd_lat, odd_lon) = (odd.lat_encoded as i64, odd.lon_encoded as i64);

    let dlat_even = 360.0 / 60.0;
    let dlat_odd = 360.0 / 59.0;

    // Latitude zone index
    let j = (59 * even_lat - 60 * odd_lat + scale / 2).div_euclid(scale);

    let mut rlat_even = dlat_even * (j.rem_euclid(60) as f64 + even_lat as f64 / CPR_SCALE);
    let mut rlat_odd = dlat_odd * (j.rem_euclid(59) as f64 + odd_lat as f64 / CPR_SCALE);

    // Southern hemisphere
    if rlat_even >= 270.0 {
        rlat_even -= 360.0;
    }
    if rlat_odd >= 270.0 {
        rlat_odd -= 360.0;
    }

    let (rlat, i, xz) = if even.captured_at >= odd.captured_at {
        (rlat_even, 0u32, even_lon)
    } else {
        (rlat_odd, 1u32, odd_lon)
    };

    if !(-90.0..=90.0).contains(&rlat) {
        return Err(CprError::LatitudeOutOfBounds(rlat));
    }

    let nl_even = nl(rlat_even);
    let nl_odd = nl(rlat_odd);
    if nl_even != nl_odd {
        return Err(CprError::ZoneMismatch {
            even: nl_even,
            odd: nl_odd,
        });
    }

    let zones = nl_even as i64;
    let rlon = if zones == 1 {
        360.0 * xz as f64 / CPR_SCALE
    } else {
        let nli = (zones - i as i64).max(1);
        let dlon = 360.0 / nli as f64;
        let m = ((zones - 1) * even_lon - zones * odd_lon + scale / 2).div_euclid(scale);
        dlon * (m.rem_euclid(nli) as f64 + xz as f64 / CPR_SCALE)
    };

    Ok(Position::new(rlat, normalize_lon(rlon)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// NL transition latitudes from the ICAO lookup table: latitudes below
    /// entry `k` have `59 - k` zones.
    const NL_TABLE: [f64; 58] = [
        10.47047130, 14.82817437, 18.18626357, 21.02939493, 23.54504487, 25.82924707,
        27.93898710, 29.91135686, 31.77209708, 33.53993436, 35.22899598, 36.85025108,
        38.41241892, 39.92256684, 41.38651832, 42.80914012, 44.19454951, 45.54626723,
        46.86733252, 48.16039128, 49.42776439, 50.67150166, 51.89342469, 53.09516153,
        54.27817472, 55.44378444, 56.59318756, 57.72747354, 58.84763776, 59.95459277,
        61.04917774, 62.13216659, 63.20427479, 64.26616523, 65.31845310, 66.36171008,
        67.39646774, 68.42322022, 69.44242631, 70.45451075, 71.45986473, 72.45884545,
        73.45177442, 74.43893416, 75.42056257, 76.39684391, 77.36789461, 78.33374083,
        79.29428225, 80.24923213, 81.19801349, 82.13956981, 83.07199445, 83.99173563,
        84.89166191, 85.75541621, 86.53536998, 87.00000000,
    ];

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn frame(lat: u32, lon: u32, secs: i64) -> CprFrame {
        CprFrame::new(lat, lon, at(secs), CprFormat::Airborne).unwrap()
    }

    /// ICAO airborne CPR encoding, used to build round-trip fixtures
    fn encode(lat: f64, lon: f64, parity: Parity) -> (u32, u32) {
        let i = parity.bit() as f64;
        let dlat = 360.0 / (60.0 - i);
        let yz = (CPR_SCALE * modulo(lat, dlat) / dlat + 0.5).floor();
        let rlat = dlat * (yz / CPR_SCALE + (lat / dlat).floor());
        let dlon = 360.0 / (nl(rlat) as f64 - i).max(1.0);
        let xz = (CPR_SCALE * modulo(lon, dlon) / dlon + 0.5).floor();
        (yz as u32 % CPR_MAX, xz as u32 % CPR_MAX)
    }

    #[test]
    fn test_nl_fixed_points() {
        assert_eq!(nl(0.0), 59);
        assert_eq!(nl(87.0), 1);
        assert_eq!(nl(87.1), 1);
        assert_eq!(nl(-87.1), 1);
        assert_eq!(nl(90.0), 1);
        assert_eq!(nl(45.0), 42);
        assert_eq!(nl(52.2572), 36);
    }

    #[test]
    fn test_nl_matches_icao_table() {
        let mut lower = 0.0;
        for (k, upper) in NL_TABLE.iter().enumerate() {
            let mid = (lower + upper) / 2.0;
            assert_eq!(nl(mid), 59 - k as u32, "NL({mid})");
            assert_eq!(nl(-mid), 59 - k as u32, "NL(-{mid})");
            lower = *upper;
        }
    }

    #[test]
    fn test_nl_non_increasing() {
        let mut previous = nl(0.0);
        let mut lat = 0.0;
        while lat <= 90.0 {
            let current = nl(lat);
            assert!(current <= previous, "NL increased at {lat}");
            previous = current;
            lat += 0.01;
        }
    }

    #[test]
    fn test_frame_rejects_out_of_range() {
        let err = CprFrame::new(CPR_MAX, 0, at(0), CprFormat::Airborne).unwrap_err();
        assert_eq!(err, CprError::OutOfRange(CPR_MAX));
        assert!(!err.is_ambiguous());
        assert!(CprFrame::new(0, CPR_MAX - 1, at(0), CprFormat::Airborne).is_ok());
    }

    #[test]
    fn test_global_decode_zone_mismatch() {
        // Both latitudes sit either side of the 10.47 degree NL boundary
        let even = frame(97430, 107406, 0);
        let odd = frame(94051, 103765, 1);
        let expected = CprError::ZoneMismatch { even: 59, odd: 58 };
        assert_eq!(global_decode(&even, &odd), Err(expected));

        let even = frame(97430, 107406, 1);
        let odd = frame(94051, 103765, 0);
        let err = global_decode(&even, &odd).unwrap_err();
        assert_eq!(err, expected);
        assert!(err.is_ambiguous());
    }

    #[test]
    fn test_global_decode_latitude_out_of_bounds() {
        // Zone index 43 from an even latitude of zero lands at 258 degrees,
        // short of the southern wrap
        let even = frame(0, 0, 1);
        let odd = frame(36864, 0, 0);
        let err = global_decode(&even, &odd).unwrap_err();
        assert_eq!(err, CprError::LatitudeOutOfBounds(258.0));
        assert!(err.is_ambiguous());
    }

    #[test]
    fn test_global_decode_icao_example_even_latest() {
        // The 1090MHz Riddle worked example
        let even = frame(93000, 51372, 1);
        let odd = frame(74158, 50194, 0);
        let pos = global_decode(&even, &odd).unwrap();
        assert!((pos.lat - 52.25720).abs() < 1e-4, "lat {}", pos.lat);
        assert!((pos.lon - 3.91937).abs() < 1e-4, "lon {}", pos.lon);
    }

    #[test]
    fn test_global_decode_icao_example_odd_latest() {
        let even = frame(93000, 51372, 0);
        let odd = frame(74158, 50194, 1);
        let pos = global_decode(&even, &odd).unwrap();
        assert!((pos.lat - 52.26578).abs() < 1e-4, "lat {}", pos.lat);
        assert!((pos.lon - 3.93891).abs() < 1e-4, "lon {}", pos.lon);
        assert!((pos.lat - 52.25).abs() < 0.02 && (pos.lon - 3.92).abs() < 0.02);
    }

    #[test]
    fn test_global_decode_pair_too_old() {
        let even = frame(93000, 51372, 0);
        let odd = frame(74158, 50194, 15);
        assert_eq!(
            global_decode(&even, &odd),
            Err(CprError::PairTooOld(15_000))
        );
    }

    #[test]
    fn test_global_decode_exactly_ten_seconds_allowed() {
        let even = frame(93000, 51372, 0);
        let odd = frame(74158, 50194, 10);
        assert!(global_decode(&even, &odd).is_ok());
    }

    #[test]
    fn test_global_decode_format_mismatch() {
        let even = frame(93000, 51372, 0);
        let odd = CprFrame::new(74158, 50194, at(1), CprFormat::Surface).unwrap();
        assert_eq!(global_decode(&even, &odd), Err(CprError::FormatMismatch));
    }

    #[test]
    fn test_global_decode_southern_hemisphere() {
        let (elat, elon) = encode(-33.9425, 151.1825, Parity::Even);
        let (olat, olon) = encode(-33.9425, 151.1825, Parity::Odd);
        let pos = global_decode(&frame(elat, elon, 0), &frame(olat, olon, 1)).unwrap();
        assert!((pos.lat + 33.9425).abs() < 1e-3, "lat {}", pos.lat);
        assert!((pos.lon - 151.1825).abs() < 1e-3, "lon {}", pos.lon);
    }

    #[test]
    fn test_global_decode_results_in_bounds() {
        for lat_step in 0..36 {
            for lon_step in 0..24 {
                let lat = -85.0 + lat_step as f64 * 4.9;
                let lon = -179.5 + lon_step as f64 * 15.0;
                let (elat, elon) = encode(lat, lon, Parity::Even);
                let (olat, olon) = encode(lat, lon, Parity::Odd);
                if let Ok(pos) = global_decode(&frame(elat, elon, 0), &frame(olat, olon, 2)) {
                    assert!((-90.0..=90.0).contains(&pos.lat), "lat {}", pos.lat);
                    assert!(pos.lon > -180.0 && pos.lon <= 180.0, "lon {}", pos.lon);
                }
            }
        }
    }

    #[test]
    fn test_local_decode_round_trip() {
        let cases = [
            (52.2572, 3.9194),
            (34.0522, -118.2437),
            (-23.5505, -46.6333),
            (1.3521, 103.8198),
            (47.4502, -122.3088),
        ];
        for (lat, lon) in cases {
            for parity in [Parity::Even, Parity::Odd] {
                let (yz, xz) = encode(lat, lon, parity);
                let reference = Position::new(lat + 0.8, lon - 0.6);
                let pos = local_decode(&frame(yz, xz, 0), parity, reference).unwrap();
                assert!((pos.lat - lat).abs() < 1e-4, "{parity:?} lat {} vs {lat}", pos.lat);
                assert!((pos.lon - lon).abs() < 1e-4, "{parity:?} lon {} vs {lon}", pos.lon);
            }
        }
    }

    #[test]
    fn test_local_decode_icao_example() {
        let reference = Position::new(52.258, 3.918);
        let pos = local_decode(&frame(93000, 51372, 0), Parity::Even, reference).unwrap();
        assert!((pos.lat - 52.25720).abs() < 1e-4);
        assert!((pos.lon - 3.91937).abs() < 1e-4);
    }

    #[test]
    fn test_local_decode_rejects_distant_reference() {
        // Reference almost half a latitude zone away from the true position
        let (yz, xz) = encode(52.2572, 3.9194, Parity::Even);
        let reference = Position::new(52.2572 + 2.99999, 3.9194);
        assert_eq!(
            local_decode(&frame(yz, xz, 0), Parity::Even, reference),
            Err(CprError::OutsideReferenceRange)
        );
    }

    #[test]
    fn test_local_decode_across_antimeridian() {
        let (yz, xz) = encode(-17.7, 179.9, Parity::Odd);
        let reference = Position::new(-17.5, -179.8);
        let pos = local_decode(&frame(yz, xz, 0), Parity::Odd, reference).unwrap();
        assert!((pos.lat + 17.7).abs() < 1e-4);
        assert!((pos.lon - 179.9).abs() < 1e-4, "lon {}", pos.lon);
    }
}
