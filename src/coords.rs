//! Angular notation conversion and coordinate validation.

use crate::error::ParseError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'N' => Some(Hemisphere::North),
            'S' => Some(Hemisphere::South),
            'E' => Some(Hemisphere::East),
            'W' => Some(Hemisphere::West),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
            Hemisphere::East => 'E',
            Hemisphere::West => 'W',
        }
    }

    /// S and W flip the sign of the decimal value.
    pub fn sign(self) -> f64 {
        match self {
            Hemisphere::South | Hemisphere::West => -1.0,
            Hemisphere::North | Hemisphere::East => 1.0,
        }
    }
}

impl FromStr for Hemisphere {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().trim_matches('"').chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                Hemisphere::from_letter(c).ok_or_else(|| ParseError::InvalidHemisphere(s.to_string()))
            }
            _ => Err(ParseError::InvalidHemisphere(s.to_string())),
        }
    }
}

/// Degrees, minutes and seconds to signed decimal degrees. No range check.
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64, hemisphere: Hemisphere) -> f64 {
    (degrees + minutes / 60.0 + seconds / 3600.0) * hemisphere.sign()
}

/// Degrees and decimal minutes to signed decimal degrees. No range check.
pub fn ddm_to_decimal(degrees: f64, decimal_minutes: f64, hemisphere: Hemisphere) -> f64 {
    dms_to_decimal(degrees, decimal_minutes, 0.0, hemisphere)
}

pub fn validate_range(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Reads one captured numeric component, e.g. `"30"` or `"12.75"`.
pub fn parse_component(raw: &str) -> Result<f64, ParseError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidNumber(raw.to_string()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::InvalidNumber(raw.to_string()))
    }
}

/// A latitude/longitude pair in decimal degrees that passed `validate_range`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoordinatePair {
    lat: f64,
    lon: f64,
}

impl CoordinatePair {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        validate_range(lat, lon).then_some(CoordinatePair { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// (0, 0) is what broken cameras write when they have no fix.
    pub fn is_null_island(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }

    /// Renders as `10°30'0.00"S 110°30'0.00"E`.
    pub fn to_dms_string(&self) -> String {
        let lat_hem = if self.lat < 0.0 { Hemisphere::South } else { Hemisphere::North };
        let lon_hem = if self.lon < 0.0 { Hemisphere::West } else { Hemisphere::East };
        format!("{} {}", format_dms(self.lat.abs(), lat_hem), format_dms(self.lon.abs(), lon_hem))
    }

    pub fn maps_url(&self) -> String {
        format!("{}{},{}", crate::constants::MAPS_SEARCH_URL, self.lat, self.lon)
    }
}

impl fmt::Display for CoordinatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

fn format_dms(value: f64, hemisphere: Hemisphere) -> String {
    let degrees = value.trunc();
    let minutes_total = (value - degrees) * 60.0;
    let minutes = minutes_total.trunc();
    let seconds = (minutes_total - minutes) * 60.0;
    format!("{}°{}'{:.2}\"{}", degrees as u32, minutes as u32, seconds, hemisphere.letter())
}
