//! Finds a coordinate written somewhere in a block of OCR text.
//!
//! Three notations are tried in a fixed order, DMS, then DDM, then DD, and the
//! first notation whose pattern matches decides the outcome. A match that
//! converts to an out-of-range coordinate is a false positive: the block
//! yields nothing and later notations are not tried.

use crate::coords::{self, CoordinatePair, Hemisphere};
use crate::error::ParseError;
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoordinateFormat {
    Dms,
    Ddm,
    Dd,
}

/// A validated coordinate together with the text it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub pair: CoordinatePair,
    pub format: CoordinateFormat,
    /// Matched span of the normalized text.
    pub matched: String,
}

// Degree mark or plain whitespace when OCR drops the symbol.
const DEG: &str = r"(?:\s*°\s*|\s+)";
const MIN: &str = r"(?:\s*'\s*|\s+)";
const SEC: &str = r"(\d{1,2}(?:\.\d+)?)";

struct Patterns {
    dms: Regex,
    ddm: Regex,
    dd: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(Patterns::compile)
}

impl Patterns {
    fn compile() -> Self {
        // A trailing hemisphere letter must not run into digits: in
        // "09 15 S10°30'" the S belongs to the coordinate, not the time.
        let dms_axis = |hem: &str| {
            format!(
                r#"(?:\b([{hem}])\s*(\d{{1,3}}){DEG}(\d{{1,2}})(?:{MIN}{SEC}\s*"?|\s*'|\s|$)|\b(\d{{1,3}}){DEG}(\d{{1,2}}){MIN}(?:{SEC}\s*"?\s*)?([{hem}])(?:[^\d]|$))"#
            )
        };
        let ddm_axis = |hem: &str| {
            format!(
                r"(?:\b([{hem}])\s*(\d{{1,3}}){DEG}(\d{{1,2}}(?:\.\d+)?)\s*'?|\b(\d{{1,3}}){DEG}(\d{{1,2}}(?:\.\d+)?)\s*'?\s*([{hem}])(?:[^\d]|$))"
            )
        };
        let dms = format!("(?i){}.*?{}", dms_axis("NS"), dms_axis("EW"));
        let ddm = format!("(?i){}.*?{}", ddm_axis("NS"), ddm_axis("EW"));
        let dd = r"(?i)(?:^|[^\d.])(-?\d{1,3}\.\d{4,})\s*°?\s*([NS])?\s*[,\s]\s*(-?\d{1,3}\.\d{4,})\s*°?\s*([EW])?";

        Patterns {
            dms: Regex::new(&dms).expect("DMS pattern compiles"),
            ddm: Regex::new(&ddm).expect("DDM pattern compiles"),
            dd: Regex::new(dd).expect("DD pattern compiles"),
        }
    }
}

/// Raw captures for one axis before conversion.
#[derive(Debug)]
struct AxisCapture<'t> {
    degrees: &'t str,
    minutes: &'t str,
    seconds: Option<&'t str>,
    hemisphere: &'t str,
}

#[derive(Debug)]
enum FormatMatch<'t> {
    Dms {
        lat: AxisCapture<'t>,
        lon: AxisCapture<'t>,
    },
    Ddm {
        lat: AxisCapture<'t>,
        lon: AxisCapture<'t>,
    },
    Dd {
        lat: &'t str,
        lat_hemisphere: Option<&'t str>,
        lon: &'t str,
        lon_hemisphere: Option<&'t str>,
    },
}

impl FormatMatch<'_> {
    fn format(&self) -> CoordinateFormat {
        match self {
            FormatMatch::Dms { .. } => CoordinateFormat::Dms,
            FormatMatch::Ddm { .. } => CoordinateFormat::Ddm,
            FormatMatch::Dd { .. } => CoordinateFormat::Dd,
        }
    }

    fn to_decimal(&self) -> Result<(f64, f64), ParseError> {
        match self {
            FormatMatch::Dms { lat, lon } => Ok((dms_axis(lat)?, dms_axis(lon)?)),
            FormatMatch::Ddm { lat, lon } => Ok((ddm_axis(lat)?, ddm_axis(lon)?)),
            FormatMatch::Dd {
                lat,
                lat_hemisphere,
                lon,
                lon_hemisphere,
            } => Ok((
                signed_decimal(lat, *lat_hemisphere)?,
                signed_decimal(lon, *lon_hemisphere)?,
            )),
        }
    }
}

fn dms_axis(axis: &AxisCapture<'_>) -> Result<f64, ParseError> {
    let seconds = match axis.seconds {
        Some(raw) => coords::parse_component(raw)?,
        None => 0.0,
    };
    Ok(coords::dms_to_decimal(
        coords::parse_component(axis.degrees)?,
        coords::parse_component(axis.minutes)?,
        seconds,
        axis.hemisphere.parse()?,
    ))
}

fn ddm_axis(axis: &AxisCapture<'_>) -> Result<f64, ParseError> {
    Ok(coords::ddm_to_decimal(
        coords::parse_component(axis.degrees)?,
        coords::parse_component(axis.minutes)?,
        axis.hemisphere.parse()?,
    ))
}

fn signed_decimal(raw: &str, hemisphere: Option<&str>) -> Result<f64, ParseError> {
    let value = coords::parse_component(raw)?;
    match hemisphere {
        Some(letter) => {
            let hemisphere: Hemisphere = letter.parse()?;
            Ok(value.abs() * hemisphere.sign())
        }
        None => Ok(value),
    }
}

/// Group layout of one axis alternation: prefix letter form first
/// (hemisphere, degrees, minutes, seconds), then suffix form
/// (degrees, minutes, seconds, hemisphere).
fn capture_axis<'t>(caps: &Captures<'t>, first: usize, has_seconds: bool) -> Option<AxisCapture<'t>> {
    let text = |i: usize| caps.get(i).map(|m| m.as_str());
    let width = if has_seconds { 4 } else { 3 };
    let prefix = first;
    let suffix = first + width;

    if let Some(hemisphere) = text(prefix) {
        return Some(AxisCapture {
            hemisphere,
            degrees: text(prefix + 1)?,
            minutes: text(prefix + 2)?,
            seconds: if has_seconds { text(prefix + 3) } else { None },
        });
    }
    Some(AxisCapture {
        degrees: text(suffix)?,
        minutes: text(suffix + 1)?,
        seconds: if has_seconds { text(suffix + 2) } else { None },
        hemisphere: text(suffix + width - 1)?,
    })
}

fn find_match(text: &str) -> Option<(FormatMatch<'_>, &str)> {
    let patterns = patterns();

    if let Some(caps) = patterns.dms.captures(text) {
        let lat = capture_axis(&caps, 1, true)?;
        let lon = capture_axis(&caps, 9, true)?;
        return Some((FormatMatch::Dms { lat, lon }, caps.get(0)?.as_str()));
    }

    if let Some(caps) = patterns.ddm.captures(text) {
        let lat = capture_axis(&caps, 1, false)?;
        let lon = capture_axis(&caps, 7, false)?;
        return Some((FormatMatch::Ddm { lat, lon }, caps.get(0)?.as_str()));
    }

    let caps = patterns.dd.captures(text)?;
    let lat = caps.get(1)?;
    let end = caps.get(0)?.end();
    Some((
        FormatMatch::Dd {
            lat: lat.as_str(),
            lat_hemisphere: caps.get(2).map(|m| m.as_str()),
            lon: caps.get(3)?.as_str(),
            lon_hemisphere: caps.get(4).map(|m| m.as_str()),
        },
        &text[lat.start()..end],
    ))
}

/// Blanks out every run of two or more letters. Labels such as "Lat",
/// "Long" or "Kecamatan" would otherwise leave stray `n`, `s`, `e` or `w`
/// behind that read as hemispheres. Single letters, glued or not, survive.
fn strip_words(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let run = chars[i..].iter().take_while(|c| c.is_alphabetic()).count();
        match run {
            0 | 1 => {
                out.push(chars[i]);
                i += 1;
            }
            _ => {
                out.push(' ');
                i += run;
            }
        }
    }
    out
}

fn is_mark(c: char) -> bool {
    matches!(c, '°' | '\'' | '"')
}

/// Unifies OCR symbol variants and strips everything that cannot be part
/// of a coordinate.
pub fn normalize_text(text: &str) -> String {
    let unified: String = text
        .chars()
        .map(|c| match c {
            '*' | 'º' | '˚' => '°',
            '’' | '‘' | '′' | '´' | '`' | '/' => '\'',
            '”' | '“' | '″' => '"',
            c if c.is_whitespace() => ' ',
            c => c,
        })
        .collect();
    let unified = strip_words(&unified.replace("''", "\""));

    let chars: Vec<char> = unified.chars().collect();
    let mut cleaned = String::with_capacity(unified.len());
    let mut number_has_point = false;
    for (i, &c) in chars.iter().enumerate() {
        let between_digits = i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        let c = if c == ',' && between_digits && !number_has_point { '.' } else { c };

        if c == '.' {
            number_has_point = true;
        } else if !c.is_ascii_digit() {
            number_has_point = false;
        }

        let allowed = c.is_ascii_digit() || "NSEWnsew°'\".-, ".contains(c);
        cleaned.push(if allowed { c } else { ' ' });

        // 30'00"S110°: a suffix letter closing one axis, glued to the next.
        let glued_suffix = "NSEWnsew".contains(c)
            && i > 0
            && is_mark(chars[i - 1])
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if glued_suffix {
            cleaned.push(' ');
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses one text block. Returns the first coordinate found, or `None`.
pub fn parse_coordinates(text: &str) -> Option<TextMatch> {
    let cleaned = normalize_text(text);
    let (found, matched) = find_match(&cleaned)?;
    let format = found.format();

    let (lat, lon) = match found.to_decimal() {
        Ok(values) => values,
        Err(e) => {
            warn!("GPS parsing {:?} failed: {} | Raw text: '{}'", format, e, text);
            return None;
        }
    };

    match CoordinatePair::new(lat, lon) {
        Some(pair) => {
            debug!("GPS parsing {:?}: '{}' -> {}", format, matched, pair);
            Some(TextMatch {
                pair,
                format,
                matched: matched.trim().to_string(),
            })
        }
        None => {
            warn!(
                "GPS parsing {:?} out of range: lat={}, lon={} | Raw text: '{}'",
                format, lat, lon, text
            );
            None
        }
    }
}

/// Tries each block in order and stops at the first one holding a valid
/// coordinate. Returns the block index alongside the match.
pub fn parse_first<'a, I>(blocks: I) -> Option<(usize, TextMatch)>
where
    I: IntoIterator<Item = &'a str>,
{
    blocks
        .into_iter()
        .enumerate()
        .find_map(|(i, block)| parse_coordinates(block).map(|m| (i, m)))
}
