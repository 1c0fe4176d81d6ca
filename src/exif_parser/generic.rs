use crate::coords::{self, Hemisphere};
use exif::{Context, Exif, Field, In, Tag, Value};
use indexmap::IndexMap;
use serde_json::{json, Number};

/// Outcome of reading one GPS axis (latitude or longitude).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisReading {
    Absent,
    Corrupt,
    Decimal(f64),
}

/// Reads a GPS degrees/minutes/seconds triple and applies its reference
/// letter. A zero denominator, a short triple or a non-rational value is
/// reported as `Corrupt` rather than converted.
pub fn get_gps_coord(exif: &Exif, coord_tag: Tag, ref_tag: Tag) -> AxisReading {
    let Some(coord) = exif.get_field(coord_tag, In::PRIMARY) else {
        return AxisReading::Absent;
    };
    let hemisphere = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| ascii_value(&f.value))
        .and_then(|s| s.chars().next())
        .and_then(Hemisphere::from_letter);

    decode_gps_rationals(&coord.value, hemisphere)
}

/// Converts raw GPS rationals to decimal degrees. A missing reference
/// letter leaves the value positive.
pub fn decode_gps_rationals(value: &Value, hemisphere: Option<Hemisphere>) -> AxisReading {
    let Value::Rational(ref vec) = *value else {
        return AxisReading::Corrupt;
    };
    if vec.len() < 3 || vec.iter().take(3).any(|r| r.denom == 0) {
        return AxisReading::Corrupt;
    }

    let d = vec[0].to_f64();
    let m = vec[1].to_f64();
    let s = vec[2].to_f64();
    let hemisphere = hemisphere.unwrap_or(Hemisphere::North);
    AxisReading::Decimal(coords::dms_to_decimal(d, m, s, hemisphere))
}

/// Flattens the primary image's TIFF, Exif and GPS directories into one map
/// keyed by tag name. Later directories overwrite earlier ones, so GPS
/// values win on collision.
pub fn collect_fields(exif: &Exif) -> IndexMap<String, serde_json::Value> {
    let mut all = IndexMap::new();
    let primary: Vec<&Field> = exif.fields().filter(|f| f.ifd_num == In::PRIMARY).collect();

    for pass in [Context::Tiff, Context::Exif, Context::Interop, Context::Gps] {
        for field in primary.iter().filter(|f| f.tag.context() == pass) {
            all.insert(field.tag.to_string(), field_to_json(field));
        }
    }
    all
}

fn field_to_json(field: &Field) -> serde_json::Value {
    match &field.value {
        Value::Ascii(_) => ascii_value(&field.value)
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
        Value::Short(v) => numbers(v.iter().map(|&x| json!(x))),
        Value::Long(v) => numbers(v.iter().map(|&x| json!(x))),
        Value::SShort(v) => numbers(v.iter().map(|&x| json!(x))),
        Value::SLong(v) => numbers(v.iter().map(|&x| json!(x))),
        Value::Rational(v) => numbers(v.iter().map(|r| float(r.to_f64()))),
        Value::SRational(v) => numbers(v.iter().map(|r| float(r.to_f64()))),
        Value::Float(v) => numbers(v.iter().map(|&x| float(x as f64))),
        Value::Double(v) => numbers(v.iter().map(|&x| float(x))),
        _ => serde_json::Value::String(field.display_value().to_string()),
    }
}

/// A single value stays scalar, several become an array.
fn numbers(values: impl Iterator<Item = serde_json::Value>) -> serde_json::Value {
    let mut values: Vec<_> = values.collect();
    match values.len() {
        0 => serde_json::Value::Null,
        1 => values.remove(0),
        _ => serde_json::Value::Array(values),
    }
}

// Zero-denominator rationals come out as NaN/inf, which JSON cannot carry.
fn float(value: f64) -> serde_json::Value {
    Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn ascii_value(value: &Value) -> Option<String> {
    if let Value::Ascii(ref vec) = *value {
        let first = vec.first()?;
        let text = String::from_utf8_lossy(first);
        let text = text.trim_matches(char::from(0)).trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    None
}
