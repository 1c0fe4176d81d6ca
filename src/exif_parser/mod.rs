//! Structured location from the photo's own EXIF tags.

pub mod generic;
pub mod reader;

pub use generic::{collect_fields, decode_gps_rationals, get_gps_coord, AxisReading};
pub use reader::read_exif;

use crate::constants::{GPS_LATITUDE_FIELD, GPS_LONGITUDE_FIELD};
use crate::error::ResolveError;
use exif::{Exif, Tag};
use indexmap::IndexMap;
use std::path::Path;
use tracing::debug;

/// Output column name -> EXIF field name, in output order.
pub type TagMapping = IndexMap<String, String>;

/// What the GPS directory says about the photo's position.
#[derive(Debug, Clone, PartialEq)]
pub enum GpsReading {
    /// Neither coordinate tag exists.
    Absent,
    /// A coordinate tag exists but cannot be decoded.
    Corrupt { field: String },
    /// Only one of the two axes decoded.
    Incomplete,
    Decoded { lat: f64, lon: f64 },
}

impl GpsReading {
    /// True when any coordinate tag exists, valid or not.
    pub fn is_present(&self) -> bool {
        !matches!(self, GpsReading::Absent)
    }
}

/// The requested fields of one photo plus its GPS reading.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    /// Every requested column, `null` when the photo lacks the field.
    pub fields: IndexMap<String, serde_json::Value>,
    pub gps: GpsReading,
}

impl MetadataRecord {
    /// The record of a photo without readable metadata.
    pub fn empty(mapping: &TagMapping) -> Self {
        MetadataRecord {
            fields: mapping
                .keys()
                .map(|column| (column.clone(), serde_json::Value::Null))
                .collect(),
            gps: GpsReading::Absent,
        }
    }
}

pub fn decode_file(path: &Path, mapping: &TagMapping) -> Result<MetadataRecord, ResolveError> {
    let bytes = std::fs::read(path).map_err(|e| ResolveError::MetadataUnavailable(e.to_string()))?;
    decode_bytes(&bytes, mapping)
}

pub fn decode_bytes(bytes: &[u8], mapping: &TagMapping) -> Result<MetadataRecord, ResolveError> {
    let exif = read_exif(bytes)?;
    Ok(decode_exif(&exif, mapping))
}

/// Builds the requested fields from a parsed EXIF block. GPS coordinates
/// are reported in decimal degrees; corrupt ones are reported as `null`.
pub fn decode_exif(exif: &Exif, mapping: &TagMapping) -> MetadataRecord {
    let mut all = collect_fields(exif);

    let lat = get_gps_coord(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef);
    let lon = get_gps_coord(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef);

    for (field, reading) in [(GPS_LATITUDE_FIELD, lat), (GPS_LONGITUDE_FIELD, lon)] {
        match reading {
            AxisReading::Decimal(value) => {
                all.insert(field.to_string(), serde_json::json!(value));
            }
            AxisReading::Corrupt => {
                all.insert(field.to_string(), serde_json::Value::Null);
            }
            AxisReading::Absent => {}
        }
    }

    let gps = match (lat, lon) {
        (AxisReading::Decimal(lat), AxisReading::Decimal(lon)) => GpsReading::Decoded { lat, lon },
        (AxisReading::Absent, AxisReading::Absent) => GpsReading::Absent,
        (AxisReading::Corrupt, _) => GpsReading::Corrupt {
            field: GPS_LATITUDE_FIELD.to_string(),
        },
        (_, AxisReading::Corrupt) => GpsReading::Corrupt {
            field: GPS_LONGITUDE_FIELD.to_string(),
        },
        _ => GpsReading::Incomplete,
    };

    let fields = mapping
        .iter()
        .map(|(column, tag_name)| {
            let value = all.get(tag_name).cloned().unwrap_or_else(|| {
                debug!("Tag '{}' not found in any IFD", tag_name);
                serde_json::Value::Null
            });
            (column.clone(), value)
        })
        .collect();

    MetadataRecord { fields, gps }
}
