use crate::coords::CoordinatePair;
use crate::error::ResolveError;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Where a photo's final coordinate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinateSource {
    Metadata,
    RecognitionPrimary,
    RecognitionFallback,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Metadata,
    Preprocess,
    RecognitionPrimary,
    RecognitionFallback,
}

/// A non-fatal failure met while resolving one photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, error: &ResolveError) -> Self {
        Diagnostic {
            stage,
            message: error.to_string(),
        }
    }
}

/// Everything known about one photo after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub name: String,
    pub path: PathBuf,
    /// Requested output columns in configured order.
    pub fields: IndexMap<String, Value>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub coordinate_source: CoordinateSource,
    pub matched_text: Option<String>,
    pub maps_url: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ImageRecord {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, fields: IndexMap<String, Value>) -> Self {
        ImageRecord {
            name: name.into(),
            path: path.into(),
            fields,
            latitude: None,
            longitude: None,
            coordinate_source: CoordinateSource::None,
            matched_text: None,
            maps_url: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn resolve(&mut self, pair: CoordinatePair, source: CoordinateSource) {
        self.latitude = Some(pair.lat());
        self.longitude = Some(pair.lon());
        self.maps_url = Some(pair.maps_url());
        self.coordinate_source = source;
    }

    pub fn push_diagnostic(&mut self, stage: Stage, error: &ResolveError) {
        self.diagnostics.push(Diagnostic::new(stage, error));
    }

    pub fn push_message(&mut self, stage: Stage, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            stage,
            message: message.into(),
        });
    }

    pub fn is_resolved(&self) -> bool {
        self.coordinate_source != CoordinateSource::None
    }

    /// The flat output row: name, requested fields, resolution columns,
    /// optional absolute path, diagnostics.
    pub fn to_row(&self, include_path: bool) -> IndexMap<String, Value> {
        let mut row = IndexMap::new();
        row.insert("name".to_string(), Value::from(self.name.clone()));
        for (column, value) in &self.fields {
            row.insert(column.clone(), value.clone());
        }
        row.insert("latitude".to_string(), self.latitude.map_or(Value::Null, Value::from));
        row.insert("longitude".to_string(), self.longitude.map_or(Value::Null, Value::from));
        row.insert(
            "coordinate_source".to_string(),
            serde_json::to_value(self.coordinate_source).unwrap_or(Value::Null),
        );
        row.insert(
            "matched_text".to_string(),
            self.matched_text.clone().map_or(Value::Null, Value::from),
        );
        row.insert("maps_url".to_string(), self.maps_url.clone().map_or(Value::Null, Value::from));
        if include_path {
            let absolute = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
            row.insert("photo_path".to_string(), Value::from(absolute.to_string_lossy().into_owned()));
        }
        row.insert(
            "diagnostics".to_string(),
            serde_json::to_value(&self.diagnostics).unwrap_or(Value::Null),
        );
        row
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: usize,
    pub from_metadata: usize,
    pub from_primary: usize,
    pub from_fallback: usize,
    pub unresolved: usize,
    pub remote_calls: usize,
}

impl RunStats {
    pub fn from_records(records: &[ImageRecord], remote_calls: usize) -> Self {
        let mut stats = RunStats {
            total: records.len(),
            remote_calls,
            ..Default::default()
        };
        for record in records {
            match record.coordinate_source {
                CoordinateSource::Metadata => stats.from_metadata += 1,
                CoordinateSource::RecognitionPrimary => stats.from_primary += 1,
                CoordinateSource::RecognitionFallback => stats.from_fallback += 1,
                CoordinateSource::None => stats.unresolved += 1,
            }
        }
        stats
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    generated_at: DateTime<Local>,
    input_dir: String,
    stats: &'a RunStats,
    records: Vec<IndexMap<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One report document with run statistics.
    Json,
    /// One record per line.
    JsonLines,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, ResolveError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(OutputFormat::Json),
            "jsonl" => Ok(OutputFormat::JsonLines),
            _ => Err(ResolveError::UnsupportedOutputFormat(if extension.is_empty() {
                path.display().to_string()
            } else {
                format!(".{}", extension)
            })),
        }
    }
}

/// Writes the records to `path`, picking the format from its extension.
pub fn write_output(
    path: &Path,
    input_dir: &Path,
    records: &[ImageRecord],
    stats: &RunStats,
    include_path: bool,
) -> Result<()> {
    let format = OutputFormat::from_path(path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    match format {
        OutputFormat::Json => {
            let report = RunReport {
                generated_at: Local::now(),
                input_dir: input_dir.display().to_string(),
                stats,
                records: records.iter().map(|r| r.to_row(include_path)).collect(),
            };
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writeln!(writer)?;
        }
        OutputFormat::JsonLines => {
            for record in records {
                serde_json::to_writer(&mut writer, &record.to_row(include_path))?;
                writeln!(writer)?;
            }
        }
    }
    writer.flush()?;

    info!("Saved {} record(s) to {}", records.len(), path.display());
    Ok(())
}
