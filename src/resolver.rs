//! Per-photo coordinate resolution: metadata first, then text recognition
//! with a primary engine and an optional paid fallback.

use crate::budget::RecognitionBudget;
use crate::constants::{GPS_LATITUDE_FIELD, GPS_LONGITUDE_FIELD};
use crate::coords::CoordinatePair;
use crate::error::ResolveError;
use crate::exif_parser::{self, GpsReading, MetadataRecord, TagMapping};
use crate::preprocess::Preprocessor;
use crate::recognition::{recognize_candidates, EngineKind, TextRecognizer};
use crate::records::{CoordinateSource, ImageRecord, Stage};
use crate::text_parser::{parse_first, TextMatch};
use indexmap::IndexMap;
use serde_json::Value;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which tiers run and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Metadata only; recognition never runs.
    pub ocr_disabled: bool,
    /// Do not recognize when a GPS tag exists but is unusable.
    pub skip_ocr_on_invalid: bool,
    /// Retry with the remote engine when a local primary finds nothing.
    pub remote_fallback: bool,
    pub primary: EngineKind,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        ResolverPolicy {
            ocr_disabled: false,
            skip_ocr_on_invalid: false,
            remote_fallback: false,
            primary: EngineKind::Local,
        }
    }
}

/// Verdict on the metadata GPS reading.
#[derive(Debug, Clone, PartialEq)]
enum MetadataVerdict {
    Valid(CoordinatePair),
    Missing,
    /// Tags exist but cannot be used.
    Invalid(ResolveError),
}

fn assess(gps: &GpsReading) -> MetadataVerdict {
    match *gps {
        GpsReading::Absent => MetadataVerdict::Missing,
        GpsReading::Corrupt { ref field } => {
            MetadataVerdict::Invalid(ResolveError::CorruptCoordinateEncoding { field: field.clone() })
        }
        GpsReading::Incomplete => MetadataVerdict::Invalid(ResolveError::InvalidMetadataCoordinate(
            "only one axis present".to_string(),
        )),
        GpsReading::Decoded { lat, lon } => match CoordinatePair::new(lat, lon) {
            Some(pair) if pair.is_null_island() => {
                MetadataVerdict::Invalid(ResolveError::InvalidMetadataCoordinate("(0, 0)".to_string()))
            }
            Some(pair) => MetadataVerdict::Valid(pair),
            None => MetadataVerdict::Invalid(ResolveError::InvalidMetadataCoordinate(format!(
                "({}, {}) out of range",
                lat, lon
            ))),
        },
    }
}

/// The raw block that matched plus the parse result.
struct Recognized {
    block: String,
    found: TextMatch,
}

pub struct Resolver {
    mapping: TagMapping,
    policy: ResolverPolicy,
    budget: Arc<RecognitionBudget>,
    local: Option<Arc<dyn TextRecognizer>>,
    remote: Option<Arc<dyn TextRecognizer>>,
    preprocessor: Option<Arc<dyn Preprocessor>>,
}

impl Resolver {
    pub fn new(mapping: TagMapping, policy: ResolverPolicy, budget: Arc<RecognitionBudget>) -> Self {
        Resolver {
            mapping,
            policy,
            budget,
            local: None,
            remote: None,
            preprocessor: None,
        }
    }

    pub fn with_local(mut self, engine: Arc<dyn TextRecognizer>) -> Self {
        self.local = Some(engine);
        self
    }

    pub fn with_remote(mut self, engine: Arc<dyn TextRecognizer>) -> Self {
        self.remote = Some(engine);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    pub fn budget(&self) -> &RecognitionBudget {
        &self.budget
    }

    /// Resolves one photo on disk. Never fails: every problem ends up in
    /// the record's diagnostics.
    pub fn resolve(&self, path: &Path) -> ImageRecord {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                let mut record = ImageRecord::new(name, path, MetadataRecord::empty(&self.mapping).fields);
                record.push_diagnostic(Stage::Metadata, &ResolveError::MetadataUnavailable(e.to_string()));
                return record;
            }
        };

        let (metadata, failure) = match exif_parser::decode_bytes(&bytes, &self.mapping) {
            Ok(metadata) => (metadata, None),
            Err(e) => {
                debug!("No EXIF in {}: {}", name, e);
                (MetadataRecord::empty(&self.mapping), Some(e))
            }
        };

        let mut record = ImageRecord::new(name, path, IndexMap::new());
        if let Some(e) = failure {
            record.push_diagnostic(Stage::Metadata, &e);
        }
        self.resolve_decoded(record, &bytes, metadata)
    }

    /// Runs the tiers for a photo whose metadata is already decoded.
    pub fn resolve_decoded(&self, mut record: ImageRecord, image: &[u8], metadata: MetadataRecord) -> ImageRecord {
        record.fields = metadata.fields;

        let invalid = match assess(&metadata.gps) {
            MetadataVerdict::Valid(pair) => {
                record.resolve(pair, CoordinateSource::Metadata);
                info!("{}: GPS from EXIF {}", record.name, pair);
                return record;
            }
            MetadataVerdict::Missing => false,
            MetadataVerdict::Invalid(e) => {
                record.push_diagnostic(Stage::Metadata, &e);
                true
            }
        };

        if self.policy.ocr_disabled {
            debug!("{}: no valid EXIF GPS and OCR is disabled", record.name);
            return record;
        }
        if invalid && self.policy.skip_ocr_on_invalid {
            warn!(
                "Found invalid/corrupt EXIF GPS for {}. Skipping OCR fallback as configured.",
                record.name
            );
            return record;
        }

        // A spent budget on a remote primary means no engine will see the image.
        let prepared = if self.policy.primary.is_budget_limited() && self.budget.is_exhausted() {
            Cow::Borrowed(image)
        } else {
            self.prepare(&mut record, image)
        };
        info!(
            "No valid EXIF GPS for {}. Attempting OCR with {}.",
            record.name, self.policy.primary
        );

        if let Some(hit) = self.attempt(&mut record, self.policy.primary, Stage::RecognitionPrimary, &prepared) {
            self.accept(&mut record, hit, CoordinateSource::RecognitionPrimary);
            return record;
        }

        if self.policy.remote_fallback && self.policy.primary == EngineKind::Local {
            info!("{} failed for {}. Trying remote fallback...", self.policy.primary, record.name);
            if let Some(hit) = self.attempt(&mut record, EngineKind::Remote, Stage::RecognitionFallback, &prepared) {
                self.accept(&mut record, hit, CoordinateSource::RecognitionFallback);
                return record;
            }
        }

        warn!("All OCR attempts failed for {}.", record.name);
        record
    }

    fn prepare<'a>(&self, record: &mut ImageRecord, image: &'a [u8]) -> Cow<'a, [u8]> {
        let Some(preprocessor) = &self.preprocessor else {
            return Cow::Borrowed(image);
        };
        match preprocessor.prepare(&record.name, image) {
            Ok(Some(prepared)) => Cow::Owned(prepared),
            Ok(None) => Cow::Borrowed(image),
            Err(e) => {
                warn!("Preprocessing failed for {}: {:#}", record.name, e);
                record.push_message(Stage::Preprocess, format!("{:#}", e));
                Cow::Borrowed(image)
            }
        }
    }

    fn engine(&self, kind: EngineKind) -> Option<&Arc<dyn TextRecognizer>> {
        match kind {
            EngineKind::Local => self.local.as_ref(),
            EngineKind::Remote => self.remote.as_ref(),
        }
    }

    /// One engine call: budget check, recognition, parsing.
    fn attempt(&self, record: &mut ImageRecord, kind: EngineKind, stage: Stage, image: &[u8]) -> Option<Recognized> {
        let Some(engine) = self.engine(kind) else {
            record.push_diagnostic(
                stage,
                &ResolveError::RecognitionUnavailable {
                    engine: kind.to_string(),
                    reason: "not configured".to_string(),
                },
            );
            return None;
        };

        if kind.is_budget_limited() && !self.budget.try_consume() {
            let limit = self.budget.limit().unwrap_or(0);
            warn!("{} limit reached. Skipping OCR for {}.", engine.name(), record.name);
            record.push_diagnostic(
                stage,
                &ResolveError::BudgetExhausted {
                    engine: engine.name().to_string(),
                    limit,
                },
            );
            return None;
        }

        let outcome = recognize_candidates(engine.as_ref(), image);
        if let Some(reason) = outcome.failure {
            record.push_diagnostic(
                stage,
                &ResolveError::RecognitionUnavailable {
                    engine: engine.name().to_string(),
                    reason,
                },
            );
            return None;
        }

        match parse_first(outcome.candidates.iter().map(String::as_str)) {
            Some((index, found)) => Some(Recognized {
                block: outcome.candidates[index].clone(),
                found,
            }),
            None => {
                debug!("{}: no coordinate in {:?}", record.name, outcome.candidates);
                record.push_diagnostic(
                    stage,
                    &ResolveError::ParseMiss {
                        engine: engine.name().to_string(),
                        blocks: outcome.candidates.len(),
                    },
                );
                None
            }
        }
    }

    fn accept(&self, record: &mut ImageRecord, hit: Recognized, source: CoordinateSource) {
        let pair = hit.found.pair;
        record.resolve(pair, source);

        for (column, field) in &self.mapping {
            if field == GPS_LATITUDE_FIELD {
                record.fields.insert(column.clone(), Value::from(pair.lat()));
            } else if field == GPS_LONGITUDE_FIELD {
                record.fields.insert(column.clone(), Value::from(pair.lon()));
            }
        }

        info!(
            "Successfully extracted GPS via {:?} for {}. Raw: '{}' -> Converted: {}",
            source, record.name, hit.block, pair
        );
        record.matched_text = Some(hit.block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_verdicts() {
        assert!(matches!(
            assess(&GpsReading::Decoded { lat: -10.5, lon: 110.5 }),
            MetadataVerdict::Valid(_)
        ));
        assert_eq!(assess(&GpsReading::Absent), MetadataVerdict::Missing);
        assert!(matches!(
            assess(&GpsReading::Decoded { lat: 0.0, lon: 0.0 }),
            MetadataVerdict::Invalid(ResolveError::InvalidMetadataCoordinate(_))
        ));
        assert!(matches!(
            assess(&GpsReading::Decoded { lat: 95.0, lon: 10.0 }),
            MetadataVerdict::Invalid(_)
        ));
        assert!(matches!(
            assess(&GpsReading::Corrupt {
                field: GPS_LATITUDE_FIELD.to_string()
            }),
            MetadataVerdict::Invalid(ResolveError::CorruptCoordinateEncoding { .. })
        ));
        assert!(matches!(assess(&GpsReading::Incomplete), MetadataVerdict::Invalid(_)));
    }

    #[test]
    fn zero_on_one_axis_is_still_valid() {
        assert!(matches!(
            assess(&GpsReading::Decoded { lat: 0.0, lon: 110.5 }),
            MetadataVerdict::Valid(_)
        ));
    }
}
