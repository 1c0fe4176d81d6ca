use crate::constants::{
    DEFAULT_OCR_LANGUAGES, DEFAULT_RECOGNITION_TIMEOUT_SECS, DEFAULT_TESSERACT_BIN, GLOBAL_CONFIG_FILE,
    GPS_LATITUDE_FIELD, GPS_LONGITUDE_FIELD,
};
use crate::exif_parser::TagMapping;
use crate::preprocess::PreprocessMethod;
use crate::recognition::EngineKind;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Run configuration, read from TOML.
///
/// `global_config.toml` in the working directory is the base layer; a task
/// file given on the command line is deep-merged on top of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub extract: ExtractSettings,
    pub google_cloud: GoogleCloudSettings,
    pub ocr: OcrSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    /// Output column -> EXIF field name.
    pub columns: TagMapping,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        let columns = [
            ("date", "DateTimeOriginal"),
            ("lat", GPS_LATITUDE_FIELD),
            ("lon", GPS_LONGITUDE_FIELD),
        ]
        .into_iter()
        .map(|(column, field)| (column.to_string(), field.to_string()))
        .collect();
        Self { columns }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleCloudSettings {
    pub service_account_key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub engine: EngineKind,
    pub fallback: bool,
    /// Remote calls allowed per run; negative means unbounded.
    pub vision_limit: i64,
    pub skip_on_invalid_gps: bool,
    pub disabled: bool,
    pub preprocess: PreprocessMethod,
    pub languages: Vec<String>,
    pub tesseract_path: PathBuf,
    pub timeout_secs: u64,
    pub jobs: usize,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::Local,
            fallback: false,
            vision_limit: -1,
            skip_on_invalid_gps: false,
            disabled: false,
            preprocess: PreprocessMethod::Auto,
            languages: DEFAULT_OCR_LANGUAGES.iter().map(|l| l.to_string()).collect(),
            tesseract_path: PathBuf::from(DEFAULT_TESSERACT_BIN),
            timeout_secs: DEFAULT_RECOGNITION_TIMEOUT_SECS,
            jobs: 1,
        }
    }
}

impl OcrSettings {
    pub fn vision_limit(&self) -> Option<usize> {
        usize::try_from(self.vision_limit).ok()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Settings {
    /// Loads the global file from the working directory plus an optional
    /// task file.
    pub fn load(task_config: Option<&Path>) -> Result<Self> {
        Self::load_from(Path::new(GLOBAL_CONFIG_FILE), task_config)
    }

    pub fn load_from(global_config: &Path, task_config: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Table::new();

        if global_config.exists() {
            merged = read_table(global_config)?;
            debug!("Loaded global config from {}", global_config.display());
        }

        if let Some(task) = task_config {
            if !task.exists() {
                bail!("Specified config file not found: {}", task.display());
            }
            deep_merge(&mut merged, read_table(task)?);
            debug!("Merged task config from {}", task.display());
        }

        let settings: Settings = toml::Value::Table(merged)
            .try_into()
            .context("Invalid configuration")?;
        Ok(settings)
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Recursively merges `over` into `base`; tables merge key by key, every
/// other value in `over` replaces the one in `base`.
fn deep_merge(base: &mut toml::Table, over: toml::Table) {
    for (key, value) in over {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
