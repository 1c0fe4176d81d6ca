// Photo discovery
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
pub const PREPROCESS_DEBUG_DIR: &str = "_preprocessed_debug";

// Configuration and logging files
pub const GLOBAL_CONFIG_FILE: &str = "global_config.toml";
pub const LOG_FILE_NAME: &str = "status.log";

// EXIF field names the resolver treats specially
pub const GPS_LATITUDE_FIELD: &str = "GPSLatitude";
pub const GPS_LONGITUDE_FIELD: &str = "GPSLongitude";

// Recognition engines
pub const DEFAULT_TESSERACT_BIN: &str = "tesseract";
pub const DEFAULT_OCR_LANGUAGES: &[&str] = &["eng", "ind"];
pub const DEFAULT_RECOGNITION_TIMEOUT_SECS: u64 = 60;
pub const VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
pub const USER_AGENT: &str = "GeoPhoto/0.4";

pub const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";
