use super::{page_blocks, EngineKind, TextRecognizer};
use crate::constants::{USER_AGENT, VISION_ENDPOINT};
use crate::error::RecognitionError;
use base64::Engine as _;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Google Cloud Vision `TEXT_DETECTION` over the REST API.
///
/// The HTTP client and credentials are set up on the first call. A failed
/// setup is reported for that call only; the next call tries again.
pub struct VisionEngine {
    key_path: Option<PathBuf>,
    endpoint: String,
    timeout: Duration,
    session: Mutex<Option<Arc<Session>>>,
}

struct Session {
    client: Client,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest<'a> {
    requests: [ImageRequest<'a>; 1],
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image: ImageContent,
    features: [Feature<'a>; 1],
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<FullText>,
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct FullText {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct KeyFile {
    api_key: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl VisionEngine {
    pub fn new(key_path: Option<PathBuf>, timeout: Duration) -> Self {
        VisionEngine {
            key_path,
            endpoint: VISION_ENDPOINT.to_string(),
            timeout,
            session: Mutex::new(None),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn session(&self) -> Result<Arc<Session>, RecognitionError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| RecognitionError::Init("session lock poisoned".to_string()))?;
        if let Some(session) = guard.as_ref() {
            return Ok(Arc::clone(session));
        }

        let key_path = self.key_path.as_deref().ok_or_else(|| {
            RecognitionError::Credentials("no credential file configured".to_string())
        })?;
        let api_key = load_api_key(key_path)?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()
            .map_err(|e| RecognitionError::Init(e.to_string()))?;

        info!("Google Vision client ready ({})", key_path.display());
        let session = Arc::new(Session { client, api_key });
        *guard = Some(Arc::clone(&session));
        Ok(session)
    }
}

impl TextRecognizer for VisionEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Remote
    }

    fn name(&self) -> &str {
        "Google Vision"
    }

    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, RecognitionError> {
        let session = self.session()?;

        let body = AnnotateRequest {
            requests: [ImageRequest {
                image: ImageContent {
                    content: base64::engine::general_purpose::STANDARD.encode(image),
                },
                features: [Feature { kind: "TEXT_DETECTION" }],
            }],
        };

        let response = session
            .client
            .post(&self.endpoint)
            .query(&[("key", session.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    RecognitionError::Timeout(self.timeout)
                } else {
                    RecognitionError::Transport(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        let payload = response
            .text()
            .map_err(|e| RecognitionError::Transport(e.without_url().to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&payload)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or_else(|| status.to_string());
            return Err(RecognitionError::Api(message));
        }

        let parsed: AnnotateResponse =
            serde_json::from_str(&payload).map_err(|e| RecognitionError::Api(e.to_string()))?;
        text_blocks(parsed)
    }
}

/// Reads the API key from the credential file: either the bare key or a
/// JSON document with an `api_key` member.
fn load_api_key(path: &Path) -> Result<String, RecognitionError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RecognitionError::Credentials(format!("{}: {}", path.display(), e)))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RecognitionError::Credentials(format!("{} is empty", path.display())));
    }
    if !trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }

    let key_file: KeyFile = serde_json::from_str(trimmed)
        .map_err(|e| RecognitionError::Credentials(format!("{}: {}", path.display(), e)))?;
    match key_file.api_key {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ if key_file.kind.as_deref() == Some("service_account") => {
            warn!("Service-account keys are not supported, add an \"api_key\" member");
            Err(RecognitionError::Credentials(format!(
                "{} is a service-account key without \"api_key\"",
                path.display()
            )))
        }
        _ => Err(RecognitionError::Credentials(format!(
            "{} has no \"api_key\"",
            path.display()
        ))),
    }
}

/// The full page text split into lines, in reading order. Falls back to the
/// first text annotation when the full annotation is missing.
fn text_blocks(parsed: AnnotateResponse) -> Result<Vec<String>, RecognitionError> {
    let Some(first) = parsed.responses.into_iter().next() else {
        return Ok(Vec::new());
    };
    if let Some(error) = first.error {
        return Err(RecognitionError::Api(error.message));
    }

    let text = match first.full_text_annotation {
        Some(full) => full.text,
        None => first
            .text_annotations
            .into_iter()
            .next()
            .map(|a| a.description)
            .unwrap_or_default(),
    };
    debug!("Vision returned {} characters", text.len());

    Ok(page_blocks(&text))
}
