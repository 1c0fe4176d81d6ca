//! Optical text recognition behind one capability: image bytes in, ordered
//! candidate text blocks out.

pub mod local;
pub mod remote;

pub use local::TesseractEngine;
pub use remote::VisionEngine;

use crate::error::RecognitionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// The closed set of engine kinds. Remote engines cost money per call and
/// are subject to the recognition budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[serde(alias = "tesseract", alias = "easyocr")]
    Local,
    #[serde(alias = "vision", alias = "google")]
    Remote,
}

impl EngineKind {
    pub fn is_budget_limited(self) -> bool {
        matches!(self, EngineKind::Remote)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Local => write!(f, "local"),
            EngineKind::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "tesseract" | "easyocr" => Ok(EngineKind::Local),
            "remote" | "vision" | "google" => Ok(EngineKind::Remote),
            other => Err(format!("unknown OCR engine '{}' (tesseract, vision)", other)),
        }
    }
}

pub trait TextRecognizer: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Human-readable engine name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Candidate text blocks in reading order; empty when nothing was read.
    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, RecognitionError>;
}

/// One candidate per text line, then the whole page joined, so a coordinate
/// broken over two lines still gets a chance to parse.
pub(crate) fn page_blocks(text: &str) -> Vec<String> {
    let mut blocks: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    if blocks.len() > 1 {
        blocks.push(blocks.join(" "));
    }
    blocks
}

/// Result of one engine call as seen by the resolver. Engine errors never
/// escape: they become zero candidates with the reason kept.
#[derive(Debug, Clone, Default)]
pub struct RecognitionOutcome {
    pub candidates: Vec<String>,
    pub failure: Option<String>,
}

pub fn recognize_candidates(engine: &dyn TextRecognizer, image: &[u8]) -> RecognitionOutcome {
    match engine.recognize(image) {
        Ok(blocks) => {
            let candidates: Vec<String> = blocks
                .into_iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
            debug!("{} found text blocks: {:?}", engine.name(), candidates);
            RecognitionOutcome {
                candidates,
                failure: None,
            }
        }
        Err(e) => {
            warn!("{} recognition failed: {}", engine.name(), e);
            RecognitionOutcome {
                candidates: Vec::new(),
                failure: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Result<Vec<&'static str>, &'static str>);

    impl TextRecognizer for Scripted {
        fn kind(&self) -> EngineKind {
            EngineKind::Local
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn recognize(&self, _image: &[u8]) -> Result<Vec<String>, RecognitionError> {
            match &self.0 {
                Ok(blocks) => Ok(blocks.iter().map(|s| s.to_string()).collect()),
                Err(reason) => Err(RecognitionError::Process(reason.to_string())),
            }
        }
    }

    #[test]
    fn errors_become_empty_candidates() {
        let outcome = recognize_candidates(&Scripted(Err("segfault")), b"img");
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.failure.as_deref(), Some("engine process failed: segfault"));
    }

    #[test]
    fn blank_blocks_are_dropped() {
        let outcome = recognize_candidates(&Scripted(Ok(vec!["  ", "S10 30 00", ""])), b"img");
        assert_eq!(outcome.candidates, vec!["S10 30 00".to_string()]);
        assert!(outcome.failure.is_none());
    }

    #[test]
    fn blocks_per_line_plus_whole_page() {
        let blocks = page_blocks("Lat S10 30 00\n\n  Long E110 30 00 \n");
        assert_eq!(
            blocks,
            vec![
                "Lat S10 30 00".to_string(),
                "Long E110 30 00".to_string(),
                "Lat S10 30 00 Long E110 30 00".to_string(),
            ]
        );
        assert_eq!(page_blocks("single line\n"), vec!["single line".to_string()]);
        assert!(page_blocks("\n \n").is_empty());
    }

    #[test]
    fn engine_kind_names() {
        let kind: EngineKind = serde_json::from_str("\"tesseract\"").unwrap();
        assert_eq!(kind, EngineKind::Local);
        let kind: EngineKind = serde_json::from_str("\"google\"").unwrap();
        assert_eq!(kind, EngineKind::Remote);
        assert_eq!("Vision".parse::<EngineKind>().unwrap(), EngineKind::Remote);
        assert!("paddle".parse::<EngineKind>().is_err());
        assert!(EngineKind::Remote.is_budget_limited());
        assert!(!EngineKind::Local.is_budget_limited());
    }
}
