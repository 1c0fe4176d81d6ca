use std::time::Duration;
use thiserror::Error;

/// Failures of the coordinate-resolution core.
///
/// Everything except `UnsupportedOutputFormat` is non-fatal: the resolver
/// records it on the photo and moves on to the next tier or photo.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("no readable metadata: {0}")]
    MetadataUnavailable(String),

    #[error("corrupt GPS encoding in {field}")]
    CorruptCoordinateEncoding { field: String },

    #[error("metadata coordinate rejected: {0}")]
    InvalidMetadataCoordinate(String),

    #[error("{engine} unavailable: {reason}")]
    RecognitionUnavailable { engine: String, reason: String },

    #[error("no coordinate found in {blocks} text block(s) from {engine}")]
    ParseMiss { engine: String, blocks: usize },

    #[error("{engine} budget exhausted ({limit} call(s))")]
    BudgetExhausted { engine: String, limit: usize },

    #[error("unsupported output format '{0}', use .json or .jsonl")]
    UnsupportedOutputFormat(String),
}

/// Errors raised inside a recognition engine. The adapter turns these into
/// "no candidates" and keeps the message for diagnostics.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("engine failed to initialize: {0}")]
    Init(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("credentials: {0}")]
    Credentials(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("engine process failed: {0}")]
    Process(String),
}

/// A captured coordinate component could not be read as a number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("not a number: '{0}'")]
    InvalidNumber(String),

    #[error("not a hemisphere letter: '{0}'")]
    InvalidHemisphere(String),
}
