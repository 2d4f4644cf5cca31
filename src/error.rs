//! Typed errors for the scorer, camera and telemetry boundaries.
//!
//! Orchestration code (monitor loop, outbox, binary) wraps these in
//! `anyhow::Error` with context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("insufficient data: cannot fit on an empty batch")]
    InsufficientData,

    #[error("degenerate feature: column '{column}' has zero variance")]
    DegenerateFeature { column: &'static str },

    #[error("non-finite feature value in row {row}")]
    NonFiniteFeature { row: usize },

    #[error("invalid parameter: {name} - {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("video device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("frame read failed: {0}")]
    FrameRead(String),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to read telemetry: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed reading on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("reading on line {line} is older than its predecessor")]
    OutOfOrder { line: usize },
}
