//! Error types for trackpad gestures

use thiserror::Error;

/// Errors surfaced by configuration, capture and recording handling.
///
/// The classifier itself never fails; these cover the layers around it.
#[derive(Debug, Error)]
pub enum GestureError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Trackpad device is already open")]
    DeviceAlreadyOpen,

    #[error("Trackpad device is not open")]
    DeviceNotOpen,

    #[error("Failed to start capture backend {backend}: {reason}")]
    CaptureStart { backend: String, reason: String },
}
