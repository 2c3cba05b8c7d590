//! Trackpad Gestures - raw multitouch contacts and real-time gesture classification
//!
//! Contacts reported by a trackpad driver are copied out of a shared frame
//! buffer once per host frame and fed to a classifier that turns them into
//! scroll, pan and pinch-zoom gestures: capture → snapshot → classification →
//! callbacks or polled deltas.
//!
//! ## Modules
//!
//! - **Classifier**: session state machine with deadzones, velocity gating and
//!   angle-based scroll/pan discrimination
//! - **Dispatch**: callback registration over the same classifier
//! - **Capture**: thread-safe frame hand-off from a driver backend
//! - **Recording**: `trackpad.frame.v1` frame recordings for replay

pub mod capture;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod recording;
pub mod smoothing;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use capture::{CaptureBackend, FrameBuffer, ReplayBackend, Trackpad};
pub use classifier::GestureClassifier;
pub use config::{GestureConfig, ScrollReference};
pub use dispatch::{GestureDispatcher, HandlerId};
pub use error::GestureError;
pub use geometry::Point;
pub use recording::{RecordedFrame, RecordingAdapter, ReplayedEvent, SCHEMA_VERSION};
pub use types::{
    Contact, ContactState, GestureEvent, GestureKind, GesturePhase, GestureState, GestureValues,
    SessionSummary, Snapshot,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in CLI reports
pub const PRODUCER_NAME: &str = "trackpad-gestures";
