//! trackpad.frame.v1 recording schema
//!
//! Recorded contact frames, one JSON object per frame, used for offline
//! replay through the classifier and for driving the replay capture backend.
//!
//! ```json
//! {"schema_version": "trackpad.frame.v1", "timestamp": "2024-01-15T10:00:00Z",
//!  "contacts": [{"id": 1, "x": 0.45, "y": 0.5, "vx": 0.0, "vy": 0.6}]}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::classifier::GestureClassifier;
use crate::error::GestureError;
use crate::types::{Contact, GestureEvent, Snapshot};

/// Current schema version
pub const SCHEMA_VERSION: &str = "trackpad.frame.v1";

/// Frame time assumed for the first frame of a replay (60 Hz)
pub const DEFAULT_FRAME_DT: f64 = 1.0 / 60.0;

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// One recorded driver frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// When the frame was captured (UTC)
    pub timestamp: DateTime<Utc>,
    /// Contacts present in the frame
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl RecordedFrame {
    pub fn new(timestamp: DateTime<Utc>, contacts: Vec<Contact>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp,
            contacts,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_contacts(&self.contacts)
    }

    /// Validate a single frame
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        let mut seen = HashSet::new();
        for contact in &self.contacts {
            if !seen.insert(contact.id) {
                return Err(ValidationError::DuplicateContactId(contact.id));
            }

            let numbers = [
                contact.x,
                contact.y,
                contact.vx,
                contact.vy,
                contact.angle,
                contact.major_axis,
                contact.minor_axis,
                contact.size,
            ];
            if numbers.iter().any(|n| !n.is_finite()) {
                return Err(ValidationError::NonFiniteValue(contact.id));
            }

            if !(0.0..=1.0).contains(&contact.x) || !(0.0..=1.0).contains(&contact.y) {
                return Err(ValidationError::PositionOutOfRange {
                    id: contact.id,
                    x: contact.x,
                    y: contact.y,
                });
            }
        }

        Ok(())
    }
}

/// Frame validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Contact id {0} appears more than once in a frame")]
    DuplicateContactId(i32),

    #[error("Contact {0} has a non-finite value")]
    NonFiniteValue(i32),

    #[error("Contact {id} position ({x}, {y}) is outside [0, 1]")]
    PositionOutOfRange { id: i32, x: f32, y: f32 },

    #[error("Timestamp goes backwards from the previous frame")]
    TimestampRegression,
}

/// Validation result for one frame of a recording
#[derive(Debug, Clone)]
pub struct FrameValidation {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub error: ValidationError,
}

/// Gesture event tagged with the recorded frame that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayedEvent {
    /// Index of the frame within the recording
    pub frame: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: GestureEvent,
}

/// Parsing, validation and replay of recordings
pub struct RecordingAdapter;

impl RecordingAdapter {
    /// Parse newline-delimited JSON frames. Blank lines are skipped.
    pub fn parse_ndjson(input: &str) -> Result<Vec<RecordedFrame>, GestureError> {
        input
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str(line.trim()).map_err(|e| {
                    GestureError::ParseError(format!("line {}: {}", number + 1, e))
                })
            })
            .collect()
    }

    /// Parse a JSON array of frames
    pub fn parse_array(input: &str) -> Result<Vec<RecordedFrame>, GestureError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Validate every frame, returning only the failures
    pub fn validate_frames(frames: &[RecordedFrame]) -> Vec<FrameValidation> {
        let mut failures = Vec::new();
        let mut previous: Option<DateTime<Utc>> = None;

        for (index, frame) in frames.iter().enumerate() {
            let result = frame.validate().and_then(|()| match previous {
                Some(prev) if frame.timestamp < prev => Err(ValidationError::TimestampRegression),
                _ => Ok(()),
            });

            if let Err(error) = result {
                failures.push(FrameValidation {
                    index,
                    timestamp: frame.timestamp,
                    error,
                });
            }
            previous = Some(frame.timestamp);
        }

        failures
    }

    /// Time between two frames in seconds, falling back to the default frame time
    pub fn frame_dt(previous: Option<&RecordedFrame>, frame: &RecordedFrame) -> f64 {
        let Some(previous) = previous else {
            return DEFAULT_FRAME_DT;
        };
        let micros = (frame.timestamp - previous.timestamp).num_microseconds();
        match micros {
            Some(us) if us > 0 => us as f64 / 1_000_000.0,
            _ => DEFAULT_FRAME_DT,
        }
    }

    /// Feed frames through a classifier in order and collect every event
    pub fn replay(
        frames: &[RecordedFrame],
        classifier: &mut GestureClassifier,
    ) -> Vec<ReplayedEvent> {
        let mut events = Vec::new();
        let mut previous: Option<&RecordedFrame> = None;

        for (index, frame) in frames.iter().enumerate() {
            let dt = Self::frame_dt(previous, frame);
            events.extend(
                classifier
                    .update(&frame.snapshot(), dt)
                    .iter()
                    .map(|event| ReplayedEvent {
                        frame: index,
                        timestamp: frame.timestamp,
                        event: event.clone(),
                    }),
            );
            previous = Some(frame);
        }

        debug!(frames = frames.len(), events = events.len(), "recording replayed");
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GestureKind, GesturePhase, GestureState};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn base_time() -> DateTime<Utc> {
        "2024-01-15T10:00:00Z".parse().unwrap()
    }

    /// A pinch recorded at 60 Hz followed by a lift
    fn pinch_frames() -> Vec<RecordedFrame> {
        let mut frames: Vec<RecordedFrame> = [0.10f32, 0.16, 0.20]
            .iter()
            .enumerate()
            .map(|(n, distance)| {
                RecordedFrame::new(
                    base_time() + Duration::milliseconds(16 * n as i64),
                    vec![
                        Contact::new(1, 0.5 - distance / 2.0, 0.5).with_velocity(-0.5, 0.0),
                        Contact::new(2, 0.5 + distance / 2.0, 0.5).with_velocity(0.5, 0.0),
                    ],
                )
            })
            .collect();
        frames.push(RecordedFrame::new(base_time() + Duration::milliseconds(48), vec![]));
        frames
    }

    #[test]
    fn test_parse_ndjson() {
        let input = concat!(
            r#"{"timestamp": "2024-01-15T10:00:00Z", "contacts": [{"id": 1, "x": 0.5, "y": 0.5}]}"#,
            "\n\n",
            r#"{"schema_version": "trackpad.frame.v1", "timestamp": "2024-01-15T10:00:00.016Z"}"#,
            "\n",
        );
        let frames = RecordingAdapter::parse_ndjson(input).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].contacts.len(), 1);
        assert_eq!(frames[0].schema_version, SCHEMA_VERSION);
        assert!(frames[1].contacts.is_empty());
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let input = "{\"timestamp\": \"2024-01-15T10:00:00Z\"}\nnot json\n";
        match RecordingAdapter::parse_ndjson(input) {
            Err(GestureError::ParseError(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_parse_array() {
        let json = serde_json::to_string(&pinch_frames()).unwrap();
        let frames = RecordingAdapter::parse_array(&json).unwrap();
        assert_eq!(frames, pinch_frames());
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let frame = RecordedFrame::new(
            base_time(),
            vec![Contact::new(1, 0.2, 0.2), Contact::new(1, 0.3, 0.3)],
        );
        assert_eq!(frame.validate(), Err(ValidationError::DuplicateContactId(1)));
    }

    #[test]
    fn test_validate_position_range_and_finite() {
        let outside = RecordedFrame::new(base_time(), vec![Contact::new(4, 1.2, 0.3)]);
        assert!(matches!(
            outside.validate(),
            Err(ValidationError::PositionOutOfRange { id: 4, .. })
        ));

        let nan = RecordedFrame::new(
            base_time(),
            vec![Contact::new(5, 0.3, 0.3).with_velocity(f32::NAN, 0.0)],
        );
        assert_eq!(nan.validate(), Err(ValidationError::NonFiniteValue(5)));
    }

    #[test]
    fn test_validate_schema_version() {
        let mut frame = RecordedFrame::new(base_time(), vec![]);
        frame.schema_version = "trackpad.frame.v0".to_string();
        assert!(matches!(
            frame.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_validate_frames_flags_time_regression() {
        let mut frames = pinch_frames();
        frames[2].timestamp = base_time() - Duration::milliseconds(1);

        let failures = RecordingAdapter::validate_frames(&frames);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 2);
        assert_eq!(failures[0].error, ValidationError::TimestampRegression);
    }

    #[test]
    fn test_frame_dt() {
        let frames = pinch_frames();
        assert_eq!(RecordingAdapter::frame_dt(None, &frames[0]), DEFAULT_FRAME_DT);
        assert!((RecordingAdapter::frame_dt(Some(&frames[0]), &frames[1]) - 0.016).abs() < 1e-9);
        assert_eq!(
            RecordingAdapter::frame_dt(Some(&frames[1]), &frames[0]),
            DEFAULT_FRAME_DT
        );
    }

    #[test]
    fn test_replay_pinch() {
        let mut classifier = GestureClassifier::new();
        let events = RecordingAdapter::replay(&pinch_frames(), &mut classifier);

        let phases: Vec<_> = events.iter().map(|e| (e.event.kind, e.event.phase)).collect();
        assert_eq!(
            phases,
            vec![
                (GestureKind::Zoom, GesturePhase::Start),
                (GestureKind::Zoom, GesturePhase::Update),
                (GestureKind::Zoom, GesturePhase::Update),
                (GestureKind::Zoom, GesturePhase::End),
            ]
        );
        assert!((events[3].event.elapsed - 0.032).abs() < 1e-9);
        assert_eq!(classifier.state(), GestureState::Idle);

        let frames: Vec<usize> = events.iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![1, 1, 2, 3]);
        assert_eq!(events[3].timestamp, base_time() + Duration::milliseconds(48));
    }

    #[test]
    fn test_replayed_event_serializes_flat() {
        let mut classifier = GestureClassifier::new();
        let events = RecordingAdapter::replay(&pinch_frames(), &mut classifier);
        let json = serde_json::to_value(&events[0]).unwrap();

        assert_eq!(json["frame"], 1);
        assert_eq!(json["kind"], "zoom");
        assert_eq!(json["phase"], "start");
        assert_eq!(json["values"]["type"], "zoom");
    }
}
