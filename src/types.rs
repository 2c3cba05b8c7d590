//! Core types for the trackpad gesture pipeline
//!
//! This module defines the data that flows through each stage: raw contacts
//! reported by the driver, the per-tick snapshot handed to the classifier, and
//! the gesture events the classifier produces.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::geometry::Point;

/// Touch state reported by the driver for a single contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactState {
    NotTracking,
    Starting,
    Hovering,
    #[default]
    Touching,
    Active,
    Leaving,
    Lingering,
    OutOfRange,
}

impl ContactState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactState::NotTracking => "not_tracking",
            ContactState::Starting => "starting",
            ContactState::Hovering => "hovering",
            ContactState::Touching => "touching",
            ContactState::Active => "active",
            ContactState::Leaving => "leaving",
            ContactState::Lingering => "lingering",
            ContactState::OutOfRange => "out_of_range",
        }
    }

    /// Integer code used by the native driver binding
    pub fn code(&self) -> i32 {
        match self {
            ContactState::NotTracking => 0,
            ContactState::Starting => 1,
            ContactState::Hovering => 2,
            ContactState::Touching => 3,
            ContactState::Active => 4,
            ContactState::Leaving => 5,
            ContactState::Lingering => 6,
            ContactState::OutOfRange => 7,
        }
    }
}

impl TryFrom<i32> for ContactState {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ContactState::NotTracking),
            1 => Ok(ContactState::Starting),
            2 => Ok(ContactState::Hovering),
            3 => Ok(ContactState::Touching),
            4 => Ok(ContactState::Active),
            5 => Ok(ContactState::Leaving),
            6 => Ok(ContactState::Lingering),
            7 => Ok(ContactState::OutOfRange),
            other => Err(other),
        }
    }
}

/// One finger touch as reported by the driver for a single tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Stable identifier for the duration of the touch
    pub id: i32,
    /// Normalized position (0-1)
    pub x: f32,
    pub y: f32,
    /// Normalized velocity (units per second)
    #[serde(default)]
    pub vx: f32,
    #[serde(default)]
    pub vy: f32,
    /// Ellipse orientation (degrees)
    #[serde(default)]
    pub angle: f32,
    #[serde(default)]
    pub major_axis: f32,
    #[serde(default)]
    pub minor_axis: f32,
    #[serde(default)]
    pub size: f32,
    #[serde(default)]
    pub state: ContactState,
}

impl Contact {
    /// Create a touching contact at rest
    pub fn new(id: i32, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            angle: 0.0,
            major_axis: 0.0,
            minor_axis: 0.0,
            size: 0.0,
            state: ContactState::Touching,
        }
    }

    /// Builder-style velocity setter
    pub fn with_velocity(mut self, vx: f32, vy: f32) -> Self {
        self.vx = vx;
        self.vy = vy;
        self
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn speed_squared(&self) -> f32 {
        self.vx * self.vx + self.vy * self.vy
    }
}

/// Contacts present during one tick, ordered by id
///
/// The classifier copies what it needs out of a snapshot and never holds on
/// to it past the tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    contacts: BTreeMap<i32, Contact>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a slice. A repeated id keeps its last occurrence.
    pub fn from_contacts(contacts: &[Contact]) -> Self {
        contacts.iter().copied().collect()
    }

    pub fn insert(&mut self, contact: Contact) {
        self.contacts.insert(contact.id, contact);
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, id: i32) -> Option<&Contact> {
        self.contacts.get(&id)
    }

    /// Contacts in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    pub fn ids(&self) -> Vec<i32> {
        self.contacts.keys().copied().collect()
    }
}

impl FromIterator<Contact> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Contact>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for contact in iter {
            snapshot.insert(contact);
        }
        snapshot
    }
}

/// Gesture kinds the classifier can lock onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Scroll,
    Pan,
    Zoom,
}

impl GestureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureKind::Scroll => "scroll",
            GestureKind::Pan => "pan",
            GestureKind::Zoom => "zoom",
        }
    }

    /// Session state a lock on this kind puts the classifier in
    pub fn locked_state(&self) -> GestureState {
        match self {
            GestureKind::Scroll => GestureState::Scrolling,
            GestureKind::Pan => GestureState::Panning,
            GestureKind::Zoom => GestureState::Zooming,
        }
    }
}

/// Classification state of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureState {
    #[default]
    Idle,
    Starting,
    Scrolling,
    Panning,
    Zooming,
}

impl GestureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureState::Idle => "idle",
            GestureState::Starting => "starting",
            GestureState::Scrolling => "scrolling",
            GestureState::Panning => "panning",
            GestureState::Zooming => "zooming",
        }
    }

    /// Locked gesture kind, if any
    pub fn kind(&self) -> Option<GestureKind> {
        match self {
            GestureState::Scrolling => Some(GestureKind::Scroll),
            GestureState::Panning => Some(GestureKind::Pan),
            GestureState::Zooming => Some(GestureKind::Zoom),
            GestureState::Idle | GestureState::Starting => None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.kind().is_some()
    }

    /// Integer code exposed through the C ABI
    pub fn code(&self) -> i32 {
        match self {
            GestureState::Idle => 0,
            GestureState::Starting => 1,
            GestureState::Scrolling => 2,
            GestureState::Panning => 3,
            GestureState::Zooming => 4,
        }
    }
}

/// Lifecycle phase of an emitted gesture event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GesturePhase {
    Start,
    Update,
    End,
}

impl GesturePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GesturePhase::Start => "start",
            GesturePhase::Update => "update",
            GesturePhase::End => "end",
        }
    }
}

/// Numeric payload carried by a gesture event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GestureValues {
    /// Scroll or pan movement
    Translation {
        /// Per-frame delta after continuation deadzones
        dx: f32,
        dy: f32,
        /// Sum of all deltas emitted in this session
        total_x: f32,
        total_y: f32,
    },
    /// Pinch zoom
    Zoom {
        /// Per-frame scale factor (1.0 = no change)
        scale: f32,
        /// Product of all scale factors emitted in this session
        total_scale: f32,
        /// Current zoom center
        center: Point,
    },
}

impl GestureValues {
    /// The two numbers handed to flat callback consumers:
    /// `(dx, dy)` for translation, `(scale, total_scale)` for zoom.
    pub fn pair(&self) -> (f32, f32) {
        match *self {
            GestureValues::Translation { dx, dy, .. } => (dx, dy),
            GestureValues::Zoom {
                scale, total_scale, ..
            } => (scale, total_scale),
        }
    }
}

/// Event produced by the classifier during `update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    /// Session this event belongs to
    pub session_id: Uuid,
    pub kind: GestureKind,
    pub phase: GesturePhase,
    pub values: GestureValues,
    /// Seconds since the session was created
    pub elapsed: f64,
}

/// Read-only view of the active session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    /// Number of tracked fingers (1 or 2)
    pub fingers: usize,
    pub state: GestureState,
    pub locked: bool,
    pub initial_midpoint: Point,
    pub initial_distance: f32,
    pub last_midpoint: Point,
    pub last_distance: f32,
    pub total_x: f32,
    pub total_y: f32,
    pub total_scale: f32,
    pub elapsed: f64,
}
