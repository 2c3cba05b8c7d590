//! Two-finger geometry
//!
//! Midpoint, separation and angle math used by the classifier:
//! - `Point` vector arithmetic in normalized trackpad space
//! - `TwoFingerMetrics` for a pair of contacts
//! - Movement discrimination between scroll and pan

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

use crate::config::ScrollReference;
use crate::types::{Contact, GestureKind};

/// Length below which a direction vector is treated as undefined
const DEGENERATE_LENGTH: f32 = 1e-6;

/// A position or displacement in normalized trackpad space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Point) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Point) -> f32 {
        (other - self).length()
    }

    pub fn midpoint(self, other: Point) -> Point {
        (self + other) * 0.5
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Point;

    fn mul(self, rhs: f32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Derived metrics for a pair of contacts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoFingerMetrics {
    /// Average of the two positions
    pub midpoint: Point,
    /// Euclidean separation
    pub distance: f32,
    /// Vector from the first finger to the second
    pub axis: Point,
}

impl TwoFingerMetrics {
    pub fn from_contacts(first: &Contact, second: &Contact) -> Self {
        let a = first.position();
        let b = second.position();
        Self {
            midpoint: a.midpoint(b),
            distance: a.distance(b),
            axis: b - a,
        }
    }
}

/// Average squared speed of the given contacts (0 for an empty slice)
pub fn mean_speed_squared(contacts: &[Contact]) -> f32 {
    if contacts.is_empty() {
        return 0.0;
    }
    let sum: f32 = contacts.iter().map(Contact::speed_squared).sum();
    sum / contacts.len() as f32
}

/// Unsigned angle between two lines, in degrees within [0, 90].
///
/// Direction is ignored: a vector and its negation describe the same line.
/// Returns `None` when either vector is degenerate.
pub fn line_angle_degrees(a: Point, b: Point) -> Option<f32> {
    let la = a.length();
    let lb = b.length();
    if la < DEGENERATE_LENGTH || lb < DEGENERATE_LENGTH {
        return None;
    }
    let cos = (a.dot(b).abs() / (la * lb)).clamp(0.0, 1.0);
    Some(cos.acos().to_degrees())
}

/// Decide between scroll and pan for a drift that already cleared the
/// movement deadzone.
///
/// Drift within `scroll_angle_max` degrees of perpendicular to the reference
/// line is a scroll; anything else is a pan. With `FingerAxis` the reference
/// is the finger-pair axis captured at session start, falling back to the
/// horizontal when the fingers were coincident.
pub fn classify_movement(
    drift: Point,
    finger_axis: Point,
    reference: ScrollReference,
    scroll_angle_max: f32,
) -> GestureKind {
    let horizontal = Point::new(1.0, 0.0);
    let reference_line = match reference {
        ScrollReference::FingerAxis if finger_axis.length() >= DEGENERATE_LENGTH => finger_axis,
        _ => horizontal,
    };

    match line_angle_degrees(drift, reference_line) {
        Some(angle) if angle >= 90.0 - scroll_angle_max => GestureKind::Scroll,
        _ => GestureKind::Pan,
    }
}

/// Snap a value to zero when its magnitude is below `deadzone`
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        value
    }
}
