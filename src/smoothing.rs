//! Output smoothing
//!
//! Exponential low-pass filters applied to the values the classifier exposes
//! through its pull accessors. Smoothing never feeds back into
//! classification; it only shapes what hosts observe between frames.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Distance from neutral below which a decaying value snaps to neutral
const SETTLE_EPSILON: f32 = 1e-5;

/// Scalar exponential smoother with a neutral resting value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialSmoother {
    value: f32,
    neutral: f32,
    factor: f32,
}

impl ExponentialSmoother {
    /// `factor` in (0, 1]; 1.0 passes raw values through unchanged
    pub fn new(neutral: f32, factor: f32) -> Self {
        Self {
            value: neutral,
            neutral,
            factor,
        }
    }

    /// Feed a raw sample and return the smoothed value
    pub fn push(&mut self, raw: f32) -> f32 {
        self.value += (raw - self.value) * self.factor;
        self.value
    }

    /// Move one step toward the neutral value
    pub fn decay(&mut self) -> f32 {
        self.push(self.neutral);
        if (self.value - self.neutral).abs() < SETTLE_EPSILON {
            self.value = self.neutral;
        }
        self.value
    }

    pub fn reset(&mut self) {
        self.value = self.neutral;
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn neutral(&self) -> f32 {
        self.neutral
    }

    pub fn is_settled(&self) -> bool {
        self.value == self.neutral
    }
}

/// Two-axis smoother resting at a fixed point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedPoint {
    x: ExponentialSmoother,
    y: ExponentialSmoother,
}

impl SmoothedPoint {
    pub fn new(neutral: Point, factor: f32) -> Self {
        Self {
            x: ExponentialSmoother::new(neutral.x, factor),
            y: ExponentialSmoother::new(neutral.y, factor),
        }
    }

    pub fn push(&mut self, raw: Point) -> Point {
        Point::new(self.x.push(raw.x), self.y.push(raw.y))
    }

    pub fn decay(&mut self) -> Point {
        Point::new(self.x.decay(), self.y.decay())
    }

    /// Jump straight to `value` without filtering
    pub fn snap(&mut self, value: Point) {
        self.x.value = value.x;
        self.y.value = value.y;
    }

    pub fn value(&self) -> Point {
        Point::new(self.x.value(), self.y.value())
    }
}
