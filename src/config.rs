//! Classifier configuration
//!
//! All thresholds are supplied once when a classifier is built and never
//! change afterwards. The defaults are tuning choices for a laptop trackpad
//! reporting normalized coordinates; hosts are expected to override them.

use serde::{Deserialize, Serialize};

use crate::error::GestureError;

/// Line that scroll/pan discrimination measures drift against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollReference {
    /// Axis between the two fingers at session start
    #[default]
    FingerAxis,
    /// Screen x axis
    Horizontal,
}

/// Gesture thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Midpoint drift from session start needed to lock scroll or pan
    pub movement_activate_deadzone: f32,
    /// Change in finger separation from session start needed to lock zoom
    pub zoom_activate_deadzone: f32,
    /// Per-frame translation below this is dropped once locked
    pub movement_continue_deadzone: f32,
    /// Per-frame separation change below this is dropped once locked
    pub zoom_continue_deadzone: f32,
    /// Degrees from perpendicular to the reference line still counted as scroll
    pub scroll_angle_max: f32,
    /// Reference line for scroll/pan discrimination
    pub scroll_reference: ScrollReference,
    /// Smoothing factor for scroll/pan deltas and the zoom center (0-1]
    pub smoothing_factor: f32,
    /// Smoothing factor for the zoom scale (0-1]
    pub zoom_smoothing_factor: f32,
    /// Multiplier applied to relative separation change
    pub zoom_sensitivity: f32,
    /// Finger separation below which zoom is neither locked nor computed
    pub min_zoom_distance: f32,
    /// Mean squared finger speed needed before any lock
    pub velocity_start_threshold: f32,
    /// Track single-finger pans
    pub one_finger_pan: bool,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            movement_activate_deadzone: 0.02,
            zoom_activate_deadzone: 0.01,
            movement_continue_deadzone: 0.001,
            zoom_continue_deadzone: 0.001,
            scroll_angle_max: 30.0,
            scroll_reference: ScrollReference::FingerAxis,
            smoothing_factor: 0.5,
            zoom_smoothing_factor: 0.25,
            zoom_sensitivity: 1.0,
            min_zoom_distance: 0.02,
            velocity_start_threshold: 0.0001,
            one_finger_pan: true,
        }
    }
}

impl GestureConfig {
    /// Check thresholds for consistency
    pub fn validate(&self) -> Result<(), GestureError> {
        let non_negative = [
            ("movement_activate_deadzone", self.movement_activate_deadzone),
            ("zoom_activate_deadzone", self.zoom_activate_deadzone),
            ("movement_continue_deadzone", self.movement_continue_deadzone),
            ("zoom_continue_deadzone", self.zoom_continue_deadzone),
            ("zoom_sensitivity", self.zoom_sensitivity),
            ("min_zoom_distance", self.min_zoom_distance),
            ("velocity_start_threshold", self.velocity_start_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(GestureError::InvalidConfig(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }

        for (name, value) in [
            ("smoothing_factor", self.smoothing_factor),
            ("zoom_smoothing_factor", self.zoom_smoothing_factor),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(GestureError::InvalidConfig(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(0.0..=90.0).contains(&self.scroll_angle_max) {
            return Err(GestureError::InvalidConfig(format!(
                "scroll_angle_max must be in [0, 90] degrees, got {}",
                self.scroll_angle_max
            )));
        }

        if self.movement_continue_deadzone > self.movement_activate_deadzone {
            return Err(GestureError::InvalidConfig(
                "movement_continue_deadzone must not exceed movement_activate_deadzone".to_string(),
            ));
        }

        if self.zoom_continue_deadzone > self.zoom_activate_deadzone {
            return Err(GestureError::InvalidConfig(
                "zoom_continue_deadzone must not exceed zoom_activate_deadzone".to_string(),
            ));
        }

        Ok(())
    }

    /// Load and validate a configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, GestureError> {
        let config: GestureConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, GestureError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        assert!(GestureConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let json = r#"{"zoom_sensitivity": 2.0, "scroll_reference": "horizontal"}"#;
        let config = GestureConfig::from_json(json).unwrap();

        assert_eq!(config.zoom_sensitivity, 2.0);
        assert_eq!(config.scroll_reference, ScrollReference::Horizontal);
        assert_eq!(
            config.movement_activate_deadzone,
            GestureConfig::default().movement_activate_deadzone
        );
    }

    #[test]
    fn test_json_roundtrip_preserves_config() {
        let config = GestureConfig {
            scroll_angle_max: 45.0,
            one_finger_pan: false,
            ..Default::default()
        };

        let json = config.to_json().unwrap();
        assert_eq!(GestureConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_negative_deadzone() {
        let config = GestureConfig {
            zoom_activate_deadzone: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GestureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_smoothing_out_of_range() {
        let zero = GestureConfig {
            smoothing_factor: 0.0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let too_large = GestureConfig {
            zoom_smoothing_factor: 1.5,
            ..Default::default()
        };
        assert!(too_large.validate().is_err());
    }

    #[test]
    fn test_rejects_loose_activation() {
        let config = GestureConfig {
            movement_activate_deadzone: 0.001,
            movement_continue_deadzone: 0.01,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_angle() {
        let config = GestureConfig {
            scroll_angle_max: 120.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            GestureConfig::from_json("not json"),
            Err(GestureError::JsonError(_))
        ));
    }
}
