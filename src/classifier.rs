//! Gesture classification
//!
//! This module turns a stream of per-tick contact snapshots into scroll, pan
//! and zoom gestures. One session is tracked at a time; it starts when the
//! finger count enters a tracked count (one or two fingers) and ends when the
//! count or the set of contact ids changes.
//!
//! A two-finger session moves through:
//! 1. `Starting` - initial midpoint, separation and finger axis are recorded
//! 2. Lock - once the fingers are moving fast enough, a separation change
//!    past the zoom deadzone locks `Zooming`; otherwise midpoint drift past
//!    the movement deadzone locks `Scrolling` or `Panning` by angle
//! 3. Locked updates - per-frame deltas with continuation deadzones, until
//!    the session ends
//!
//! Zoom is tested before movement, so a pinch with incidental drift never
//! becomes a pan. Once locked, the kind cannot change within the session.

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::GestureConfig;
use crate::error::GestureError;
use crate::geometry::{
    apply_deadzone, classify_movement, mean_speed_squared, Point, TwoFingerMetrics,
};
use crate::smoothing::{ExponentialSmoother, SmoothedPoint};
use crate::types::{
    Contact, GestureEvent, GestureKind, GesturePhase, GestureState, GestureValues, SessionSummary,
    Snapshot,
};

/// Neutral zoom scale
const NEUTRAL_SCALE: f32 = 1.0;

/// Derived scalars for one tick of a session
#[derive(Debug, Clone, Copy)]
struct Measurement {
    midpoint: Point,
    distance: f32,
    axis: Point,
}

impl Measurement {
    fn from_contacts(contacts: &[Contact]) -> Self {
        match contacts {
            [first, second] => {
                let metrics = TwoFingerMetrics::from_contacts(first, second);
                Self {
                    midpoint: metrics.midpoint,
                    distance: metrics.distance,
                    axis: metrics.axis,
                }
            }
            [single] => Self {
                midpoint: single.position(),
                distance: 0.0,
                axis: Point::ZERO,
            },
            _ => Self {
                midpoint: Point::ZERO,
                distance: 0.0,
                axis: Point::ZERO,
            },
        }
    }
}

/// One continuous gesture attempt
#[derive(Debug, Clone)]
struct Session {
    id: Uuid,
    /// Contact ids this session follows, ascending
    contact_ids: Vec<i32>,
    state: GestureState,
    initial_midpoint: Point,
    initial_distance: f32,
    initial_axis: Point,
    last_midpoint: Point,
    last_distance: f32,
    last_delta: Point,
    last_scale: f32,
    total: Point,
    total_scale: f32,
    elapsed: f64,
}

impl Session {
    fn begin(contact_ids: Vec<i32>, measurement: Measurement) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_ids,
            state: GestureState::Starting,
            initial_midpoint: measurement.midpoint,
            initial_distance: measurement.distance,
            initial_axis: measurement.axis,
            last_midpoint: measurement.midpoint,
            last_distance: measurement.distance,
            last_delta: Point::ZERO,
            last_scale: NEUTRAL_SCALE,
            total: Point::ZERO,
            total_scale: NEUTRAL_SCALE,
            elapsed: 0.0,
        }
    }

    fn fingers(&self) -> usize {
        self.contact_ids.len()
    }

    /// State as seen by hosts. A pending single finger reads as idle.
    fn public_state(&self) -> GestureState {
        if self.fingers() == 1 && self.state == GestureState::Starting {
            GestureState::Idle
        } else {
            self.state
        }
    }
}

/// Real-time scroll/pan/zoom classifier.
///
/// Drive it with [`update`](Self::update) once per frame. Events produced
/// during a tick are returned from `update`; the smoothed per-kind values are
/// available through the pull accessors until the next tick.
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    config: GestureConfig,
    session: Option<Session>,
    scroll: SmoothedPoint,
    pan: SmoothedPoint,
    zoom: ExponentialSmoother,
    center: SmoothedPoint,
    events: Vec<GestureEvent>,
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureClassifier {
    /// Create a classifier with default thresholds
    pub fn new() -> Self {
        Self::build(GestureConfig::default())
    }

    /// Create a classifier with custom thresholds
    pub fn with_config(config: GestureConfig) -> Result<Self, GestureError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: GestureConfig) -> Self {
        Self {
            scroll: SmoothedPoint::new(Point::ZERO, config.smoothing_factor),
            pan: SmoothedPoint::new(Point::ZERO, config.smoothing_factor),
            zoom: ExponentialSmoother::new(NEUTRAL_SCALE, config.zoom_smoothing_factor),
            center: SmoothedPoint::new(Point::ZERO, config.smoothing_factor),
            session: None,
            events: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Advance the state machine by one tick.
    ///
    /// `dt` is the time since the previous tick in seconds. Returns the
    /// events emitted during this tick, in order.
    pub fn update(&mut self, snapshot: &Snapshot, dt: f64) -> &[GestureEvent] {
        self.events.clear();

        let dt = if dt.is_finite() && dt > 0.0 {
            dt
        } else {
            warn!(dt, "non-positive frame time, session clock not advanced");
            0.0
        };

        let tracked = self.is_tracked_count(snapshot.len());
        let contact_ids = snapshot.ids();

        let session_changed = match &self.session {
            Some(session) => !tracked || session.contact_ids != contact_ids,
            None => false,
        };
        if session_changed {
            self.end_session();
        }

        if tracked {
            let contacts: Vec<Contact> = snapshot.iter().copied().collect();
            let measurement = Measurement::from_contacts(&contacts);

            match self.session.take() {
                Some(session) => self.advance(session, &contacts, measurement, dt),
                None => {
                    let session = Session::begin(contact_ids, measurement);
                    debug!(
                        session_id = %session.id,
                        fingers = session.fingers(),
                        midpoint_x = measurement.midpoint.x,
                        midpoint_y = measurement.midpoint.y,
                        distance = measurement.distance,
                        "gesture session started"
                    );
                    self.session = Some(session);
                }
            }
        }

        self.decay_inactive();
        &self.events
    }

    /// Events emitted by the most recent `update`
    pub fn last_events(&self) -> &[GestureEvent] {
        &self.events
    }

    /// Current classification state
    pub fn state(&self) -> GestureState {
        self.session
            .as_ref()
            .map(Session::public_state)
            .unwrap_or(GestureState::Idle)
    }

    /// Whether the current session has committed to a gesture kind
    pub fn is_locked(&self) -> bool {
        self.state().is_locked()
    }

    /// Smoothed scroll delta, zero unless scrolling
    pub fn scroll_delta(&self) -> Point {
        if self.state() == GestureState::Scrolling {
            self.scroll.value()
        } else {
            Point::ZERO
        }
    }

    /// Smoothed pan delta, zero unless panning
    pub fn pan_delta(&self) -> Point {
        if self.state() == GestureState::Panning {
            self.pan.value()
        } else {
            Point::ZERO
        }
    }

    /// Smoothed zoom scale factor, 1.0 unless zooming
    pub fn zoom_factor(&self) -> f32 {
        if self.state() == GestureState::Zooming {
            self.zoom.value()
        } else {
            NEUTRAL_SCALE
        }
    }

    /// Smoothed zoom center, only while zooming
    pub fn center(&self) -> Option<Point> {
        (self.state() == GestureState::Zooming).then(|| self.center.value())
    }

    /// Snapshot of the active session, if any
    pub fn session(&self) -> Option<SessionSummary> {
        self.session.as_ref().map(|session| SessionSummary {
            session_id: session.id,
            fingers: session.fingers(),
            state: session.public_state(),
            locked: session.state.is_locked(),
            initial_midpoint: session.initial_midpoint,
            initial_distance: session.initial_distance,
            last_midpoint: session.last_midpoint,
            last_distance: session.last_distance,
            total_x: session.total.x,
            total_y: session.total.y,
            total_scale: session.total_scale,
            elapsed: session.elapsed,
        })
    }

    /// Drop the current session without emitting events and clear smoothing
    pub fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(session_id = %session.id, "gesture session discarded");
        }
        self.events.clear();
        self.scroll.snap(Point::ZERO);
        self.pan.snap(Point::ZERO);
        self.zoom.reset();
    }

    fn is_tracked_count(&self, count: usize) -> bool {
        match count {
            2 => true,
            1 => self.config.one_finger_pan,
            _ => false,
        }
    }

    fn advance(&mut self, mut session: Session, contacts: &[Contact], now: Measurement, dt: f64) {
        session.elapsed += dt;

        if !session.state.is_locked() {
            match self.try_lock(&session, contacts, now) {
                Some(kind) => {
                    session.state = kind.locked_state();
                    if kind == GestureKind::Zoom {
                        self.center.snap(now.midpoint);
                    }
                    debug!(
                        session_id = %session.id,
                        kind = kind.as_str(),
                        drift = (now.midpoint - session.initial_midpoint).length(),
                        distance_change = now.distance - session.initial_distance,
                        "gesture locked"
                    );
                    let values = self.start_values(kind, now);
                    self.emit(&session, kind, GesturePhase::Start, values);
                }
                None => {
                    session.last_midpoint = now.midpoint;
                    session.last_distance = now.distance;
                    self.session = Some(session);
                    return;
                }
            }
        }

        if let Some(kind) = session.state.kind() {
            self.emit_locked_update(&mut session, kind, now);
        }

        session.last_midpoint = now.midpoint;
        session.last_distance = now.distance;
        self.session = Some(session);
    }

    /// Decide whether a pending session locks on this tick
    fn try_lock(
        &self,
        session: &Session,
        contacts: &[Contact],
        now: Measurement,
    ) -> Option<GestureKind> {
        let speed_squared = mean_speed_squared(contacts);
        if speed_squared < self.config.velocity_start_threshold {
            trace!(speed_squared, "below start velocity");
            return None;
        }

        let drift = now.midpoint - session.initial_midpoint;

        if session.fingers() == 1 {
            return (drift.length() > self.config.movement_activate_deadzone)
                .then_some(GestureKind::Pan);
        }

        let distance_change = now.distance - session.initial_distance;
        if distance_change.abs() > self.config.zoom_activate_deadzone
            && now.distance > self.config.min_zoom_distance
        {
            return Some(GestureKind::Zoom);
        }

        if drift.length() > self.config.movement_activate_deadzone {
            return Some(classify_movement(
                drift,
                session.initial_axis,
                self.config.scroll_reference,
                self.config.scroll_angle_max,
            ));
        }

        None
    }

    fn start_values(&self, kind: GestureKind, now: Measurement) -> GestureValues {
        match kind {
            GestureKind::Scroll | GestureKind::Pan => GestureValues::Translation {
                dx: 0.0,
                dy: 0.0,
                total_x: 0.0,
                total_y: 0.0,
            },
            GestureKind::Zoom => GestureValues::Zoom {
                scale: NEUTRAL_SCALE,
                total_scale: NEUTRAL_SCALE,
                center: now.midpoint,
            },
        }
    }

    fn emit_locked_update(&mut self, session: &mut Session, kind: GestureKind, now: Measurement) {
        let frame_delta = now.midpoint - session.last_midpoint;
        let delta = Point::new(
            apply_deadzone(frame_delta.x, self.config.movement_continue_deadzone),
            apply_deadzone(frame_delta.y, self.config.movement_continue_deadzone),
        );

        let values = match kind {
            GestureKind::Scroll | GestureKind::Pan => {
                session.total += delta;
                session.last_delta = delta;
                let smoother = if kind == GestureKind::Scroll {
                    &mut self.scroll
                } else {
                    &mut self.pan
                };
                smoother.push(delta);

                GestureValues::Translation {
                    dx: delta.x,
                    dy: delta.y,
                    total_x: session.total.x,
                    total_y: session.total.y,
                }
            }
            GestureKind::Zoom => {
                let distance_delta = apply_deadzone(
                    now.distance - session.last_distance,
                    self.config.zoom_continue_deadzone,
                );
                let scale = if session.last_distance > self.config.min_zoom_distance {
                    let ratio = distance_delta / session.last_distance;
                    NEUTRAL_SCALE + ratio * self.config.zoom_sensitivity
                } else {
                    NEUTRAL_SCALE
                };
                session.last_scale = scale;
                session.total_scale *= scale;
                self.zoom.push(scale);
                let center = self.center.push(now.midpoint);

                GestureValues::Zoom {
                    scale,
                    total_scale: session.total_scale,
                    center,
                }
            }
        };

        trace!(session_id = %session.id, kind = kind.as_str(), ?values, "gesture update");
        self.emit(session, kind, GesturePhase::Update, values);
    }

    /// Close the current session, emitting `End` if it was locked
    fn end_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Some(kind) = session.state.kind() {
            let values = match kind {
                GestureKind::Scroll | GestureKind::Pan => GestureValues::Translation {
                    dx: session.last_delta.x,
                    dy: session.last_delta.y,
                    total_x: session.total.x,
                    total_y: session.total.y,
                },
                GestureKind::Zoom => GestureValues::Zoom {
                    scale: session.last_scale,
                    total_scale: session.total_scale,
                    center: self.center.value(),
                },
            };
            self.emit(&session, kind, GesturePhase::End, values);
        }

        debug!(
            session_id = %session.id,
            state = session.state.as_str(),
            elapsed = session.elapsed,
            "gesture session ended"
        );
    }

    /// Relax every smoother that is not feeding the locked kind
    fn decay_inactive(&mut self) {
        let active = self.session.as_ref().and_then(|s| s.state.kind());
        if active != Some(GestureKind::Scroll) {
            self.scroll.decay();
        }
        if active != Some(GestureKind::Pan) {
            self.pan.decay();
        }
        if active != Some(GestureKind::Zoom) {
            self.zoom.decay();
        }
    }

    fn emit(
        &mut self,
        session: &Session,
        kind: GestureKind,
        phase: GesturePhase,
        values: GestureValues,
    ) {
        self.events.push(GestureEvent {
            session_id: session.id,
            kind,
            phase,
            values,
            elapsed: session.elapsed,
        });
    }
}
