//! Callback dispatch
//!
//! Event-driven binding over [`GestureClassifier`]. Hosts register handlers per
//! gesture kind and phase; handlers run synchronously inside `update`, in
//! registration order, after the classifier has settled its state for the
//! tick. The pull accessors stay available through [`GestureDispatcher::classifier`].

use tracing::trace;

use crate::classifier::GestureClassifier;
use crate::types::{GestureEvent, GestureKind, GesturePhase, Snapshot};

/// Boxed gesture handler
pub type GestureHandler = Box<dyn FnMut(&GestureEvent) + Send>;

/// Token returned on registration, used to remove a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    kind: GestureKind,
    phase: GesturePhase,
    handler: GestureHandler,
}

/// Classifier plus an observer list
pub struct GestureDispatcher {
    classifier: GestureClassifier,
    handlers: Vec<Registration>,
    next_id: u64,
}

impl Default for GestureDispatcher {
    fn default() -> Self {
        Self::new(GestureClassifier::new())
    }
}

impl GestureDispatcher {
    pub fn new(classifier: GestureClassifier) -> Self {
        Self {
            classifier,
            handlers: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a handler for gesture start
    pub fn on_start<F>(&mut self, kind: GestureKind, handler: F) -> HandlerId
    where
        F: FnMut(&GestureEvent) + Send + 'static,
    {
        self.register(kind, GesturePhase::Start, Box::new(handler))
    }

    /// Register a handler for per-frame gesture updates
    pub fn on_update<F>(&mut self, kind: GestureKind, handler: F) -> HandlerId
    where
        F: FnMut(&GestureEvent) + Send + 'static,
    {
        self.register(kind, GesturePhase::Update, Box::new(handler))
    }

    /// Register a handler for gesture end
    pub fn on_end<F>(&mut self, kind: GestureKind, handler: F) -> HandlerId
    where
        F: FnMut(&GestureEvent) + Send + 'static,
    {
        self.register(kind, GesturePhase::End, Box::new(handler))
    }

    pub fn register(
        &mut self,
        kind: GestureKind,
        phase: GesturePhase,
        handler: GestureHandler,
    ) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push(Registration {
            id,
            kind,
            phase,
            handler,
        });
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|registration| registration.id != id);
        self.handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Advance the classifier and invoke matching handlers for each event.
    /// Returns the number of events produced this tick.
    pub fn update(&mut self, snapshot: &Snapshot, dt: f64) -> usize {
        let events = self.classifier.update(snapshot, dt);

        for event in events {
            for registration in self
                .handlers
                .iter_mut()
                .filter(|r| r.kind == event.kind && r.phase == event.phase)
            {
                trace!(
                    kind = event.kind.as_str(),
                    phase = event.phase.as_str(),
                    "dispatching gesture event"
                );
                (registration.handler)(event);
            }
        }

        events.len()
    }

    /// Underlying classifier for pull-style queries
    pub fn classifier(&self) -> &GestureClassifier {
        &self.classifier
    }

    pub fn into_classifier(self) -> GestureClassifier {
        self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Contact, GestureState, GestureValues};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    const DT: f64 = 1.0 / 60.0;

    fn pair(distance: f32) -> Snapshot {
        Snapshot::from_contacts(&[
            Contact::new(1, 0.5 - distance / 2.0, 0.5).with_velocity(0.5, 0.0),
            Contact::new(2, 0.5 + distance / 2.0, 0.5).with_velocity(-0.5, 0.0),
        ])
    }

    fn recorder() -> (Arc<Mutex<Vec<GestureEvent>>>, impl FnMut(&GestureEvent) + Send + 'static) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |event: &GestureEvent| sink.lock().unwrap().push(event.clone()))
    }

    #[test]
    fn test_zoom_callbacks_fire_in_order() {
        let mut dispatcher = GestureDispatcher::default();
        let (starts, on_start) = recorder();
        let (updates, on_update) = recorder();
        let (ends, on_end) = recorder();
        dispatcher.on_start(GestureKind::Zoom, on_start);
        dispatcher.on_update(GestureKind::Zoom, on_update);
        dispatcher.on_end(GestureKind::Zoom, on_end);

        dispatcher.update(&pair(0.10), DT);
        dispatcher.update(&pair(0.16), DT);
        dispatcher.update(&pair(0.20), DT);
        assert_eq!(dispatcher.classifier().state(), GestureState::Zooming);

        dispatcher.update(&Snapshot::new(), DT);
        dispatcher.update(&Snapshot::new(), DT);

        assert_eq!(starts.lock().unwrap().len(), 1);
        assert_eq!(updates.lock().unwrap().len(), 2);

        let ends = ends.lock().unwrap();
        assert_eq!(ends.len(), 1);
        let last_update = updates.lock().unwrap().last().cloned().unwrap();
        match (ends[0].values, last_update.values) {
            (GestureValues::Zoom { scale: end, .. }, GestureValues::Zoom { scale: last, .. }) => {
                assert_eq!(end, last);
            }
            other => panic!("unexpected values {:?}", other),
        }
        assert_eq!(dispatcher.classifier().state(), GestureState::Idle);
    }

    #[test]
    fn test_handlers_filtered_by_kind() {
        let mut dispatcher = GestureDispatcher::default();
        let (scrolls, on_scroll) = recorder();
        dispatcher.on_start(GestureKind::Scroll, on_scroll);

        dispatcher.update(&pair(0.10), DT);
        dispatcher.update(&pair(0.16), DT);

        assert!(scrolls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_remove_handler() {
        let mut dispatcher = GestureDispatcher::default();
        let (starts, on_start) = recorder();
        let id = dispatcher.on_start(GestureKind::Zoom, on_start);

        assert!(dispatcher.remove(id));
        assert!(!dispatcher.remove(id));
        assert_eq!(dispatcher.handler_count(), 0);

        dispatcher.update(&pair(0.10), DT);
        dispatcher.update(&pair(0.16), DT);
        assert!(starts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_returns_event_count() {
        let mut dispatcher = GestureDispatcher::default();

        assert_eq!(dispatcher.update(&pair(0.10), DT), 0);
        assert_eq!(dispatcher.update(&pair(0.16), DT), 2);
    }
}
