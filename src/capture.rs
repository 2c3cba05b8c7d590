//! Contact capture
//!
//! The driver reports contacts from its own thread; the host polls from its
//! frame loop. The two meet at a single mutex-guarded frame slot:
//! - Writer (driver callback): copies one frame in, bounded by `MAX_CONTACTS`
//! - Reader (frame loop): copies the whole slot out
//!
//! Both copies happen under the same lock, so a reader sees either the new
//! frame or the previous one, never a mix. Only owned `Contact` values cross
//! the thread boundary.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::GestureError;
use crate::recording::RecordedFrame;
use crate::types::{Contact, Snapshot};

/// Most contacts kept per frame
pub const MAX_CONTACTS: usize = 16;

#[derive(Debug, Default)]
struct FrameSlot {
    contacts: Vec<Contact>,
    sequence: u64,
}

/// Shared single-frame buffer between a capture thread and a polling thread
pub struct FrameBuffer;

impl FrameBuffer {
    /// Create a connected writer/reader pair
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (FrameWriter, FrameReader) {
        let slot = Arc::new(Mutex::new(FrameSlot {
            contacts: Vec::with_capacity(MAX_CONTACTS),
            sequence: 0,
        }));
        (
            FrameWriter {
                slot: Arc::clone(&slot),
            },
            FrameReader { slot },
        )
    }
}

/// Driver-side half of the frame buffer
#[derive(Clone)]
pub struct FrameWriter {
    slot: Arc<Mutex<FrameSlot>>,
}

impl FrameWriter {
    /// Replace the current frame. Contacts past `MAX_CONTACTS` are dropped.
    pub fn publish(&self, contacts: &[Contact]) {
        let kept = &contacts[..contacts.len().min(MAX_CONTACTS)];
        if kept.len() < contacts.len() {
            warn!(
                reported = contacts.len(),
                kept = MAX_CONTACTS,
                "frame exceeds contact capacity, extra contacts dropped"
            );
        }

        let mut slot = self.slot.lock();
        slot.contacts.clear();
        slot.contacts.extend_from_slice(kept);
        slot.sequence += 1;
    }

    /// Publish an empty frame
    pub fn clear(&self) {
        self.publish(&[]);
    }
}

/// Polling-side half of the frame buffer
pub struct FrameReader {
    slot: Arc<Mutex<FrameSlot>>,
}

impl FrameReader {
    /// Copy the latest frame out as a snapshot
    pub fn snapshot(&self) -> Snapshot {
        let contacts = self.read();
        Snapshot::from_contacts(&contacts)
    }

    /// Copy the latest frame's raw contacts
    pub fn read(&self) -> Vec<Contact> {
        self.slot.lock().contacts.clone()
    }

    /// Copy contacts into a caller buffer, returning how many were written
    pub fn read_into(&self, out: &mut [Contact]) -> usize {
        let slot = self.slot.lock();
        let count = slot.contacts.len().min(out.len());
        out[..count].copy_from_slice(&slot.contacts[..count]);
        count
    }

    /// Number of frames published so far
    pub fn sequence(&self) -> u64 {
        self.slot.lock().sequence
    }

    /// Number of contacts in the latest frame
    pub fn finger_count(&self) -> usize {
        self.slot.lock().contacts.len()
    }
}

/// Source of contact frames, typically a native driver binding
pub trait CaptureBackend {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Begin delivering frames through `writer`
    fn start(&mut self, writer: FrameWriter) -> Result<(), String>;

    /// Stop delivering frames. Must be safe to call when not started.
    fn stop(&mut self);
}

/// Owned trackpad device with an explicit open/close lifecycle
pub struct Trackpad<B: CaptureBackend> {
    backend: B,
    writer: FrameWriter,
    reader: FrameReader,
    open: bool,
}

impl<B: CaptureBackend> Trackpad<B> {
    pub fn new(backend: B) -> Self {
        let (writer, reader) = FrameBuffer::new();
        Self {
            backend,
            writer,
            reader,
            open: false,
        }
    }

    /// Start capture
    pub fn open(&mut self) -> Result<(), GestureError> {
        if self.open {
            return Err(GestureError::DeviceAlreadyOpen);
        }

        self.writer.clear();
        self.backend
            .start(self.writer.clone())
            .map_err(|reason| GestureError::CaptureStart {
                backend: self.backend.name().to_string(),
                reason,
            })?;

        self.open = true;
        info!(backend = self.backend.name(), "trackpad capture started");
        Ok(())
    }

    /// Stop capture. Closing a closed device is a no-op.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.backend.stop();
        self.writer.clear();
        self.open = false;
        info!(backend = self.backend.name(), "trackpad capture stopped");
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Copy the latest frame
    pub fn poll(&self) -> Result<Snapshot, GestureError> {
        if !self.open {
            return Err(GestureError::DeviceNotOpen);
        }
        Ok(self.reader.snapshot())
    }

    /// Copy the latest frame into a caller buffer
    pub fn poll_into(&self, out: &mut [Contact]) -> Result<usize, GestureError> {
        if !self.open {
            return Err(GestureError::DeviceNotOpen);
        }
        Ok(self.reader.read_into(out))
    }

    /// Clear the current frame
    pub fn reset(&self) {
        debug!("trackpad frame reset");
        self.writer.clear();
    }

    /// Frames published since creation
    pub fn sequence(&self) -> u64 {
        self.reader.sequence()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: CaptureBackend> Drop for Trackpad<B> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Stop flag a playback thread can sleep on
#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn arm(&self) {
        *self.stopped.lock() = false;
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Wait out `gap` unless stopped first. Returns true if stopped.
    fn wait(&self, gap: Duration) -> bool {
        let deadline = Instant::now().checked_add(gap);
        let mut stopped = self.stopped.lock();
        while !*stopped {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                        break;
                    }
                }
                None => self.wake.wait(&mut stopped),
            }
        }
        *stopped
    }
}

/// Plays recorded frames on a background thread, honoring their timing
pub struct ReplayBackend {
    frames: Vec<RecordedFrame>,
    speed: f64,
    looped: bool,
    signal: Arc<StopSignal>,
    worker: Option<JoinHandle<()>>,
}

impl ReplayBackend {
    pub fn new(frames: Vec<RecordedFrame>) -> Self {
        Self {
            frames,
            speed: 1.0,
            looped: false,
            signal: Arc::new(StopSignal::default()),
            worker: None,
        }
    }

    /// Playback speed multiplier; values <= 0 or non-finite play frames
    /// back to back
    pub fn with_speed(mut self, speed: f64) -> Self {
        if !speed.is_finite() {
            warn!(speed, "non-finite replay speed, frames will play back to back");
        }
        self.speed = speed;
        self
    }

    /// Restart from the first frame after the last one
    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    /// Whether the playback thread is still delivering frames
    pub fn is_playing(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    /// Real time between two recorded frames. Gaps too long to represent
    /// saturate to `Duration::MAX`, which only a stop ends.
    fn gap(previous: &RecordedFrame, next: &RecordedFrame, speed: f64) -> Duration {
        if !speed.is_finite() || speed <= 0.0 {
            return Duration::ZERO;
        }
        let seconds = (next.timestamp - previous.timestamp)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let scaled = seconds / speed;
        if scaled.is_nan() {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX)
    }
}

impl CaptureBackend for ReplayBackend {
    fn name(&self) -> &str {
        "replay"
    }

    fn start(&mut self, writer: FrameWriter) -> Result<(), String> {
        if self.frames.is_empty() {
            return Err("recording has no frames".to_string());
        }

        self.signal.arm();
        let signal = Arc::clone(&self.signal);
        let frames = self.frames.clone();
        let speed = self.speed;
        let looped = self.looped;

        let worker = std::thread::Builder::new()
            .name("trackpad-replay".to_string())
            .spawn(move || loop {
                for (index, frame) in frames.iter().enumerate() {
                    let stopped = if index > 0 {
                        signal.wait(ReplayBackend::gap(&frames[index - 1], frame, speed))
                    } else {
                        signal.is_stopped()
                    };
                    if stopped {
                        return;
                    }
                    writer.publish(&frame.contacts);
                }
                if !looped {
                    return;
                }
            })
            .map_err(|e| e.to_string())?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.signal.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("replay thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::SCHEMA_VERSION;
    use chrono::{Duration as ChronoDuration, Utc};
    use pretty_assertions::assert_eq;

    /// Backend that hands its writer back to the test
    #[derive(Default)]
    struct ManualBackend {
        writer: Option<FrameWriter>,
        fail: bool,
        stops: usize,
    }

    impl CaptureBackend for ManualBackend {
        fn name(&self) -> &str {
            "manual"
        }

        fn start(&mut self, writer: FrameWriter) -> Result<(), String> {
            if self.fail {
                return Err("no device".to_string());
            }
            self.writer = Some(writer);
            Ok(())
        }

        fn stop(&mut self) {
            self.writer = None;
            self.stops += 1;
        }
    }

    #[test]
    fn test_frame_buffer_copies_latest_frame() {
        let (writer, reader) = FrameBuffer::new();
        writer.publish(&[Contact::new(1, 0.1, 0.2)]);
        writer.publish(&[Contact::new(2, 0.3, 0.4), Contact::new(3, 0.5, 0.6)]);

        let snapshot = reader.snapshot();
        assert_eq!(snapshot.ids(), vec![2, 3]);
        assert_eq!(reader.sequence(), 2);
        assert_eq!(reader.finger_count(), 2);
    }

    #[test]
    fn test_frame_buffer_caps_contacts() {
        let (writer, reader) = FrameBuffer::new();
        let many: Vec<Contact> = (0..20).map(|id| Contact::new(id, 0.5, 0.5)).collect();
        writer.publish(&many);

        assert_eq!(reader.read().len(), MAX_CONTACTS);
    }

    #[test]
    fn test_read_into_small_buffer() {
        let (writer, reader) = FrameBuffer::new();
        writer.publish(&[
            Contact::new(1, 0.1, 0.1),
            Contact::new(2, 0.2, 0.2),
            Contact::new(3, 0.3, 0.3),
        ]);

        let mut out = [Contact::new(0, 0.0, 0.0); 2];
        assert_eq!(reader.read_into(&mut out), 2);
        assert_eq!(out[1].id, 2);
    }

    #[test]
    fn test_frames_are_never_torn_across_threads() {
        let (writer, reader) = FrameBuffer::new();
        let producer = std::thread::spawn(move || {
            for n in 1..=500 {
                let frame: Vec<Contact> = (0..4)
                    .map(|id| Contact::new(id, n as f32, n as f32))
                    .collect();
                writer.publish(&frame);
            }
        });

        for _ in 0..500 {
            let contacts = reader.read();
            if let Some(first) = contacts.first() {
                assert!(contacts.iter().all(|c| c.x == first.x));
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn test_trackpad_lifecycle() {
        let mut trackpad = Trackpad::new(ManualBackend::default());
        assert!(matches!(trackpad.poll(), Err(GestureError::DeviceNotOpen)));

        trackpad.open().unwrap();
        assert!(trackpad.is_open());
        assert!(matches!(trackpad.open(), Err(GestureError::DeviceAlreadyOpen)));

        let writer = trackpad.backend().writer.clone().unwrap();
        writer.publish(&[Contact::new(5, 0.5, 0.5)]);
        assert_eq!(trackpad.poll().unwrap().ids(), vec![5]);

        trackpad.reset();
        assert!(trackpad.poll().unwrap().is_empty());

        trackpad.close();
        trackpad.close();
        assert!(!trackpad.is_open());
        assert_eq!(trackpad.backend().stops, 1);
    }

    #[test]
    fn test_trackpad_open_failure() {
        let mut trackpad = Trackpad::new(ManualBackend {
            fail: true,
            ..Default::default()
        });

        match trackpad.open() {
            Err(GestureError::CaptureStart { backend, reason }) => {
                assert_eq!(backend, "manual");
                assert_eq!(reason, "no device");
            }
            other => panic!("unexpected result {:?}", other.err()),
        }
        assert!(!trackpad.is_open());
    }

    #[test]
    fn test_replay_backend_delivers_frames() {
        let start = Utc::now();
        let frames: Vec<RecordedFrame> = (0..3)
            .map(|n| RecordedFrame {
                schema_version: SCHEMA_VERSION.to_string(),
                timestamp: start + ChronoDuration::milliseconds(n * 5),
                contacts: vec![Contact::new(n as i32, 0.5, 0.5)],
            })
            .collect();

        let mut trackpad = Trackpad::new(ReplayBackend::new(frames).with_speed(0.0));
        trackpad.open().unwrap();

        for _ in 0..200 {
            if trackpad.sequence() >= 4 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        // One clear on open plus three frames
        assert_eq!(trackpad.sequence(), 4);
        assert_eq!(trackpad.poll().unwrap().ids(), vec![2]);
        trackpad.close();
    }

    #[test]
    fn test_replay_backend_rejects_empty_recording() {
        let mut trackpad = Trackpad::new(ReplayBackend::new(Vec::new()));
        assert!(trackpad.open().is_err());
    }

    fn spaced_frames(gap_ms: i64) -> Vec<RecordedFrame> {
        let start = Utc::now();
        (0..2)
            .map(|n| {
                RecordedFrame::new(
                    start + ChronoDuration::milliseconds(n * gap_ms),
                    vec![Contact::new(n as i32, 0.5, 0.5)],
                )
            })
            .collect()
    }

    fn wait_for_sequence(trackpad: &Trackpad<ReplayBackend>, sequence: u64) {
        for _ in 0..200 {
            if trackpad.sequence() >= sequence {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_close_interrupts_long_frame_gap() {
        let mut trackpad = Trackpad::new(ReplayBackend::new(spaced_frames(3_000)));
        trackpad.open().unwrap();
        wait_for_sequence(&trackpad, 2);
        assert_eq!(trackpad.poll().unwrap().ids(), vec![0]);

        let started = Instant::now();
        trackpad.close();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!trackpad.backend().is_playing());
    }

    #[test]
    fn test_extreme_speeds_do_not_kill_playback() {
        let frames = spaced_frames(10);
        let slowest = ReplayBackend::gap(&frames[0], &frames[1], 1e-320);
        assert_eq!(slowest, Duration::MAX);
        assert_eq!(ReplayBackend::gap(&frames[0], &frames[1], f64::NAN), Duration::ZERO);
        assert_eq!(ReplayBackend::gap(&frames[0], &frames[1], f64::INFINITY), Duration::ZERO);

        let mut trackpad = Trackpad::new(ReplayBackend::new(frames).with_speed(1e-320));
        trackpad.open().unwrap();
        wait_for_sequence(&trackpad, 2);
        assert!(trackpad.backend().is_playing());

        let started = Instant::now();
        trackpad.close();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(matches!(trackpad.poll_into(&mut []), Err(GestureError::DeviceNotOpen)));
    }
}
