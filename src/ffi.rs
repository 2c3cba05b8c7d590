//! FFI bindings for trackpad gestures
//!
//! C-compatible functions for driving the classifier from a host runtime.
//! Contacts cross the boundary as `TrackpadFinger` arrays (the same layout the
//! native driver binding reports). Hosts may poll the classifier after each
//! update, register a callback that fires inside update, or both.
//!
//! The capture half mirrors the driver binding: `tg_trackpad_open` sets up the
//! frame buffer, the driver thread calls `tg_frame_publish` for every frame,
//! and the frame loop copies frames out with `tg_trackpad_poll`.
//!
//! Strings returned by this module must be freed with `tg_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;

use parking_lot::Mutex;

use crate::capture::{CaptureBackend, FrameWriter, Trackpad, MAX_CONTACTS};
use crate::classifier::GestureClassifier;
use crate::config::GestureConfig;
use crate::types::{Contact, ContactState, GestureEvent, GestureKind, GesturePhase, Snapshot};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// One finger as reported by the native driver
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackpadFinger {
    pub id: i32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub angle: f32,
    pub major_axis: f32,
    pub minor_axis: f32,
    pub size: f32,
    pub state: i32,
}

impl From<&TrackpadFinger> for Contact {
    fn from(finger: &TrackpadFinger) -> Self {
        Contact {
            id: finger.id,
            x: finger.x,
            y: finger.y,
            vx: finger.vx,
            vy: finger.vy,
            angle: finger.angle,
            major_axis: finger.major_axis,
            minor_axis: finger.minor_axis,
            size: finger.size,
            state: ContactState::try_from(finger.state).unwrap_or(ContactState::NotTracking),
        }
    }
}

impl From<&Contact> for TrackpadFinger {
    fn from(contact: &Contact) -> Self {
        TrackpadFinger {
            id: contact.id,
            x: contact.x,
            y: contact.y,
            vx: contact.vx,
            vy: contact.vy,
            angle: contact.angle,
            major_axis: contact.major_axis,
            minor_axis: contact.minor_axis,
            size: contact.size,
            state: contact.state.code(),
        }
    }
}

/// Gesture callback: `(kind, phase, a, b, user_data)`.
///
/// `kind`: 0 scroll, 1 pan, 2 zoom. `phase`: 0 start, 1 update, 2 end.
/// `a, b` are `dx, dy` for scroll/pan and `scale, total_scale` for zoom.
pub type GestureCallback =
    extern "C" fn(kind: i32, phase: i32, a: f32, b: f32, user_data: *mut c_void);

fn kind_code(kind: GestureKind) -> i32 {
    match kind {
        GestureKind::Scroll => 0,
        GestureKind::Pan => 1,
        GestureKind::Zoom => 2,
    }
}

fn phase_code(phase: GesturePhase) -> i32 {
    match phase {
        GesturePhase::Start => 0,
        GesturePhase::Update => 1,
        GesturePhase::End => 2,
    }
}

/// Opaque handle to a classifier
pub struct ClassifierHandle {
    classifier: GestureClassifier,
    callback: Option<(GestureCallback, *mut c_void)>,
}

impl ClassifierHandle {
    fn new(classifier: GestureClassifier) -> *mut ClassifierHandle {
        Box::into_raw(Box::new(ClassifierHandle {
            classifier,
            callback: None,
        }))
    }

    fn dispatch(&self, events: &[GestureEvent]) {
        if let Some((callback, user_data)) = self.callback {
            for event in events {
                let (a, b) = event.values.pair();
                callback(kind_code(event.kind), phase_code(event.phase), a, b, user_data);
            }
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Create a classifier with default thresholds.
///
/// # Safety
/// - Returns a pointer that must be freed with `tg_classifier_free`.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_new() -> *mut ClassifierHandle {
    clear_last_error();
    ClassifierHandle::new(GestureClassifier::new())
}

/// Create a classifier from a JSON configuration.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Returns a pointer that must be freed with `tg_classifier_free`.
/// - Returns NULL on error; call `tg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_new_with_config(
    config_json: *const c_char,
) -> *mut ClassifierHandle {
    clear_last_error();

    let json = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    let classifier = GestureConfig::from_json(&json).and_then(GestureClassifier::with_config);
    match classifier {
        Ok(classifier) => ClassifierHandle::new(classifier),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a classifier.
///
/// # Safety
/// - `handle` must be a pointer returned by `tg_classifier_new*`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_free(handle: *mut ClassifierHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Drop the current session without emitting events.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_classifier_new*`.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_reset(handle: *mut ClassifierHandle) {
    if let Some(handle) = handle.as_mut() {
        handle.classifier.reset();
    }
}

// ============================================================================
// Update and callbacks
// ============================================================================

/// Register (or clear, with NULL) the gesture callback.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_classifier_new*`.
/// - `user_data` is passed back untouched; it must stay valid while registered.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_set_callback(
    handle: *mut ClassifierHandle,
    callback: Option<GestureCallback>,
    user_data: *mut c_void,
) -> i32 {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Null classifier pointer");
        return -1;
    };

    handle.callback = callback.map(|cb| (cb, user_data));
    0
}

/// Advance the classifier by one tick.
///
/// Returns the number of gesture events produced, or -1 on error. Registered
/// callbacks run before this function returns.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_classifier_new*`.
/// - `fingers` must point to `count` readable `TrackpadFinger` values
///   (it may be NULL when `count` is 0).
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_update(
    handle: *mut ClassifierHandle,
    fingers: *const TrackpadFinger,
    count: i32,
    dt: f64,
) -> i32 {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Null classifier pointer");
        return -1;
    };

    let fingers: &[TrackpadFinger] = if count <= 0 {
        &[]
    } else if fingers.is_null() {
        set_last_error("Null fingers pointer with non-zero count");
        return -1;
    } else {
        std::slice::from_raw_parts(fingers, count as usize)
    };

    let snapshot: Snapshot = fingers.iter().map(Contact::from).collect();
    let events = handle.classifier.update(&snapshot, dt).to_vec();
    handle.dispatch(&events);
    events.len() as i32
}

// ============================================================================
// Polling accessors
// ============================================================================

/// Current state: 0 idle, 1 starting, 2 scrolling, 3 panning, 4 zooming.
/// Returns -1 for a NULL handle.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_classifier_new*`.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_state(handle: *const ClassifierHandle) -> i32 {
    match handle.as_ref() {
        Some(handle) => handle.classifier.state().code(),
        None => -1,
    }
}

unsafe fn write_pair(x_out: *mut f32, y_out: *mut f32, x: f32, y: f32) {
    if let Some(x_out) = x_out.as_mut() {
        *x_out = x;
    }
    if let Some(y_out) = y_out.as_mut() {
        *y_out = y;
    }
}

/// Smoothed scroll delta (0, 0 unless scrolling).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_classifier_new*`.
/// - `x_out` and `y_out` must be writable or NULL.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_scroll_delta(
    handle: *const ClassifierHandle,
    x_out: *mut f32,
    y_out: *mut f32,
) {
    let delta = handle
        .as_ref()
        .map(|h| h.classifier.scroll_delta())
        .unwrap_or_default();
    write_pair(x_out, y_out, delta.x, delta.y);
}

/// Smoothed pan delta (0, 0 unless panning).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_classifier_new*`.
/// - `x_out` and `y_out` must be writable or NULL.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_pan_delta(
    handle: *const ClassifierHandle,
    x_out: *mut f32,
    y_out: *mut f32,
) {
    let delta = handle
        .as_ref()
        .map(|h| h.classifier.pan_delta())
        .unwrap_or_default();
    write_pair(x_out, y_out, delta.x, delta.y);
}

/// Smoothed zoom factor (1.0 unless zooming).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_classifier_new*`.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_zoom_factor(handle: *const ClassifierHandle) -> f32 {
    handle
        .as_ref()
        .map(|h| h.classifier.zoom_factor())
        .unwrap_or(1.0)
}

/// Zoom center. Returns 1 and writes the center while zooming, 0 otherwise.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_classifier_new*`.
/// - `x_out` and `y_out` must be writable or NULL.
#[no_mangle]
pub unsafe extern "C" fn tg_classifier_center(
    handle: *const ClassifierHandle,
    x_out: *mut f32,
    y_out: *mut f32,
) -> i32 {
    match handle.as_ref().and_then(|h| h.classifier.center()) {
        Some(center) => {
            write_pair(x_out, y_out, center.x, center.y);
            1
        }
        None => 0,
    }
}

// ============================================================================
// Capture
// ============================================================================

// Writer of the open trackpad, reached from the driver callback
static DRIVER_WRITER: Mutex<Option<FrameWriter>> = parking_lot::const_mutex(None);

/// Backend fed by a native driver through `tg_frame_publish`
struct DriverCallbackBackend;

impl CaptureBackend for DriverCallbackBackend {
    fn name(&self) -> &str {
        "driver-callback"
    }

    fn start(&mut self, writer: FrameWriter) -> Result<(), String> {
        let mut slot = DRIVER_WRITER.lock();
        if slot.is_some() {
            return Err("another trackpad is already open".to_string());
        }
        *slot = Some(writer);
        Ok(())
    }

    fn stop(&mut self) {
        DRIVER_WRITER.lock().take();
    }
}

/// Opaque handle to an open trackpad
pub struct TrackpadHandle {
    trackpad: Trackpad<DriverCallbackBackend>,
}

/// Open the trackpad frame buffer.
///
/// Only one trackpad may be open per process. Once open, the driver
/// delivers frames by calling `tg_frame_publish`.
///
/// # Safety
/// - Returns a pointer that must be released with `tg_trackpad_close`.
/// - Returns NULL on error; call `tg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tg_trackpad_open() -> *mut TrackpadHandle {
    clear_last_error();

    let mut trackpad = Trackpad::new(DriverCallbackBackend);
    match trackpad.open() {
        Ok(()) => Box::into_raw(Box::new(TrackpadHandle { trackpad })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Publish one driver frame. Shaped to be called from the driver's
/// `(nFingers, fingers)` callback on its own thread.
///
/// Returns 0, or -1 if no trackpad is open or `fingers` is NULL with a
/// non-zero count.
///
/// # Safety
/// - `fingers` must point to `count` readable `TrackpadFinger` values
///   (it may be NULL when `count` is 0).
#[no_mangle]
pub unsafe extern "C" fn tg_frame_publish(count: i32, fingers: *const TrackpadFinger) -> i32 {
    let fingers: &[TrackpadFinger] = if count <= 0 {
        &[]
    } else if fingers.is_null() {
        set_last_error("Null fingers pointer with non-zero count");
        return -1;
    } else {
        std::slice::from_raw_parts(fingers, count as usize)
    };

    let slot = DRIVER_WRITER.lock();
    let Some(writer) = slot.as_ref() else {
        set_last_error("No trackpad is open");
        return -1;
    };

    let contacts: Vec<Contact> = fingers.iter().map(Contact::from).collect();
    writer.publish(&contacts);
    0
}

/// Copy the latest frame into `out`.
///
/// Returns the number of fingers written (at most `max_fingers`), or -1 on
/// error.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_trackpad_open`.
/// - `out` must point to `max_fingers` writable `TrackpadFinger` values.
#[no_mangle]
pub unsafe extern "C" fn tg_trackpad_poll(
    handle: *const TrackpadHandle,
    out: *mut TrackpadFinger,
    max_fingers: i32,
) -> i32 {
    clear_last_error();

    let Some(handle) = handle.as_ref() else {
        set_last_error("Null trackpad pointer");
        return -1;
    };
    if max_fingers <= 0 {
        return 0;
    }
    if out.is_null() {
        set_last_error("Null output pointer");
        return -1;
    }

    let mut contacts = vec![Contact::new(0, 0.0, 0.0); (max_fingers as usize).min(MAX_CONTACTS)];
    let written = match handle.trackpad.poll_into(&mut contacts) {
        Ok(written) => written,
        Err(e) => {
            set_last_error(&e.to_string());
            return -1;
        }
    };

    let out = std::slice::from_raw_parts_mut(out, written);
    for (slot, contact) in out.iter_mut().zip(&contacts) {
        *slot = TrackpadFinger::from(contact);
    }
    written as i32
}

/// Clear the current frame.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `tg_trackpad_open`.
#[no_mangle]
pub unsafe extern "C" fn tg_trackpad_reset(handle: *const TrackpadHandle) -> i32 {
    match handle.as_ref() {
        Some(handle) => {
            handle.trackpad.reset();
            0
        }
        None => {
            set_last_error("Null trackpad pointer");
            -1
        }
    }
}

/// Stop capture and release the trackpad.
///
/// # Safety
/// - `handle` must be a pointer returned by `tg_trackpad_open`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tg_trackpad_close(handle: *mut TrackpadHandle) {
    if !handle.is_null() {
        let mut handle = Box::from_raw(handle);
        handle.trackpad.close();
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a static string that is valid until the next error.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error has occurred.
#[no_mangle]
pub unsafe extern "C" fn tg_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Serialize the default configuration as JSON.
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `tg_free_string`.
#[no_mangle]
pub unsafe extern "C" fn tg_default_config_json() -> *mut c_char {
    clear_last_error();
    match GestureConfig::default().to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a string allocated by this library.
///
/// # Safety
/// - `s` must be a pointer returned by a function in this module, or NULL.
#[no_mangle]
pub unsafe extern "C" fn tg_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn tg_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finger(id: i32, x: f32, y: f32, vx: f32) -> TrackpadFinger {
        TrackpadFinger {
            id,
            x,
            y,
            vx,
            state: ContactState::Touching.code(),
            ..Default::default()
        }
    }

    fn pair(distance: f32) -> [TrackpadFinger; 2] {
        [
            finger(1, 0.5 - distance / 2.0, 0.5, -0.5),
            finger(2, 0.5 + distance / 2.0, 0.5, 0.5),
        ]
    }

    extern "C" fn count_events(kind: i32, phase: i32, _a: f32, _b: f32, user_data: *mut c_void) {
        let log = unsafe { &mut *(user_data as *mut Vec<(i32, i32)>) };
        log.push((kind, phase));
    }

    #[test]
    fn test_ffi_polling_lifecycle() {
        unsafe {
            let handle = tg_classifier_new();
            assert!(!handle.is_null());

            assert_eq!(tg_classifier_update(handle, pair(0.10).as_ptr(), 2, 1.0 / 60.0), 0);
            assert_eq!(tg_classifier_state(handle), 1);

            assert_eq!(tg_classifier_update(handle, pair(0.16).as_ptr(), 2, 1.0 / 60.0), 2);
            assert_eq!(tg_classifier_state(handle), 4);
            assert!(tg_classifier_zoom_factor(handle) > 1.0);

            let (mut x, mut y) = (0.0f32, 0.0f32);
            assert_eq!(tg_classifier_center(handle, &mut x, &mut y), 1);
            assert!((x - 0.5).abs() < 1e-5);

            tg_classifier_scroll_delta(handle, &mut x, &mut y);
            assert_eq!((x, y), (0.0, 0.0));

            assert_eq!(tg_classifier_update(handle, ptr::null(), 0, 1.0 / 60.0), 1);
            assert_eq!(tg_classifier_state(handle), 0);
            assert_eq!(tg_classifier_center(handle, &mut x, &mut y), 0);

            tg_classifier_free(handle);
        }
    }

    #[test]
    fn test_ffi_callback_binding() {
        unsafe {
            let handle = tg_classifier_new();
            let mut log: Vec<(i32, i32)> = Vec::new();
            let user_data = &mut log as *mut Vec<(i32, i32)> as *mut c_void;
            assert_eq!(tg_classifier_set_callback(handle, Some(count_events), user_data), 0);

            tg_classifier_update(handle, pair(0.10).as_ptr(), 2, 1.0 / 60.0);
            tg_classifier_update(handle, pair(0.16).as_ptr(), 2, 1.0 / 60.0);
            tg_classifier_update(handle, ptr::null(), 0, 1.0 / 60.0);

            tg_classifier_set_callback(handle, None, ptr::null_mut());
            tg_classifier_free(handle);

            assert_eq!(log, vec![(2, 0), (2, 1), (2, 2)]);
        }
    }

    #[test]
    fn test_ffi_config_errors() {
        unsafe {
            let bad = CString::new(r#"{"smoothing_factor": 3.0}"#).unwrap();
            let handle = tg_classifier_new_with_config(bad.as_ptr());
            assert!(handle.is_null());

            let error = CStr::from_ptr(tg_last_error()).to_str().unwrap();
            assert!(error.contains("smoothing_factor"));

            let good = CString::new(r#"{"zoom_sensitivity": 2.0}"#).unwrap();
            let handle = tg_classifier_new_with_config(good.as_ptr());
            assert!(!handle.is_null());
            assert!(tg_last_error().is_null());
            tg_classifier_free(handle);
        }
    }

    #[test]
    fn test_ffi_update_errors() {
        unsafe {
            assert_eq!(tg_classifier_update(ptr::null_mut(), ptr::null(), 0, 0.01), -1);
            assert!(!tg_last_error().is_null());

            let handle = tg_classifier_new();
            assert_eq!(tg_classifier_update(handle, ptr::null(), 2, 0.01), -1);
            assert_eq!(tg_classifier_state(ptr::null()), -1);
            tg_classifier_free(handle);
        }
    }

    // The driver writer is process-wide, so the whole capture lifecycle
    // lives in one test.
    #[test]
    fn test_ffi_capture_round_trip() {
        unsafe {
            let handle = tg_trackpad_open();
            assert!(!handle.is_null());

            assert!(tg_trackpad_open().is_null());
            let error = CStr::from_ptr(tg_last_error()).to_str().unwrap();
            assert!(error.contains("already open"));

            let mut frame = pair(0.10);
            frame[1].major_axis = 0.03;
            frame[1].state = ContactState::Active.code();
            assert_eq!(tg_frame_publish(2, frame.as_ptr()), 0);

            let mut out = [TrackpadFinger::default(); 4];
            assert_eq!(tg_trackpad_poll(handle, out.as_mut_ptr(), 4), 2);
            assert_eq!(out[0].id, 1);
            assert_eq!(out[1].id, 2);
            assert!((out[1].x - 0.55).abs() < 1e-6);
            assert_eq!(out[1].vx, 0.5);
            assert_eq!(out[1].major_axis, 0.03);
            assert_eq!(out[1].state, ContactState::Active.code());
            assert_eq!(out[2].id, 0);

            let mut one = [TrackpadFinger::default(); 1];
            assert_eq!(tg_trackpad_poll(handle, one.as_mut_ptr(), 1), 1);
            assert_eq!(one[0].id, 1);

            assert_eq!(tg_frame_publish(2, ptr::null()), -1);

            assert_eq!(tg_trackpad_reset(handle), 0);
            assert_eq!(tg_trackpad_poll(handle, out.as_mut_ptr(), 4), 0);
            assert_eq!(tg_trackpad_poll(ptr::null(), out.as_mut_ptr(), 4), -1);

            tg_trackpad_close(handle);
            assert_eq!(tg_frame_publish(2, frame.as_ptr()), -1);
            let error = CStr::from_ptr(tg_last_error()).to_str().unwrap();
            assert!(error.contains("No trackpad is open"));

            let reopened = tg_trackpad_open();
            assert!(!reopened.is_null());
            tg_trackpad_close(reopened);
        }
    }

    #[test]
    fn test_finger_conversion() {
        let mut raw = finger(3, 0.2, 0.4, 0.1);
        raw.state = 42;
        let contact = Contact::from(&raw);
        assert_eq!(contact.state, ContactState::NotTracking);

        let back = TrackpadFinger::from(&Contact::new(7, 0.3, 0.6));
        assert_eq!(back.id, 7);
        assert_eq!(back.state, ContactState::Touching.code());
    }

    #[test]
    fn test_ffi_version_and_default_config() {
        unsafe {
            let version = CStr::from_ptr(tg_version()).to_str().unwrap();
            assert_eq!(version, env!("CARGO_PKG_VERSION"));

            let json = tg_default_config_json();
            assert!(!json.is_null());
            let text = CStr::from_ptr(json).to_str().unwrap();
            assert!(text.contains("movement_activate_deadzone"));
            tg_free_string(json);
        }
    }
}
