//! FFI bindings for mobile platforms (iOS/Android).
//!
//! The host app owns the GPS and the speech engine. It pushes fixes in,
//! calls `tracker_tick` from a timer, and speaks whatever alert texts come
//! back. All state lives in a single global tracker opened on a SQLite file.
//!
//! Calls made before `tracker_init` are logged and return a neutral value.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use log::{debug, error, info, warn};
use once_cell::sync::Lazy;

use crate::bikes::{catalog, Bike};
use crate::sampler::{PushPositionSource, RawFix, RawPositionError};
use crate::{
    init_logging, Alert, OptionExt, Result, SqliteTripRepository, TrackerConfig, TrackingSession,
};

type Tracker = TrackingSession<PushPositionSource, SqliteTripRepository>;

// ============================================================================
// Global Singleton
// ============================================================================

/// Global tracker instance, `None` until `tracker_init`.
static TRACKER: Lazy<Mutex<Option<Tracker>>> = Lazy::new(|| Mutex::new(None));

/// Run `f` against the global tracker.
fn with_tracker<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&mut Tracker) -> R,
{
    let mut guard = TRACKER.lock().unwrap_or_else(PoisonError::into_inner);
    let tracker = guard.as_mut().ok_or_internal("tracker not initialized")?;
    Ok(f(tracker))
}

fn messages(alerts: Vec<Alert>) -> Vec<String> {
    alerts.iter().map(Alert::message).collect()
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        error!("[MileageFFI] JSON encode failed: {}", e);
        String::new()
    })
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Open the trip database at `db_path` and restore the saved bike and fuel.
///
/// Calling again replaces the tracker (and stops any running trip).
#[uniffi::export]
pub fn tracker_init(db_path: String) -> bool {
    init_logging();

    let opened = SqliteTripRepository::new(&db_path).and_then(|repo| {
        TrackingSession::new(PushPositionSource::new(), repo, TrackerConfig::default())
    });

    match opened {
        Ok(tracker) => {
            let mut guard = TRACKER.lock().unwrap_or_else(PoisonError::into_inner);
            *guard = Some(tracker);
            info!("[MileageFFI] Tracker initialized at {}", db_path);
            true
        }
        Err(e) => {
            error!("[MileageFFI] Failed to open {}: {}", db_path, e);
            false
        }
    }
}

#[uniffi::export]
pub fn tracker_start() -> bool {
    match with_tracker(|t| t.start()) {
        Ok(()) => true,
        Err(e) => {
            warn!("[MileageFFI] start: {}", e);
            false
        }
    }
}

/// Stop tracking. Returns the saved trip as JSON, or an empty string when
/// the trip was too short (or nothing was tracking).
#[uniffi::export]
pub fn tracker_stop() -> String {
    match with_tracker(|t| t.stop()).and_then(|r| r) {
        Ok(Some(record)) => to_json(&record),
        Ok(None) => String::new(),
        Err(e) => {
            error!("[MileageFFI] stop: {}", e);
            String::new()
        }
    }
}

#[uniffi::export]
pub fn tracker_reset() -> bool {
    match with_tracker(|t| t.reset()).and_then(|r| r) {
        Ok(()) => true,
        Err(e) => {
            error!("[MileageFFI] reset: {}", e);
            false
        }
    }
}

// ============================================================================
// Position input and alerts
// ============================================================================

/// Feed one platform fix. Returns alert texts for the host to speak.
#[uniffi::export]
pub fn tracker_push_fix(
    latitude: f64,
    longitude: f64,
    speed_mps: Option<f64>,
    timestamp_ms: i64,
) -> Vec<String> {
    let fix = RawFix::new(latitude, longitude, speed_mps, timestamp_ms);
    with_tracker(|t| {
        if !t.source().push_fix(fix) {
            debug!("[MileageFFI] Fix dropped, not tracking");
        }
        messages(t.pump(Instant::now()))
    })
    .unwrap_or_default()
}

/// Feed a platform error (W3C code: 1 denied, 2 unavailable, 3 timeout).
#[uniffi::export]
pub fn tracker_push_error(code: u16, message: String) {
    let err = RawPositionError::new(code, &message);
    if let Err(e) = with_tracker(|t| {
        t.source().push_error(err);
        t.pump(Instant::now());
    }) {
        warn!("[MileageFFI] push_error {}: {}", code, e);
    }
}

/// Fire due timers. Call about once a second while tracking.
#[uniffi::export]
pub fn tracker_tick() -> Vec<String> {
    with_tracker(|t| messages(t.pump(Instant::now()))).unwrap_or_default()
}

#[uniffi::export]
pub fn tracker_set_voice_assistant(enabled: bool) {
    if let Err(e) = with_tracker(|t| t.set_voice_assistant(enabled)) {
        warn!("[MileageFFI] set_voice_assistant: {}", e);
    }
}

// ============================================================================
// Bike and fuel
// ============================================================================

/// Add fuel. Returns the new volume, or -1 if the amount was rejected.
#[uniffi::export]
pub fn tracker_refill(amount_l: f64) -> f64 {
    match with_tracker(|t| t.refill(amount_l)).and_then(|r| r) {
        Ok(liters) => liters,
        Err(e) => {
            warn!("[MileageFFI] refill: {}", e);
            -1.0
        }
    }
}

/// Returns whether any fuel was added.
#[uniffi::export]
pub fn tracker_fill_to_full() -> bool {
    match with_tracker(|t| t.fill_to_full()).and_then(|r| r) {
        Ok(filled) => filled,
        Err(e) => {
            warn!("[MileageFFI] fill_to_full: {}", e);
            false
        }
    }
}

/// Select a bike given as JSON (see `bike_catalog_json`).
#[uniffi::export]
pub fn tracker_select_bike(bike_json: String) -> bool {
    let bike: Bike = match serde_json::from_str(&bike_json) {
        Ok(bike) => bike,
        Err(e) => {
            warn!("[MileageFFI] Bad bike JSON: {}", e);
            return false;
        }
    };
    match with_tracker(|t| t.select_bike(bike)).and_then(|r| r) {
        Ok(()) => true,
        Err(e) => {
            warn!("[MileageFFI] select_bike: {}", e);
            false
        }
    }
}

/// Get the built-in bike catalog as JSON.
#[uniffi::export]
pub fn bike_catalog_json() -> String {
    to_json(&catalog())
}

// ============================================================================
// Display and history
// ============================================================================

/// Current tracker state as JSON, empty before `tracker_init`.
#[uniffi::export]
pub fn tracker_snapshot_json() -> String {
    with_tracker(|t| to_json(&t.snapshot())).unwrap_or_default()
}

/// Trip history as a JSON array, oldest first.
#[uniffi::export]
pub fn tracker_trips_json() -> String {
    match with_tracker(|t| t.trip_history()).and_then(|r| r) {
        Ok(trips) => to_json(&trips),
        Err(e) => {
            error!("[MileageFFI] trips: {}", e);
            "[]".to_string()
        }
    }
}

#[uniffi::export]
pub fn tracker_delete_trip(id: i64) -> bool {
    match with_tracker(|t| t.delete_trip(id)).and_then(|r| r) {
        Ok(()) => true,
        Err(e) => {
            error!("[MileageFFI] delete_trip {}: {}", id, e);
            false
        }
    }
}

#[uniffi::export]
pub fn tracker_clear_trips() -> bool {
    match with_tracker(|t| t.clear_trip_history()).and_then(|r| r) {
        Ok(()) => true,
        Err(e) => {
            error!("[MileageFFI] clear_trips: {}", e);
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
