//! Continuous position sampling.
//!
//! The platform's position capability sits behind [`PositionSource`]. A
//! [`GeoSampler`] owns one subscription at a time, normalizes raw fixes
//! into [`Sample`]s (m/s to km/h, missing speed to 0) and classifies
//! failures into [`GeoError`]. Errors are delivered, never thrown.
//!
//! Event-loop style consumers use [`GeoSampler::start_feed`], which queues
//! events in delivery order on an mpsc channel to be drained later.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::WatchOptions;
use crate::{Position, Sample};

/// Subscription handle issued by a [`PositionSource`].
pub type WatchId = u64;

/// Receives every fix or failure for one subscription.
pub type FixSink = Box<dyn FnMut(Result<RawFix, RawPositionError>) + Send>;

/// Platform error codes (W3C Geolocation numbering).
pub const CODE_PERMISSION_DENIED: u16 = 1;
pub const CODE_POSITION_UNAVAILABLE: u16 = 2;
pub const CODE_TIMEOUT: u16 = 3;

/// m/s to km/h.
const MPS_TO_KMH: f64 = 3.6;

/// A fix as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in meters per second, if the platform measured one
    pub speed_mps: Option<f64>,
    pub timestamp_ms: i64,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, speed_mps: Option<f64>, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            timestamp_ms,
        }
    }

    /// Normalize into a sample. Absent or nonsensical speeds become 0 km/h.
    pub fn to_sample(&self) -> Sample {
        let speed_kmh = match self.speed_mps {
            Some(mps) if mps.is_finite() && mps > 0.0 => mps * MPS_TO_KMH,
            _ => 0.0,
        };
        Sample {
            position: Position::new(self.latitude, self.longitude),
            speed_kmh,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// A failure as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPositionError {
    pub code: u16,
    pub message: String,
}

impl RawPositionError {
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

/// Classified position failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Unknown,
}

impl GeoError {
    pub fn from_code(code: u16) -> Self {
        match code {
            CODE_PERMISSION_DENIED => GeoError::PermissionDenied,
            CODE_POSITION_UNAVAILABLE => GeoError::PositionUnavailable,
            CODE_TIMEOUT => GeoError::Timeout,
            _ => GeoError::Unknown,
        }
    }

    /// Banner text shown to the rider.
    pub fn message(&self) -> &'static str {
        match self {
            GeoError::PermissionDenied => {
                "Location access was denied. Please enable it in your settings."
            }
            GeoError::PositionUnavailable => "Location information is unavailable.",
            GeoError::Timeout => "The request to get user location timed out.",
            GeoError::Unknown => "An unknown error occurred.",
        }
    }
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<&RawPositionError> for GeoError {
    fn from(e: &RawPositionError) -> Self {
        GeoError::from_code(e.code)
    }
}

/// What a sampler delivers, in order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerEvent {
    Sample(Sample),
    Error(GeoError),
}

/// Platform capability for continuous position updates.
pub trait PositionSource {
    /// Begin delivering fixes to `sink` until `clear_watch` is called.
    fn watch(&mut self, options: &WatchOptions, sink: FixSink) -> Result<WatchId, GeoError>;

    /// Stop a subscription. Unknown ids are ignored.
    fn clear_watch(&mut self, id: WatchId);
}

type EventHandler = Arc<Mutex<Box<dyn FnMut(SamplerEvent) + Send>>>;

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns at most one position subscription.
pub struct GeoSampler<P: PositionSource> {
    source: P,
    options: WatchOptions,
    watch_id: Option<WatchId>,
}

impl<P: PositionSource> GeoSampler<P> {
    pub fn new(source: P, options: WatchOptions) -> Self {
        Self {
            source,
            options,
            watch_id: None,
        }
    }

    /// Start delivering samples and errors to separate callbacks.
    pub fn start<F, E>(&mut self, mut on_sample: F, mut on_error: E)
    where
        F: FnMut(Sample) + Send + 'static,
        E: FnMut(GeoError) + Send + 'static,
    {
        self.start_with(move |event| match event {
            SamplerEvent::Sample(sample) => on_sample(sample),
            SamplerEvent::Error(err) => on_error(err),
        });
    }

    /// Start delivering into a queue drained by the caller's event loop.
    pub fn start_feed(&mut self) -> SampleFeed {
        let (tx, rx) = mpsc::channel();
        self.start_with(move |event| {
            // Receiver gone means the consumer stopped listening
            let _ = tx.send(event);
        });
        SampleFeed { rx }
    }

    /// Start delivering all events to one handler.
    ///
    /// Any previous subscription is cleared first.
    pub fn start_with<H>(&mut self, handler: H)
    where
        H: FnMut(SamplerEvent) + Send + 'static,
    {
        self.stop();

        let boxed: Box<dyn FnMut(SamplerEvent) + Send> = Box::new(handler);
        let handler: EventHandler = Arc::new(Mutex::new(boxed));
        let sink_handler = Arc::clone(&handler);
        let sink: FixSink = Box::new(move |result| {
            let event = match result {
                Ok(fix) => SamplerEvent::Sample(fix.to_sample()),
                Err(e) => {
                    let err = GeoError::from(&e);
                    debug!("[GeoSampler] Position error {}: {}", e.code, e.message);
                    SamplerEvent::Error(err)
                }
            };
            let mut handler = lock(&sink_handler);
            (*handler)(event);
        });

        match self.source.watch(&self.options, sink) {
            Ok(id) => {
                info!("[GeoSampler] Watch {} started", id);
                self.watch_id = Some(id);
            }
            Err(err) => {
                warn!("[GeoSampler] Could not start watch: {:?}", err);
                let mut handler = lock(&handler);
                (*handler)(SamplerEvent::Error(err));
            }
        }
    }

    /// Stop delivery. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(id) = self.watch_id.take() {
            self.source.clear_watch(id);
            info!("[GeoSampler] Watch {} cleared", id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.watch_id.is_some()
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }
}

impl<P: PositionSource> Drop for GeoSampler<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// In-order queue of sampler events.
pub struct SampleFeed {
    rx: Receiver<SamplerEvent>,
}

impl SampleFeed {
    /// Next queued event, if any (non-blocking).
    pub fn try_next(&self) -> Option<SamplerEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<SamplerEvent> {
        self.rx.try_iter().collect()
    }
}

// ============================================================================
// Push-driven source
// ============================================================================

type PushItem = Result<RawFix, RawPositionError>;

#[derive(Default)]
struct PushState {
    next_id: WatchId,
    active: Option<(WatchId, FixSink)>,
    /// Watch whose sink is running with the lock released.
    delivering: Option<WatchId>,
    /// Items pushed while a sink is running, flushed by that delivery.
    pending: VecDeque<PushItem>,
    watch_count: u32,
    last_options: Option<WatchOptions>,
    unsupported: bool,
}

impl PushState {
    fn is_watching(&self) -> bool {
        self.active.is_some() || self.delivering.is_some()
    }
}

/// A source that platform glue pushes fixes into.
///
/// Clones share the same subscription, so one clone can be handed to a
/// sampler while another receives fixes from the host OS. Fixes pushed
/// while nothing is watching are dropped.
#[derive(Clone, Default)]
pub struct PushPositionSource {
    state: Arc<Mutex<PushState>>,
}

impl PushPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose platform has no position capability at all.
    pub fn unsupported() -> Self {
        let source = Self::new();
        lock(&source.state).unsupported = true;
        source
    }

    /// Forward a fix to the active watch. Returns whether it was delivered.
    pub fn push_fix(&self, fix: RawFix) -> bool {
        self.deliver(Ok(fix))
    }

    /// Forward a platform error to the active watch.
    pub fn push_error(&self, error: RawPositionError) -> bool {
        self.deliver(Err(error))
    }

    /// Sinks run without the state lock, so a callback may push fixes or
    /// query the source. Items pushed meanwhile are delivered in order once
    /// the running sink returns.
    fn deliver(&self, item: PushItem) -> bool {
        let mut state = lock(&self.state);
        if !state.is_watching() {
            return false;
        }
        state.pending.push_back(item);
        if state.delivering.is_some() {
            return true;
        }

        while let Some((id, mut sink)) = state.active.take() {
            let next = match state.pending.pop_front() {
                Some(next) => next,
                None => {
                    state.active = Some((id, sink));
                    break;
                }
            };
            state.delivering = Some(id);
            drop(state);

            sink(next);

            state = lock(&self.state);
            // Cleared or replaced during the call: the old sink is dropped
            if state.delivering.take() == Some(id) && state.active.is_none() {
                state.active = Some((id, sink));
            }
        }
        true
    }

    pub fn is_watching(&self) -> bool {
        lock(&self.state).is_watching()
    }

    /// Number of watches ever started on this source.
    pub fn watch_count(&self) -> u32 {
        lock(&self.state).watch_count
    }

    pub fn last_options(&self) -> Option<WatchOptions> {
        lock(&self.state).last_options
    }
}

impl PositionSource for PushPositionSource {
    fn watch(&mut self, options: &WatchOptions, sink: FixSink) -> Result<WatchId, GeoError> {
        let mut state = lock(&self.state);
        if state.unsupported {
            return Err(GeoError::PositionUnavailable);
        }
        state.next_id += 1;
        let id = state.next_id;
        // A second watch replaces the first; there is only one GPS
        state.active = Some((id, sink));
        state.delivering = None;
        state.pending.clear();
        state.watch_count += 1;
        state.last_options = Some(*options);
        Ok(id)
    }

    fn clear_watch(&mut self, id: WatchId) {
        let mut state = lock(&self.state);
        if matches!(state.active, Some((active_id, _)) if active_id == id) {
            state.active = None;
            state.pending.clear();
        }
        if state.delivering == Some(id) {
            state.delivering = None;
            state.pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_conversion() {
        let sample = RawFix::new(1.0, 2.0, Some(10.0), 5).to_sample();
        assert_eq!(sample.speed_kmh, 36.0);
        assert_eq!(sample.position, Position::new(1.0, 2.0));
        assert_eq!(sample.timestamp_ms, 5);

        assert_eq!(RawFix::new(1.0, 2.0, None, 0).to_sample().speed_kmh, 0.0);
        assert_eq!(RawFix::new(1.0, 2.0, Some(-1.0), 0).to_sample().speed_kmh, 0.0);
        assert_eq!(RawFix::new(1.0, 2.0, Some(f64::NAN), 0).to_sample().speed_kmh, 0.0);
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(GeoError::from_code(1), GeoError::PermissionDenied);
        assert_eq!(GeoError::from_code(2), GeoError::PositionUnavailable);
        assert_eq!(GeoError::from_code(3), GeoError::Timeout);
        assert_eq!(GeoError::from_code(42), GeoError::Unknown);
        assert!(GeoError::Timeout.to_string().contains("timed out"));
    }

    #[test]
    fn test_feed_preserves_order() {
        let source = PushPositionSource::new();
        let mut sampler = GeoSampler::new(source.clone(), WatchOptions::default());
        let feed = sampler.start_feed();

        assert!(source.push_fix(RawFix::new(1.0, 1.0, Some(1.0), 1)));
        assert!(source.push_error(RawPositionError::new(CODE_TIMEOUT, "slow")));
        assert!(source.push_fix(RawFix::new(2.0, 2.0, None, 2)));

        let events = feed.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SamplerEvent::Sample(s) if s.timestamp_ms == 1));
        assert_eq!(events[1], SamplerEvent::Error(GeoError::Timeout));
        assert!(matches!(events[2], SamplerEvent::Sample(s) if s.speed_kmh == 0.0));
        assert!(feed.try_next().is_none());
    }

    #[test]
    fn test_stop_prevents_delivery() {
        let source = PushPositionSource::new();
        let mut sampler = GeoSampler::new(source.clone(), WatchOptions::default());
        let feed = sampler.start_feed();

        sampler.stop();
        sampler.stop();
        assert!(!sampler.is_active());
        assert!(!source.push_fix(RawFix::new(1.0, 1.0, None, 0)));
        assert!(feed.drain().is_empty());
    }

    #[test]
    fn test_restart_replaces_subscription() {
        let source = PushPositionSource::new();
        let mut sampler = GeoSampler::new(source.clone(), WatchOptions::default());

        let first = sampler.start_feed();
        let second = sampler.start_feed();
        assert_eq!(source.watch_count(), 2);

        source.push_fix(RawFix::new(1.0, 1.0, None, 0));
        assert!(first.drain().is_empty());
        assert_eq!(second.drain().len(), 1);
    }

    #[test]
    fn test_callbacks_and_options() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let source = PushPositionSource::new();
        let mut sampler = GeoSampler::new(source.clone(), WatchOptions::default());
        let samples = Arc::new(AtomicU32::new(0));
        let errors = Arc::new(AtomicU32::new(0));
        let (s, e) = (Arc::clone(&samples), Arc::clone(&errors));

        sampler.start(
            move |_| {
                s.fetch_add(1, Ordering::Relaxed);
            },
            move |_| {
                e.fetch_add(1, Ordering::Relaxed);
            },
        );
        source.push_fix(RawFix::new(1.0, 1.0, None, 0));
        source.push_error(RawPositionError::new(CODE_PERMISSION_DENIED, "denied"));

        assert_eq!(samples.load(Ordering::Relaxed), 1);
        assert_eq!(errors.load(Ordering::Relaxed), 1);
        assert_eq!(source.last_options(), Some(WatchOptions::default()));
    }

    #[test]
    fn test_callback_can_use_source() {
        let source = PushPositionSource::new();
        let mut sampler = GeoSampler::new(source.clone(), WatchOptions::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (inner, log) = (source.clone(), Arc::clone(&seen));

        sampler.start_with(move |event| {
            if let SamplerEvent::Sample(sample) = event {
                lock(&log).push((sample.timestamp_ms, inner.is_watching()));
                // Echo the first fix back in; it lands after this call returns
                if sample.timestamp_ms == 1 {
                    assert!(inner.push_fix(RawFix::new(2.0, 2.0, None, 2)));
                }
            }
        });

        assert!(source.push_fix(RawFix::new(1.0, 1.0, None, 1)));
        assert!(source.push_fix(RawFix::new(3.0, 3.0, None, 3)));
        assert_eq!(*lock(&seen), vec![(1, true), (2, true), (3, true)]);
        assert!(source.is_watching());

        sampler.stop();
        assert!(!source.is_watching());
    }

    #[test]
    fn test_callback_can_stop_its_watch() {
        let source = PushPositionSource::new();
        let mut sampler = GeoSampler::new(source.clone(), WatchOptions::default());
        let count = Arc::new(Mutex::new(0));
        let (mut inner, seen) = (source.clone(), Arc::clone(&count));

        // First watch on a fresh source
        sampler.start_with(move |_| {
            *lock(&seen) += 1;
            inner.clear_watch(1);
        });

        assert!(source.push_fix(RawFix::new(1.0, 1.0, None, 1)));
        assert!(!source.is_watching());
        assert!(!source.push_fix(RawFix::new(2.0, 2.0, None, 2)));
        assert_eq!(*lock(&count), 1);
    }

    #[test]
    fn test_unsupported_reports_instead_of_failing() {
        let mut sampler = GeoSampler::new(PushPositionSource::unsupported(), WatchOptions::default());
        let feed = sampler.start_feed();
        assert!(!sampler.is_active());
        assert_eq!(feed.drain(), vec![SamplerEvent::Error(GeoError::PositionUnavailable)]);
    }

    #[test]
    fn test_drop_clears_watch() {
        let source = PushPositionSource::new();
        {
            let mut sampler = GeoSampler::new(source.clone(), WatchOptions::default());
            let _feed = sampler.start_feed();
            assert!(source.is_watching());
        }
        assert!(!source.is_watching());
    }
}
