//! End-to-end tracking session tests.
//!
//! Drives a session the way a host app does: fixes are pushed into the
//! position source and the event loop pumps them with an injected clock.
//!
//! Run with: `cargo test --test session_lifecycle -- --nocapture`
//! Set `RUST_LOG=debug` to see the session logs.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mileage_companion::advice::{fetch_advice, NOT_ENOUGH_DATA_MESSAGE};
use mileage_companion::{
    default_bike, AdviceService, Alert, AppState, InMemoryRepository, MileageError,
    PushPositionSource, RawFix, RawPositionError, Result, SessionState, Speaker, SpeedBand,
    TrackerConfig, TrackingData, TrackingSession,
};

const KM_PER_DEGREE: f64 = 6371.0 * std::f64::consts::PI / 180.0;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Default)]
struct Transcript(Arc<Mutex<Vec<String>>>);

impl Speaker for Transcript {
    fn speak(&self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
}

impl Transcript {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct FixedAdvice;

impl AdviceService for FixedAdvice {
    async fn get_mileage_tips(&self, data: &TrackingData) -> Result<String> {
        Ok(format!("{} samples looked at", data.sample_count()))
    }
}

/// A northbound ride along the prime meridian.
struct Ride {
    source: PushPositionSource,
    lat: f64,
    t: i64,
}

impl Ride {
    fn new(source: PushPositionSource) -> Self {
        Self {
            source,
            lat: 0.0,
            t: 0,
        }
    }

    /// Advance `km` and report `speed_kmh`.
    fn advance(&mut self, km: f64, speed_kmh: f64) {
        self.lat += km / KM_PER_DEGREE;
        self.t += 1_000;
        self.source
            .push_fix(RawFix::new(self.lat, 0.0, Some(speed_kmh / 3.6), self.t));
    }
}

fn session(
    fuel_liters: f64,
) -> (
    TrackingSession<PushPositionSource, InMemoryRepository>,
    PushPositionSource,
) {
    init_logs();
    let source = PushPositionSource::new();
    let repo = InMemoryRepository::with_app_state(AppState {
        bike: default_bike(),
        fuel_liters,
    });
    let session = TrackingSession::new(source.clone(), repo, TrackerConfig::default()).unwrap();
    (session, source)
}

// ============================================================================
// Fuel and trip records
// ============================================================================

#[test]
fn test_twenty_two_km_on_a_full_tank() {
    let (mut session, source) = session(8.0);
    let mut ride = Ride::new(source);
    let now = Instant::now();

    session.start();
    ride.advance(0.0, 40.0);
    for _ in 0..22 {
        ride.advance(1.0, 45.0);
    }
    session.pump(now);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Tracking);
    assert!((snapshot.distance_km - 22.0).abs() < 1e-6);
    assert!((snapshot.total_range_km - 352.0).abs() < 1e-9);
    assert!((snapshot.remaining_range_km - 330.0).abs() < 1e-6);
    assert_eq!(snapshot.sample_count, 23);

    let record = session.stop().unwrap().unwrap();
    assert!((session.fuel_liters() - 7.5).abs() < 1e-6);
    assert!((record.distance_km - 22.0).abs() < 1e-6);
}

#[test]
fn test_zero_speeds_excluded_from_trip_average() {
    let (mut session, source) = session(8.0);
    let mut ride = Ride::new(source);

    session.start();
    for speed in [0.0, 10.0, 0.0, 20.0, 30.0] {
        ride.advance(0.5, speed);
    }
    session.pump(Instant::now());
    let record = session.stop().unwrap().unwrap();

    assert_eq!(record.speed_history.len(), 5);
    assert!((record.avg_speed_kmh - 20.0).abs() < 1e-9);
    assert!((record.max_speed_kmh - 30.0).abs() < 1e-9);
}

#[test]
fn test_short_trip_is_not_recorded() {
    let (mut session, source) = session(8.0);
    let mut ride = Ride::new(source);

    session.start();
    ride.advance(0.0, 5.0);
    ride.advance(0.05, 5.0);
    session.pump(Instant::now());

    assert_eq!(session.stop().unwrap(), None);
    assert!(session.trip_history().unwrap().is_empty());
}

#[test]
fn test_fixes_queued_before_stop_are_counted() {
    let (mut session, source) = session(8.0);
    let mut ride = Ride::new(source.clone());

    session.start();
    ride.advance(0.0, 30.0);
    ride.advance(2.0, 30.0);
    // No pump before stop
    let record = session.stop().unwrap().unwrap();
    assert!((record.distance_km - 2.0).abs() < 1e-6);

    // Delivery has ended
    assert!(!source.push_fix(RawFix::new(1.0, 0.0, None, 0)));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_errors_show_banner_without_stopping() {
    let (mut session, source) = session(8.0);
    let mut ride = Ride::new(source.clone());

    session.start();
    ride.advance(0.0, 30.0);
    source.push_error(RawPositionError::new(1, "User denied Geolocation"));
    session.pump(Instant::now());

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Tracking);
    assert_eq!(
        snapshot.error.as_deref(),
        Some("Location access was denied. Please enable it in your settings.")
    );

    ride.advance(1.0, 30.0);
    session.pump(Instant::now());
    assert_eq!(session.error_banner(), None);
    assert_eq!(session.tracking_data().sample_count(), 2);
}

#[test]
fn test_reset_mid_ride_keeps_trip() {
    let (mut session, source) = session(4.0);
    let mut ride = Ride::new(source.clone());

    session.start();
    ride.advance(0.0, 40.0);
    ride.advance(3.0, 40.0);
    session.pump(Instant::now());
    // Still queued when the reset arrives
    ride.advance(1.0, 40.0);
    source.push_error(RawPositionError::new(2, "No fix"));

    session.reset().unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.fuel_liters(), 8.0);
    assert_eq!(session.tracking_data().sample_count(), 0);

    let trips = session.trip_history().unwrap();
    assert_eq!(trips.len(), 1);
    assert!((trips[0].distance_km - 4.0).abs() < 1e-6);
    assert_eq!(trips[0].speed_history.len(), 3);
}

#[test]
fn test_invalid_refill_rejected() {
    let (mut session, _) = session(8.0);
    assert!(matches!(
        session.refill(0.0),
        Err(MileageError::InvalidFuelAmount { .. })
    ));
    assert!(matches!(
        session.refill(f64::NAN),
        Err(MileageError::InvalidFuelAmount { .. })
    ));
    assert_eq!(session.fuel_liters(), 8.0);
}

// ============================================================================
// Voice alerts
// ============================================================================

#[test]
fn test_voice_ride() {
    let transcript = Transcript::default();
    let (session, source) = session(1.4);
    let mut session = session.with_speaker(transcript.clone());
    let mut ride = Ride::new(source);
    let t0 = Instant::now();

    session.set_voice_assistant(true);
    session.start();
    ride.advance(0.0, 40.0);

    // 10.5 km at a steady 45 km/h: milestones at 5 and 10
    let mut alerts = Vec::new();
    for s in 1..=11 {
        ride.advance(if s == 1 { 0.5 } else { 1.0 }, 45.0);
        alerts.extend(session.pump(t0 + Duration::from_secs(s)));
    }

    let milestones: Vec<u64> = alerts
        .iter()
        .filter_map(|a| match a {
            Alert::DistanceMilestone { distance_km, .. } => Some(*distance_km),
            _ => None,
        })
        .collect();
    assert_eq!(milestones, vec![5, 10]);
    assert_eq!(
        alerts
            .iter()
            .filter(|a| matches!(a, Alert::LowFuel { .. }))
            .count(),
        0
    );
    assert!(!alerts.iter().any(|a| matches!(a, Alert::Speeding { .. })));
    assert_eq!(transcript.lines().len(), alerts.len());
    assert!(!session.snapshot().is_reserve);

    // The ride is charged on stop, which puts the tank in reserve
    session.stop().unwrap();
    assert!(session.snapshot().is_reserve);

    session.start();
    ride.advance(0.0, 40.0);
    let alerts = session.pump(t0 + Duration::from_secs(20));
    assert!(matches!(alerts.as_slice(), [Alert::LowFuel { .. }]));
    ride.advance(1.0, 40.0);
    assert!(session.pump(t0 + Duration::from_secs(21)).is_empty());
    assert_eq!(transcript.lines().len(), 3);
}

#[test]
fn test_sustained_speeding_and_dip() {
    let (mut session, source) = session(8.0);
    let mut ride = Ride::new(source);
    let t0 = Instant::now();

    session.set_voice_assistant(true);
    session.start();

    // Fast for 9 s, then a dip: nothing
    for s in 0..9 {
        ride.advance(0.02, 70.0);
        assert!(session.pump(t0 + Duration::from_secs(s)).is_empty());
    }
    ride.advance(0.01, 50.0);
    assert!(session.pump(t0 + Duration::from_secs(9)).is_empty());
    assert!(session.tick(t0 + Duration::from_secs(20)).is_empty());

    // Fast again and held
    ride.advance(0.02, 70.0);
    session.pump(t0 + Duration::from_secs(21));
    assert_eq!(session.snapshot().speed_band, SpeedBand::AboveOptimal);
    assert_eq!(
        session.tick(t0 + Duration::from_secs(31)),
        vec![Alert::Speeding { limit_kmh: 55.0 }]
    );
}

#[test]
fn test_voice_off_mid_ride_cancels_timer() {
    let (mut session, source) = session(8.0);
    let mut ride = Ride::new(source);
    let t0 = Instant::now();

    session.set_voice_assistant(true);
    session.start();
    ride.advance(0.0, 70.0);
    session.pump(t0);

    session.set_voice_assistant(false);
    assert!(session.tick(t0 + Duration::from_secs(15)).is_empty());

    session.set_voice_assistant(true);
    assert!(session.tick(t0 + Duration::from_secs(30)).is_empty());
}

// ============================================================================
// Advice
// ============================================================================

#[tokio::test]
async fn test_advice_after_trip() {
    let (mut session, source) = session(8.0);
    let mut ride = Ride::new(source);

    session.start();
    for _ in 0..3 {
        ride.advance(0.5, 30.0);
    }
    session.pump(Instant::now());
    assert_eq!(session.request_advice(&FixedAdvice).await, None);
    session.stop().unwrap();

    assert_eq!(
        session.request_advice(&FixedAdvice).await.as_deref(),
        Some(NOT_ENOUGH_DATA_MESSAGE)
    );

    session.start();
    for _ in 0..6 {
        ride.advance(0.5, 30.0);
    }
    session.pump(Instant::now());
    session.stop().unwrap();

    assert_eq!(
        session.request_advice(&FixedAdvice).await.as_deref(),
        Some("6 samples looked at")
    );
    assert_eq!(
        fetch_advice(&FixedAdvice, session.tracking_data(), 5).await,
        "6 samples looked at"
    );
}
