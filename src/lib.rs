//! # Mileage Companion
//!
//! Trip tracking, fuel range estimation and ride alerts for motorcycles.
//!
//! This library provides:
//! - Continuous position sampling behind a platform-agnostic seam
//! - Haversine distance accumulation over noisy GPS fixes
//! - A fuel & range model driven by the bike's rated average
//! - Debounced voice alerts (distance milestones, sustained speeding, low fuel)
//! - Trip history storage and AI mileage advice
//!
//! ## Features
//!
//! - **`persistence`** - SQLite trip repository (enabled by default)
//! - **`http`** - HTTP client for the mileage advice service
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Instant;
//! use mileage_companion::{
//!     InMemoryRepository, PushPositionSource, RawFix, TrackerConfig, TrackingSession,
//! };
//!
//! let source = PushPositionSource::new();
//! let mut session =
//!     TrackingSession::new(source.clone(), InMemoryRepository::new(), TrackerConfig::default())
//!         .unwrap();
//!
//! session.start();
//! source.push_fix(RawFix::new(12.9716, 77.5946, Some(12.5), 0));
//! source.push_fix(RawFix::new(12.9816, 77.5946, Some(13.0), 1_000));
//! session.pump(Instant::now());
//!
//! let snapshot = session.snapshot();
//! println!("{:.2} km, {:.1} km range left", snapshot.distance_km, snapshot.remaining_range_km);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{MileageError, OptionExt, Result};

// Thresholds and sampler options
pub mod config;
pub use config::{TrackerConfig, WatchOptions};

// Geographic utilities (haversine distance)
pub mod geo_utils;

// Position sampling
pub mod sampler;
pub use sampler::{
    FixSink, GeoError, GeoSampler, PositionSource, PushPositionSource, RawFix, RawPositionError,
    SampleFeed, SamplerEvent, WatchId,
};

// Distance accumulation
pub mod accumulator;
pub use accumulator::DistanceAccumulator;

// Bike reference data
pub mod bikes;
pub use bikes::{catalog, default_bike, search_catalog, Bike, SpeedBand, SpeedRange};

// Fuel & range model
pub mod fuel;
pub use fuel::FuelState;

// Trip records and statistics
pub mod trip;
pub use trip::{TripRecord, TripStats};

// Voice alerts
pub mod alerts;
pub use alerts::{Alert, AlertEngine, LiveUpdate, LogSpeaker, NullSpeaker, OneShotTimer, Speaker};

// Trip and app-state storage
pub mod repository;
pub use repository::{AppState, InMemoryRepository, TripRepository};

#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteTripRepository;

// Mileage advice
pub mod advice;
pub use advice::{AdviceRequest, AdviceService, AdviceSlot, AdviceTicket};

// HTTP advice client
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{GeminiAdviceService, GeminiConfig};

// Tracking session orchestrator
pub mod session;
pub use session::{SessionState, TrackerSnapshot, TrackingSession};

// Measured mileage calculator
pub mod calculator;
pub use calculator::MileageCalculator;

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("MileageCompanion"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A geographic position in degrees.
///
/// # Example
/// ```
/// use mileage_companion::Position;
/// let point = Position::new(12.9716, 77.5946); // Bengaluru
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check if the position has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A normalized position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: Position,
    /// Instantaneous speed in km/h (0 when the platform had no reading)
    pub speed_kmh: f64,
    /// Platform timestamp in milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

/// Live data for the trip in progress.
///
/// `speed_history` holds one entry per sample received while tracking,
/// including zero readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingData {
    pub distance_km: f64,
    pub speed_history: Vec<f64>,
}

impl TrackingData {
    pub fn clear(&mut self) {
        self.distance_km = 0.0;
        self.speed_history.clear();
    }

    pub fn sample_count(&self) -> usize {
        self.speed_history.len()
    }

    /// Mean over every sample, zeros included.
    pub fn mean_speed_kmh(&self) -> f64 {
        if self.speed_history.is_empty() {
            return 0.0;
        }
        self.speed_history.iter().sum::<f64>() / self.speed_history.len() as f64
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.speed_history.iter().copied().fold(0.0, f64::max)
    }
}
