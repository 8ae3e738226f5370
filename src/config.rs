//! Tracker configuration.
//!
//! All thresholds default to the values the app has always shipped with.
//! They are tunable per tracker, not per bike.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Reserve threshold as percent of tank capacity.
pub const DEFAULT_RESERVE_PERCENT: f64 = 15.0;
/// How long speed must stay above the optimal band before warning.
pub const DEFAULT_SPEEDING_HOLD_SECS: u64 = 10;
/// Distance between spoken milestones.
pub const DEFAULT_MILESTONE_INTERVAL_KM: u64 = 5;
/// Trips at or below this distance are not saved.
pub const DEFAULT_MIN_TRIP_DISTANCE_KM: f64 = 0.1;
/// Minimum speed samples before asking for advice.
pub const DEFAULT_MIN_ADVICE_SAMPLES: usize = 5;
/// "Fill to full" does nothing when the tank is within this many liters of full.
pub const DEFAULT_FULL_TANK_TOLERANCE_L: f64 = 0.01;
/// Fuel assumed when no saved state exists.
pub const DEFAULT_FUEL_L: f64 = 1.0;

/// Options forwarded to the platform position capability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Prefer GNSS over network positioning
    pub high_accuracy: bool,
    /// Give up on a single fix after this long
    pub timeout_ms: u64,
    /// Maximum age of a cached fix (0 = never reuse stale fixes)
    pub maximum_age_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 0,
        }
    }
}

/// Configuration for the tracking session and alert engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub reserve_percent: f64,
    pub speeding_hold_secs: u64,
    pub milestone_interval_km: u64,
    pub min_trip_distance_km: f64,
    pub min_advice_samples: usize,
    pub full_tank_tolerance_l: f64,
    pub default_fuel_l: f64,
    pub watch: WatchOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            reserve_percent: DEFAULT_RESERVE_PERCENT,
            speeding_hold_secs: DEFAULT_SPEEDING_HOLD_SECS,
            milestone_interval_km: DEFAULT_MILESTONE_INTERVAL_KM,
            min_trip_distance_km: DEFAULT_MIN_TRIP_DISTANCE_KM,
            min_advice_samples: DEFAULT_MIN_ADVICE_SAMPLES,
            full_tank_tolerance_l: DEFAULT_FULL_TANK_TOLERANCE_L,
            default_fuel_l: DEFAULT_FUEL_L,
            watch: WatchOptions::default(),
        }
    }
}

impl TrackerConfig {
    /// Parse a (possibly partial) JSON document; missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn speeding_hold(&self) -> Duration {
        Duration::from_secs(self.speeding_hold_secs)
    }
}
