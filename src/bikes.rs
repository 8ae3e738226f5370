//! Bike reference data and the built-in garage catalog.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{MileageError, Result};

/// Below this speed the bike is treated as stopped, not slow.
const STOPPED_SPEED_KMH: f64 = 5.0;

/// Speed band presumed to give the best fuel efficiency, in km/h.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    pub min: f64,
    pub max: f64,
}

impl SpeedRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Where the current speed sits relative to the optimal band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedBand {
    Optimal,
    BelowOptimal,
    AboveOptimal,
}

/// Immutable bike reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bike {
    pub make: String,
    pub model: String,
    /// Rated fuel efficiency in km per liter
    pub average_km_per_liter: f64,
    pub tank_size_liters: f64,
    pub optimal_speed: SpeedRange,
}

impl Bike {
    pub fn new(
        make: &str,
        model: &str,
        average_km_per_liter: f64,
        tank_size_liters: f64,
        optimal_speed: SpeedRange,
    ) -> Self {
        Self {
            make: make.to_string(),
            model: model.to_string(),
            average_km_per_liter,
            tank_size_liters,
            optimal_speed,
        }
    }

    /// "Make Model", as shown in the garage and trip history.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.make, self.model)
    }

    /// Reject reference data the fuel model cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(MileageError::InvalidBike { message });

        if !(self.average_km_per_liter.is_finite() && self.average_km_per_liter > 0.0) {
            return invalid(format!(
                "{}: average must be positive, got {}",
                self.display_name(),
                self.average_km_per_liter
            ));
        }
        if !(self.tank_size_liters.is_finite() && self.tank_size_liters > 0.0) {
            return invalid(format!(
                "{}: tank size must be positive, got {}",
                self.display_name(),
                self.tank_size_liters
            ));
        }
        if self.optimal_speed.min > self.optimal_speed.max {
            return invalid(format!(
                "{}: optimal speed min {} exceeds max {}",
                self.display_name(),
                self.optimal_speed.min,
                self.optimal_speed.max
            ));
        }
        Ok(())
    }

    pub fn classify_speed(&self, speed_kmh: f64) -> SpeedBand {
        if speed_kmh > self.optimal_speed.max {
            SpeedBand::AboveOptimal
        } else if speed_kmh < self.optimal_speed.min && speed_kmh > STOPPED_SPEED_KMH {
            SpeedBand::BelowOptimal
        } else {
            SpeedBand::Optimal
        }
    }
}

impl Default for Bike {
    fn default() -> Self {
        default_bike()
    }
}

static BIKE_CATALOG: Lazy<Vec<Bike>> = Lazy::new(|| {
    vec![
        Bike::new("Honda", "Dream Yuga", 44.0, 8.0, SpeedRange::new(40.0, 55.0)),
        Bike::new("Hero", "Splendor Plus", 65.0, 9.8, SpeedRange::new(40.0, 60.0)),
        Bike::new("Bajaj", "Pulsar 150", 50.0, 15.0, SpeedRange::new(50.0, 70.0)),
        Bike::new("Yamaha", "FZ-S FI", 45.0, 13.0, SpeedRange::new(50.0, 65.0)),
        Bike::new("Royal Enfield", "Classic 350", 35.0, 13.0, SpeedRange::new(60.0, 80.0)),
        Bike::new("TVS", "Apache RTR 160", 45.0, 12.0, SpeedRange::new(50.0, 70.0)),
    ]
});

/// The built-in catalog; the first entry is the default bike.
pub fn catalog() -> &'static [Bike] {
    &BIKE_CATALOG
}

pub fn default_bike() -> Bike {
    BIKE_CATALOG[0].clone()
}

/// Case-insensitive substring search over "make model".
pub fn search_catalog(term: &str) -> Vec<&'static Bike> {
    let needle = term.trim().to_lowercase();
    catalog()
        .iter()
        .filter(|bike| bike.display_name().to_lowercase().contains(&needle))
        .collect()
}
