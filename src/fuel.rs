//! Fuel & range model.
//!
//! Pure functions over fuel volume, bike rating and distance travelled.
//! Range is a straight-line estimate from the rated average; nothing here
//! learns from actual consumption.

use serde::{Deserialize, Serialize};

use crate::bikes::Bike;
use crate::config::{DEFAULT_FULL_TANK_TOLERANCE_L, DEFAULT_RESERVE_PERCENT};
use crate::{MileageError, Result};

/// Range on the current fuel, ignoring distance already travelled.
pub fn total_range_km(fuel_l: f64, bike: &Bike) -> f64 {
    fuel_l * bike.average_km_per_liter
}

/// Range left after `distance_travelled_km`; never negative.
pub fn remaining_range_km(fuel_l: f64, bike: &Bike, distance_travelled_km: f64) -> f64 {
    (total_range_km(fuel_l, bike) - distance_travelled_km).max(0.0)
}

/// Liters burned over `distance_km` at the bike's rated average.
pub fn fuel_consumed_l(distance_km: f64, bike: &Bike) -> f64 {
    distance_km / bike.average_km_per_liter
}

/// Fuel left after `distance_km`, floored at zero.
pub fn fuel_after_distance_l(fuel_l: f64, bike: &Bike, distance_km: f64) -> f64 {
    (fuel_l - fuel_consumed_l(distance_km, bike)).max(0.0)
}

/// Whether fuel is in reserve (at most 15% of the tank, but not empty).
pub fn is_reserve(fuel_l: f64, bike: &Bike) -> bool {
    is_reserve_at(fuel_l, bike, DEFAULT_RESERVE_PERCENT)
}

/// [`is_reserve`] with a custom threshold percentage.
pub fn is_reserve_at(fuel_l: f64, bike: &Bike, reserve_percent: f64) -> bool {
    fuel_l > 0.0 && (fuel_l / bike.tank_size_liters) * 100.0 <= reserve_percent
}

/// Add `amount_l` liters, capped at the tank size.
pub fn refill(fuel_l: f64, amount_l: f64, bike: &Bike) -> Result<f64> {
    if !(amount_l.is_finite() && amount_l > 0.0) {
        return Err(MileageError::InvalidFuelAmount { amount: amount_l });
    }
    Ok((fuel_l + amount_l).min(bike.tank_size_liters))
}

/// Fill the tank; `None` when already within tolerance of full.
pub fn fill_to_full(fuel_l: f64, bike: &Bike) -> Option<f64> {
    fill_to_full_within(fuel_l, bike, DEFAULT_FULL_TANK_TOLERANCE_L)
}

pub fn fill_to_full_within(fuel_l: f64, bike: &Bike, tolerance_l: f64) -> Option<f64> {
    if bike.tank_size_liters - fuel_l > tolerance_l {
        Some(bike.tank_size_liters)
    } else {
        None
    }
}

/// Fuel volume kept within `[0, tank]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuelState {
    liters: f64,
}

impl FuelState {
    /// Clamp `liters` into the tank; non-finite input counts as empty.
    pub fn new(liters: f64, bike: &Bike) -> Self {
        let liters = if liters.is_finite() { liters } else { 0.0 };
        Self {
            liters: liters.clamp(0.0, bike.tank_size_liters),
        }
    }

    pub fn full(bike: &Bike) -> Self {
        Self {
            liters: bike.tank_size_liters,
        }
    }

    pub fn liters(&self) -> f64 {
        self.liters
    }

    pub fn is_full(&self, bike: &Bike) -> bool {
        self.liters >= bike.tank_size_liters
    }

    pub fn consume_distance(&mut self, distance_km: f64, bike: &Bike) -> f64 {
        let before = self.liters;
        self.liters = fuel_after_distance_l(self.liters, bike, distance_km);
        before - self.liters
    }

    pub fn refill(&mut self, amount_l: f64, bike: &Bike) -> Result<f64> {
        self.liters = refill(self.liters, amount_l, bike)?;
        Ok(self.liters)
    }

    /// Returns whether anything was added.
    pub fn fill_to_full(&mut self, bike: &Bike, tolerance_l: f64) -> bool {
        match fill_to_full_within(self.liters, bike, tolerance_l) {
            Some(full) => {
                self.liters = full;
                true
            }
            None => false,
        }
    }

    /// Re-clamp after a bike change.
    pub fn fit_to(&mut self, bike: &Bike) {
        *self = Self::new(self.liters, bike);
    }
}
