//! Cumulative trip distance from consecutive position fixes.

use crate::geo_utils::haversine_km;
use crate::Position;

/// Sums great-circle distance between consecutive positions.
///
/// A single position never changes the total; it only becomes the anchor
/// for the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceAccumulator {
    last_position: Option<Position>,
    total_distance_km: f64,
}

impl DistanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a position and return the distance it contributed in km.
    pub fn add_sample(&mut self, pos: Position) -> f64 {
        let step = match self.last_position {
            Some(last) => haversine_km(&last, &pos),
            None => 0.0,
        };
        // NaN coordinates would poison the total forever
        let step = if step.is_finite() { step } else { 0.0 };
        self.total_distance_km += step;
        self.last_position = Some(pos);
        step
    }

    pub fn reset(&mut self) {
        self.total_distance_km = 0.0;
        self.last_position = None;
    }

    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_km
    }

    pub fn last_position(&self) -> Option<Position> {
        self.last_position
    }
}
