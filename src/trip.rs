//! Completed trip records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bikes::Bike;
use crate::TrackingData;

/// Average and peak speed while actually moving.
///
/// Zero readings (stopped, or a fix without a speed) are left out so a
/// traffic light or a tunnel does not drag the average down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TripStats {
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub moving_samples: usize,
}

impl TripStats {
    pub fn from_speed_history(speeds: &[f64]) -> Self {
        let (sum, max, count) = speeds
            .iter()
            .filter(|&&s| s > 0.0)
            .fold((0.0, 0.0_f64, 0usize), |(sum, max, n), &s| {
                (sum + s, max.max(s), n + 1)
            });

        if count == 0 {
            return Self::default();
        }

        Self {
            avg_speed_kmh: sum / count as f64,
            max_speed_kmh: max,
            moving_samples: count,
        }
    }
}

/// A saved trip. Immutable once stored; only deletion is allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    /// Assigned by the repository on insert
    pub id: Option<i64>,
    pub date: DateTime<Utc>,
    pub distance_km: f64,
    pub speed_history: Vec<f64>,
    pub bike_make: String,
    pub bike_model: String,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
}

impl TripRecord {
    pub fn from_tracking(data: &TrackingData, bike: &Bike, date: DateTime<Utc>) -> Self {
        let stats = TripStats::from_speed_history(&data.speed_history);
        Self {
            id: None,
            date,
            distance_km: data.distance_km,
            speed_history: data.speed_history.clone(),
            bike_make: bike.make.clone(),
            bike_model: bike.model.clone(),
            avg_speed_kmh: stats.avg_speed_kmh,
            max_speed_kmh: stats.max_speed_kmh,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn bike_name(&self) -> String {
        format!("{} {}", self.bike_make, self.bike_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bikes::default_bike;

    #[test]
    fn test_zero_speeds_excluded() {
        let stats = TripStats::from_speed_history(&[0.0, 10.0, 0.0, 20.0, 30.0]);
        assert_eq!(stats.avg_speed_kmh, 20.0);
        assert_eq!(stats.max_speed_kmh, 30.0);
        assert_eq!(stats.moving_samples, 3);
    }

    #[test]
    fn test_all_stopped() {
        assert_eq!(TripStats::from_speed_history(&[0.0, 0.0]), TripStats::default());
        assert_eq!(TripStats::from_speed_history(&[]), TripStats::default());
    }

    #[test]
    fn test_record_keeps_raw_history() {
        let data = TrackingData {
            distance_km: 3.2,
            speed_history: vec![0.0, 10.0, 0.0, 20.0, 30.0],
        };
        let record = TripRecord::from_tracking(&data, &default_bike(), Utc::now());

        assert_eq!(record.id, None);
        assert_eq!(record.speed_history.len(), 5);
        assert_eq!(record.avg_speed_kmh, 20.0);
        assert_eq!(record.max_speed_kmh, 30.0);
        assert_eq!(record.bike_name(), "Honda Dream Yuga");
        assert_eq!(record.with_id(7).id, Some(7));
    }
}
