//! Geographic utilities.

use crate::Position;

/// Mean Earth radius used for all trip distances, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two positions in kilometers (haversine).
///
/// # Example
/// ```
/// use mileage_companion::{geo_utils::haversine_km, Position};
///
/// let london = Position::new(51.5074, -0.1278);
/// let paris = Position::new(48.8566, 2.3522);
/// let d = haversine_km(&london, &paris);
/// assert!((d - 343.5).abs() < 1.0);
/// ```
pub fn haversine_km(p1: &Position, p2: &Position) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let d_lat = (p2.lat - p1.lat).to_radians();
    let d_lng = (p2.lng - p1.lng).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + (d_lng / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
    // Rounding can push `a` a hair outside [0, 1] for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Total length of a path of positions in kilometers.
pub fn path_length_km(points: &[Position]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_km(&pair[0], &pair[1]))
        .sum()
}
