//! Voice alerts while riding.
//!
//! The engine is evaluated on every live update and emits at most one alert
//! per condition transition:
//!
//! - **Distance milestone** every `milestone_interval_km` whole kilometers
//! - **Sustained speeding** once speed has stayed above the bike's optimal
//!   band for `speeding_hold` (one-shot timer, cancelled on any dip)
//! - **Low fuel** on entering reserve, re-armed when leaving it
//!
//! Time is always passed in by the caller, so the debounce timer is
//! deterministic under test.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::bikes::Bike;
use crate::config::TrackerConfig;
use crate::fuel::is_reserve_at;

/// Something that can read text aloud. Fire and forget.
pub trait Speaker {
    fn speak(&self, text: &str);
}

/// Speaker for platforms without speech synthesis.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSpeaker;

impl Speaker for NullSpeaker {
    fn speak(&self, _text: &str) {}
}

/// Speaker that writes alerts to the log instead of a voice.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSpeaker;

impl Speaker for LogSpeaker {
    fn speak(&self, text: &str) {
        info!("[Speaker] {}", text);
    }
}

/// A rider-facing alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Alert {
    DistanceMilestone {
        distance_km: u64,
        remaining_range_km: u64,
    },
    Speeding {
        limit_kmh: f64,
    },
    LowFuel {
        fuel_liters: f64,
    },
}

impl Alert {
    pub fn message(&self) -> String {
        match self {
            Alert::DistanceMilestone {
                distance_km,
                remaining_range_km,
            } => format!(
                "You have travelled {} kilometers. Estimated remaining range is {} kilometers.",
                distance_km, remaining_range_km
            ),
            Alert::Speeding { limit_kmh } => format!(
                "You are riding above {:.0} kilometers per hour. Slow down to save fuel.",
                limit_kmh
            ),
            Alert::LowFuel { .. } => "Fuel is low. Please refuel soon.".to_string(),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// A cancelable one-shot deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneShotTimer {
    deadline: Option<Instant>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm unless already armed. Returns whether a new deadline was set.
    pub fn arm(&mut self, now: Instant, delay: Duration) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + delay);
        true
    }

    /// Returns whether a pending deadline was cancelled.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and return true once `now` has reached the deadline.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Live tracking state the engine reads. It never writes any of it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveUpdate {
    pub distance_km: f64,
    pub speed_kmh: f64,
    /// Estimated fuel left right now
    pub fuel_liters: f64,
    pub remaining_range_km: f64,
}

pub struct AlertEngine {
    milestone_interval_km: u64,
    speeding_hold: Duration,
    reserve_percent: f64,

    active: bool,
    last_distance_alert_km: u64,
    speeding_timer: OneShotTimer,
    speeding_limit_kmh: f64,
    low_fuel_alert_given: bool,
}

impl AlertEngine {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            milestone_interval_km: config.milestone_interval_km.max(1),
            speeding_hold: config.speeding_hold(),
            reserve_percent: config.reserve_percent,
            active: false,
            last_distance_alert_km: 0,
            speeding_timer: OneShotTimer::new(),
            speeding_limit_kmh: 0.0,
            low_fuel_alert_given: false,
        }
    }

    /// Forget everything from the previous ride.
    pub fn reset_for_session(&mut self) {
        self.last_distance_alert_km = 0;
        self.speeding_timer.cancel();
        self.low_fuel_alert_given = false;
    }

    /// Active only while tracking with the voice assistant on.
    /// Going dormant cancels pending timers.
    pub fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        if !active && self.speeding_timer.cancel() {
            debug!("[AlertEngine] Dormant, speeding timer cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_speeding_armed(&self) -> bool {
        self.speeding_timer.is_armed()
    }

    pub fn last_distance_alert_km(&self) -> u64 {
        self.last_distance_alert_km
    }

    /// Evaluate all rules against one live update.
    pub fn evaluate(&mut self, update: &LiveUpdate, bike: &Bike, now: Instant) -> Vec<Alert> {
        if !self.active {
            return Vec::new();
        }

        let mut alerts = Vec::new();

        // A deadline that passed before this update already counted
        if let Some(alert) = self.poll(now) {
            alerts.push(alert);
        }

        if let Some(alert) = self.check_milestone(update) {
            alerts.push(alert);
        }

        self.check_speed(update.speed_kmh, bike, now);

        if let Some(alert) = self.check_fuel(update.fuel_liters, bike) {
            alerts.push(alert);
        }

        alerts
    }

    /// Fire the speeding timer if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<Alert> {
        if !self.active || !self.speeding_timer.fire_if_due(now) {
            return None;
        }
        info!(
            "[AlertEngine] Sustained speeding above {:.0} km/h",
            self.speeding_limit_kmh
        );
        Some(Alert::Speeding {
            limit_kmh: self.speeding_limit_kmh,
        })
    }

    fn check_milestone(&mut self, update: &LiveUpdate) -> Option<Alert> {
        if !(update.distance_km.is_finite() && update.distance_km > 0.0) {
            return None;
        }
        let floored_km = update.distance_km.floor() as u64;
        if floored_km == 0 || floored_km < self.last_distance_alert_km + self.milestone_interval_km
        {
            return None;
        }

        self.last_distance_alert_km = floored_km;
        info!("[AlertEngine] Milestone at {} km", floored_km);
        Some(Alert::DistanceMilestone {
            distance_km: floored_km,
            remaining_range_km: update.remaining_range_km.max(0.0).floor() as u64,
        })
    }

    fn check_speed(&mut self, speed_kmh: f64, bike: &Bike, now: Instant) {
        let limit = bike.optimal_speed.max;
        if speed_kmh > limit {
            if self.speeding_timer.arm(now, self.speeding_hold) {
                self.speeding_limit_kmh = limit;
                debug!(
                    "[AlertEngine] {:.1} km/h above {:.0}, speeding timer armed",
                    speed_kmh, limit
                );
            }
        } else if self.speeding_timer.cancel() {
            debug!("[AlertEngine] Back under {:.0} km/h, speeding timer cancelled", limit);
        }
    }

    fn check_fuel(&mut self, fuel_liters: f64, bike: &Bike) -> Option<Alert> {
        let reserve = is_reserve_at(fuel_liters, bike, self.reserve_percent);
        if !reserve {
            self.low_fuel_alert_given = false;
            return None;
        }
        if self.low_fuel_alert_given {
            return None;
        }
        self.low_fuel_alert_given = true;
        info!("[AlertEngine] Entered reserve at {:.2} L", fuel_liters);
        Some(Alert::LowFuel { fuel_liters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bikes::default_bike;

    fn engine() -> AlertEngine {
        let mut engine = AlertEngine::new(&TrackerConfig::default());
        engine.set_active(true);
        engine
    }

    fn update(distance_km: f64, speed_kmh: f64, fuel_liters: f64) -> LiveUpdate {
        LiveUpdate {
            distance_km,
            speed_kmh,
            fuel_liters,
            remaining_range_km: fuel_liters * 44.0,
        }
    }

    fn secs(start: Instant, s: u64) -> Instant {
        start + Duration::from_secs(s)
    }

    #[test]
    fn test_timer() {
        let t0 = Instant::now();
        let mut timer = OneShotTimer::new();
        assert!(timer.arm(t0, Duration::from_secs(10)));
        assert!(!timer.arm(secs(t0, 5), Duration::from_secs(10)));
        assert_eq!(timer.deadline(), Some(secs(t0, 10)));
        assert!(!timer.fire_if_due(secs(t0, 9)));
        assert!(timer.fire_if_due(secs(t0, 10)));
        assert!(!timer.is_armed());
        assert!(!timer.cancel());
    }

    #[test]
    fn test_milestones_once_per_bracket() {
        let bike = default_bike();
        let t0 = Instant::now();
        let mut engine = engine();

        let mut fired = Vec::new();
        let mut d = 0.0;
        while d < 16.0 {
            for alert in engine.evaluate(&update(d, 40.0, 8.0), &bike, t0) {
                if let Alert::DistanceMilestone { distance_km, .. } = alert {
                    fired.push(distance_km);
                }
            }
            d += 0.25;
        }
        assert_eq!(fired, vec![5, 10, 15]);
    }

    #[test]
    fn test_milestone_ignores_fluctuation() {
        let bike = default_bike();
        let t0 = Instant::now();
        let mut engine = engine();

        assert_eq!(engine.evaluate(&update(5.1, 40.0, 8.0), &bike, t0).len(), 1);
        for d in [4.9, 5.3, 4.99, 9.99, 5.0] {
            assert!(engine.evaluate(&update(d, 40.0, 8.0), &bike, t0).is_empty());
        }
        assert_eq!(engine.last_distance_alert_km(), 5);
    }

    #[test]
    fn test_milestone_message_includes_range() {
        let bike = default_bike();
        let mut engine = engine();
        let alerts = engine.evaluate(
            &LiveUpdate {
                distance_km: 5.4,
                speed_kmh: 40.0,
                fuel_liters: 7.0,
                remaining_range_km: 302.6,
            },
            &bike,
            Instant::now(),
        );
        assert_eq!(
            alerts,
            vec![Alert::DistanceMilestone {
                distance_km: 5,
                remaining_range_km: 302
            }]
        );
        assert!(alerts[0].message().contains("302"));
    }

    #[test]
    fn test_sustained_speeding_fires_after_hold() {
        let bike = default_bike(); // max 55
        let t0 = Instant::now();
        let mut engine = engine();

        for s in 0..10 {
            assert!(engine.evaluate(&update(1.0, 70.0, 8.0), &bike, secs(t0, s)).is_empty());
        }
        assert_eq!(
            engine.poll(secs(t0, 10)),
            Some(Alert::Speeding { limit_kmh: 55.0 })
        );
        // Disarmed after firing; the next fast sample re-arms
        assert!(!engine.is_speeding_armed());
        engine.evaluate(&update(1.0, 70.0, 8.0), &bike, secs(t0, 11));
        assert!(engine.is_speeding_armed());
    }

    #[test]
    fn test_dip_at_nine_seconds_suppresses() {
        let bike = default_bike();
        let t0 = Instant::now();
        let mut engine = engine();

        for s in 0..9 {
            engine.evaluate(&update(1.0, 70.0, 8.0), &bike, secs(t0, s));
        }
        engine.evaluate(&update(1.0, 50.0, 8.0), &bike, secs(t0, 9));
        assert!(!engine.is_speeding_armed());
        assert_eq!(engine.poll(secs(t0, 10)), None);
        assert_eq!(engine.poll(secs(t0, 30)), None);
    }

    #[test]
    fn test_overdue_timer_fires_on_next_update() {
        let bike = default_bike();
        let t0 = Instant::now();
        let mut engine = engine();

        engine.evaluate(&update(1.0, 70.0, 8.0), &bike, t0);
        // No poll in between; the next sample arrives late and slow
        let alerts = engine.evaluate(&update(1.0, 40.0, 8.0), &bike, secs(t0, 12));
        assert_eq!(alerts, vec![Alert::Speeding { limit_kmh: 55.0 }]);
    }

    #[test]
    fn test_low_fuel_edge_triggered() {
        let bike = default_bike(); // 8 L tank, reserve at <= 1.2 L
        let t0 = Instant::now();
        let mut engine = engine();

        assert!(engine.evaluate(&update(1.0, 40.0, 2.0), &bike, t0).is_empty());
        assert_eq!(
            engine.evaluate(&update(1.0, 40.0, 1.1), &bike, t0),
            vec![Alert::LowFuel { fuel_liters: 1.1 }]
        );
        assert!(engine.evaluate(&update(1.0, 40.0, 1.0), &bike, t0).is_empty());

        // Leaving reserve re-arms the alert
        assert!(engine.evaluate(&update(1.0, 40.0, 5.0), &bike, t0).is_empty());
        assert_eq!(engine.evaluate(&update(1.0, 40.0, 0.9), &bike, t0).len(), 1);
    }

    #[test]
    fn test_dormant_engine() {
        let bike = default_bike();
        let t0 = Instant::now();
        let mut engine = engine();

        engine.evaluate(&update(1.0, 70.0, 8.0), &bike, t0);
        assert!(engine.is_speeding_armed());

        engine.set_active(false);
        assert!(!engine.is_speeding_armed());
        assert!(engine.evaluate(&update(20.0, 90.0, 0.5), &bike, t0).is_empty());
        assert_eq!(engine.poll(secs(t0, 60)), None);
    }

    #[test]
    fn test_reset_for_session() {
        let bike = default_bike();
        let t0 = Instant::now();
        let mut engine = engine();
        engine.evaluate(&update(6.0, 70.0, 1.0), &bike, t0);
        assert_eq!(engine.last_distance_alert_km(), 6);

        engine.reset_for_session();
        assert_eq!(engine.last_distance_alert_km(), 0);
        assert!(!engine.is_speeding_armed());
        assert_eq!(engine.evaluate(&update(6.0, 40.0, 1.0), &bike, t0).len(), 2);
    }
}
