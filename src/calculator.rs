//! Measured mileage: ride a stretch, enter the fuel it took, get km/L.
//!
//! Runs its own sampler subscription and accumulator, independent of any
//! [`TrackingSession`](crate::TrackingSession).

use log::{info, warn};

use crate::accumulator::DistanceAccumulator;
use crate::config::WatchOptions;
use crate::sampler::{GeoError, GeoSampler, PositionSource, SampleFeed, SamplerEvent};
use crate::Sample;

/// Kilometers per liter for a measured run; `None` unless both inputs are positive.
pub fn measured_km_per_liter(distance_km: f64, fuel_used_l: f64) -> Option<f64> {
    if distance_km > 0.0 && fuel_used_l.is_finite() && fuel_used_l > 0.0 {
        Some(distance_km / fuel_used_l)
    } else {
        None
    }
}

pub struct MileageCalculator<P: PositionSource> {
    sampler: GeoSampler<P>,
    feed: Option<SampleFeed>,
    accumulator: DistanceAccumulator,
    calculating: bool,
    average: Option<f64>,
    error: Option<String>,
}

impl<P: PositionSource> MileageCalculator<P> {
    pub fn new(source: P, options: WatchOptions) -> Self {
        Self {
            sampler: GeoSampler::new(source, options),
            feed: None,
            accumulator: DistanceAccumulator::new(),
            calculating: false,
            average: None,
            error: None,
        }
    }

    /// Start a new measuring run from zero.
    pub fn start(&mut self) {
        self.accumulator.reset();
        self.average = None;
        self.error = None;
        self.feed = Some(self.sampler.start_feed());
        self.calculating = true;
        info!("[MileageCalculator] Measuring run started");
    }

    /// Apply queued sampler events.
    pub fn pump(&mut self) {
        let events = match &self.feed {
            Some(feed) => feed.drain(),
            None => return,
        };
        for event in events {
            match event {
                SamplerEvent::Sample(sample) => self.add_sample(&sample),
                SamplerEvent::Error(err) => self.handle_error(err),
            }
        }
    }

    pub fn add_sample(&mut self, sample: &Sample) {
        if !self.calculating {
            return;
        }
        self.accumulator.add_sample(sample.position);
        self.error = None;
    }

    pub fn handle_error(&mut self, err: GeoError) {
        warn!("[MileageCalculator] Position error: {}", err);
        self.error = Some(err.message().to_string());
    }

    /// Stop the run and compute its average from the fuel it used.
    pub fn stop_and_calculate(&mut self, fuel_used_l: f64) -> Option<f64> {
        self.pump();
        self.feed = None;
        self.sampler.stop();
        self.calculating = false;

        let distance_km = self.accumulator.total_distance_km();
        self.average = measured_km_per_liter(distance_km, fuel_used_l);
        match self.average {
            Some(avg) => info!(
                "[MileageCalculator] {:.2} km on {:.2} L = {:.1} km/L",
                distance_km, fuel_used_l, avg
            ),
            None => warn!(
                "[MileageCalculator] Cannot compute average from {:.2} km and {} L",
                distance_km, fuel_used_l
            ),
        }
        self.average
    }

    /// Stop and forget the run.
    pub fn reset(&mut self) {
        self.feed = None;
        self.sampler.stop();
        self.accumulator.reset();
        self.calculating = false;
        self.average = None;
        self.error = None;
    }

    pub fn distance_km(&self) -> f64 {
        self.accumulator.total_distance_km()
    }

    pub fn is_calculating(&self) -> bool {
        self.calculating
    }

    pub fn average(&self) -> Option<f64> {
        self.average
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
