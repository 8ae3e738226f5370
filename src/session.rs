//! # Tracking Session
//!
//! Orchestrates one rider's trips: owns the sampler subscription, the
//! distance accumulator, live [`TrackingData`], fuel state and the alert
//! engine, and writes finished trips to the injected repository.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle --start()--> Tracking --stop()--> Idle
//!                      |  ^
//!                      +--+ sample / error
//! ```
//!
//! The session is single-threaded. The sampler queues events into a
//! [`SampleFeed`] and the host's event loop calls [`TrackingSession::pump`],
//! which applies them in delivery order before firing due timers.

use std::time::Instant;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::accumulator::DistanceAccumulator;
use crate::advice::{
    fetch_advice, AdviceRequest, AdviceService, AdviceSlot, AdviceTicket, NOT_ENOUGH_DATA_MESSAGE,
};
use crate::alerts::{Alert, AlertEngine, LiveUpdate, NullSpeaker, Speaker};
use crate::bikes::{default_bike, Bike, SpeedBand};
use crate::config::TrackerConfig;
use crate::fuel::{self, FuelState};
use crate::repository::{AppState, TripRepository};
use crate::sampler::{GeoError, GeoSampler, PositionSource, SampleFeed, SamplerEvent};
use crate::trip::TripRecord;
use crate::{Result, Sample, TrackingData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Tracking,
}

/// Everything a display layer needs to draw the tracker screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub state: SessionState,
    pub bike: Bike,
    pub fuel_liters: f64,
    pub distance_km: f64,
    pub current_speed_kmh: f64,
    pub speed_band: SpeedBand,
    pub total_range_km: f64,
    pub remaining_range_km: f64,
    pub is_reserve: bool,
    pub is_tank_full: bool,
    pub error: Option<String>,
    pub sample_count: usize,
}

/// The tracking state machine.
pub struct TrackingSession<P: PositionSource, R: TripRepository> {
    config: TrackerConfig,

    // Sampling
    sampler: GeoSampler<P>,
    feed: Option<SampleFeed>,
    accumulator: DistanceAccumulator,
    data: TrackingData,
    current_speed_kmh: f64,

    // Bike and fuel
    bike: Bike,
    fuel: FuelState,

    state: SessionState,

    // Voice alerts
    alerts: AlertEngine,
    voice_enabled: bool,
    speaker: Box<dyn Speaker + Send>,

    advice: AdviceSlot,
    error_banner: Option<String>,

    repository: R,
}

impl<P: PositionSource, R: TripRepository> TrackingSession<P, R> {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Initialize `repository` and restore the saved bike and fuel.
    pub fn new(source: P, mut repository: R, config: TrackerConfig) -> Result<Self> {
        repository.initialize()?;

        let (bike, fuel) = match repository.get_app_state()? {
            Some(state) => {
                let bike = match state.bike.validate() {
                    Ok(()) => state.bike,
                    Err(e) => {
                        warn!("[TrackingSession] Saved bike rejected ({}), using default", e);
                        default_bike()
                    }
                };
                let fuel = FuelState::new(state.fuel_liters, &bike);
                (bike, fuel)
            }
            None => {
                let bike = default_bike();
                let fuel = FuelState::new(config.default_fuel_l, &bike);
                (bike, fuel)
            }
        };

        info!(
            "[TrackingSession] Ready: {} with {:.2} L",
            bike.display_name(),
            fuel.liters()
        );

        Ok(Self {
            sampler: GeoSampler::new(source, config.watch),
            feed: None,
            accumulator: DistanceAccumulator::new(),
            data: TrackingData::default(),
            current_speed_kmh: 0.0,
            bike,
            fuel,
            state: SessionState::Idle,
            alerts: AlertEngine::new(&config),
            voice_enabled: false,
            speaker: Box::new(NullSpeaker),
            advice: AdviceSlot::new(),
            error_banner: None,
            repository,
            config,
        })
    }

    /// Route spoken alerts to `speaker`.
    pub fn with_speaker(mut self, speaker: impl Speaker + Send + 'static) -> Self {
        self.speaker = Box::new(speaker);
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Begin a fresh trip. Starting while tracking restarts from zero.
    pub fn start(&mut self) {
        self.accumulator.reset();
        self.data.clear();
        self.current_speed_kmh = 0.0;
        self.advice.clear();
        self.error_banner = None;
        self.alerts.reset_for_session();

        self.state = SessionState::Tracking;
        self.feed = Some(self.sampler.start_feed());
        self.sync_alerts();

        info!("[TrackingSession] Tracking started on {}", self.bike.display_name());
    }

    /// End the trip, burn its fuel and store it if long enough.
    ///
    /// Returns the stored record with its repository id. The session is
    /// already idle when a storage error is returned. Stopping while idle
    /// does nothing.
    pub fn stop(&mut self) -> Result<Option<TripRecord>> {
        if self.state == SessionState::Idle {
            self.sampler.stop();
            return Ok(None);
        }

        // Fixes delivered before the stop still belong to this trip
        if let Some(feed) = self.feed.take() {
            for event in feed.drain() {
                match event {
                    SamplerEvent::Sample(sample) => {
                        self.record_sample(&sample);
                        self.error_banner = None;
                    }
                    SamplerEvent::Error(err) => self.handle_error(err),
                }
            }
        }
        self.sampler.stop();
        self.state = SessionState::Idle;
        self.current_speed_kmh = 0.0;
        self.sync_alerts();

        let distance_km = self.data.distance_km;
        let burned = self.fuel.consume_distance(distance_km, &self.bike);
        info!(
            "[TrackingSession] Stopped after {:.3} km, {:.3} L used, {:.2} L left",
            distance_km,
            burned,
            self.fuel.liters()
        );
        let saved = self.save_app_state();

        let record = if distance_km > self.config.min_trip_distance_km {
            let record = TripRecord::from_tracking(&self.data, &self.bike, Utc::now());
            let id = self.repository.add_trip(&record)?;
            info!("[TrackingSession] Trip {} saved", id);
            Some(record.with_id(id))
        } else {
            debug!(
                "[TrackingSession] {:.3} km is below the {:.1} km minimum, trip not saved",
                distance_km, self.config.min_trip_distance_km
            );
            None
        };

        saved?;
        Ok(record)
    }

    /// Stop any running trip the usual way, then clear it and fill the tank.
    ///
    /// A trip long enough to keep is stored before it is cleared.
    pub fn reset(&mut self) -> Result<()> {
        if self.state == SessionState::Tracking {
            self.stop()?;
        }
        self.feed = None;
        self.sampler.stop();
        self.state = SessionState::Idle;
        self.sync_alerts();

        self.accumulator.reset();
        self.data.clear();
        self.current_speed_kmh = 0.0;
        self.advice.clear();
        self.fuel = FuelState::full(&self.bike);

        info!("[TrackingSession] Reset, tank full at {:.2} L", self.fuel.liters());
        self.save_app_state()
    }

    // ========================================================================
    // Event handling
    // ========================================================================

    /// Apply every queued sampler event, then fire due timers.
    pub fn pump(&mut self, now: Instant) -> Vec<Alert> {
        let events = match &self.feed {
            Some(feed) => feed.drain(),
            None => Vec::new(),
        };

        let mut alerts = Vec::new();
        for event in events {
            match event {
                SamplerEvent::Sample(sample) => alerts.extend(self.handle_sample(sample, now)),
                SamplerEvent::Error(err) => self.handle_error(err),
            }
        }
        alerts.extend(self.tick(now));
        alerts
    }

    /// Apply one sample and evaluate alerts against it.
    pub fn handle_sample(&mut self, sample: Sample, now: Instant) -> Vec<Alert> {
        if self.state != SessionState::Tracking {
            debug!("[TrackingSession] Sample while idle ignored");
            return Vec::new();
        }

        self.record_sample(&sample);
        self.error_banner = None;

        let update = self.live_update();
        let alerts = self.alerts.evaluate(&update, &self.bike, now);
        self.announce(&alerts);
        alerts
    }

    /// Show a sampler error. Tracking carries on.
    pub fn handle_error(&mut self, err: GeoError) {
        warn!("[TrackingSession] Position error: {}", err);
        self.error_banner = Some(err.message().to_string());
    }

    /// Fire the speeding timer if it is due.
    pub fn tick(&mut self, now: Instant) -> Vec<Alert> {
        let alerts: Vec<Alert> = self.alerts.poll(now).into_iter().collect();
        self.announce(&alerts);
        alerts
    }

    fn record_sample(&mut self, sample: &Sample) {
        self.accumulator.add_sample(sample.position);
        self.data.distance_km = self.accumulator.total_distance_km();
        self.data.speed_history.push(sample.speed_kmh);
        self.current_speed_kmh = sample.speed_kmh;
    }

    fn live_update(&self) -> LiveUpdate {
        LiveUpdate {
            distance_km: self.data.distance_km,
            speed_kmh: self.current_speed_kmh,
            fuel_liters: self.fuel.liters(),
            remaining_range_km: self.remaining_range_km(),
        }
    }

    fn announce(&self, alerts: &[Alert]) {
        for alert in alerts {
            self.speaker.speak(&alert.message());
        }
    }

    // ========================================================================
    // Voice assistant
    // ========================================================================

    pub fn set_voice_assistant(&mut self, enabled: bool) {
        self.voice_enabled = enabled;
        self.sync_alerts();
        info!(
            "[TrackingSession] Voice assistant {}",
            if enabled { "on" } else { "off" }
        );
    }

    pub fn voice_assistant(&self) -> bool {
        self.voice_enabled
    }

    fn sync_alerts(&mut self) {
        self.alerts
            .set_active(self.state == SessionState::Tracking && self.voice_enabled);
    }

    // ========================================================================
    // Bike and fuel
    // ========================================================================

    pub fn select_bike(&mut self, bike: Bike) -> Result<()> {
        bike.validate()?;
        self.fuel.fit_to(&bike);
        info!("[TrackingSession] Bike set to {}", bike.display_name());
        self.bike = bike;
        self.save_app_state()
    }

    /// Add fuel; returns the new volume.
    pub fn refill(&mut self, amount_l: f64) -> Result<f64> {
        let liters = self.fuel.refill(amount_l, &self.bike)?;
        self.save_app_state()?;
        Ok(liters)
    }

    /// Fill the tank. Returns false when it was already full.
    pub fn fill_to_full(&mut self) -> Result<bool> {
        if !self
            .fuel
            .fill_to_full(&self.bike, self.config.full_tank_tolerance_l)
        {
            return Ok(false);
        }
        self.save_app_state()?;
        Ok(true)
    }

    fn save_app_state(&mut self) -> Result<()> {
        let state = AppState {
            bike: self.bike.clone(),
            fuel_liters: self.fuel.liters(),
        };
        self.repository.save_app_state(&state)
    }

    // ========================================================================
    // Range
    // ========================================================================

    /// Distance not yet charged against the fuel volume.
    fn pending_distance_km(&self) -> f64 {
        match self.state {
            SessionState::Tracking => self.data.distance_km,
            SessionState::Idle => 0.0,
        }
    }

    pub fn total_range_km(&self) -> f64 {
        fuel::total_range_km(self.fuel.liters(), &self.bike)
    }

    pub fn remaining_range_km(&self) -> f64 {
        fuel::remaining_range_km(self.fuel.liters(), &self.bike, self.pending_distance_km())
    }

    /// Reserve is judged on the stored volume, which a trip only charges on stop.
    pub fn is_reserve(&self) -> bool {
        fuel::is_reserve_at(self.fuel.liters(), &self.bike, self.config.reserve_percent)
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            state: self.state,
            bike: self.bike.clone(),
            fuel_liters: self.fuel.liters(),
            distance_km: self.data.distance_km,
            current_speed_kmh: self.current_speed_kmh,
            speed_band: self.bike.classify_speed(self.current_speed_kmh),
            total_range_km: self.total_range_km(),
            remaining_range_km: self.remaining_range_km(),
            is_reserve: self.is_reserve(),
            is_tank_full: self.fuel.is_full(&self.bike),
            error: self.error_banner.clone(),
            sample_count: self.data.sample_count(),
        }
    }

    // ========================================================================
    // Advice
    // ========================================================================

    /// Decide whether the finished trip can be sent for advice.
    pub fn prepare_advice(&mut self) -> AdviceRequest {
        if self.state == SessionState::Tracking {
            return AdviceRequest::StillTracking;
        }
        if self.data.sample_count() < self.config.min_advice_samples {
            self.advice.set_message(NOT_ENOUGH_DATA_MESSAGE);
            return AdviceRequest::NotEnoughData;
        }
        AdviceRequest::Ready {
            ticket: self.advice.begin(),
            data: self.data.clone(),
        }
    }

    /// Store a service result. Returns false if a newer request superseded it.
    pub fn complete_advice(&mut self, ticket: AdviceTicket, result: Result<String>) -> bool {
        self.advice.complete(ticket, result)
    }

    /// Ask `service` for tips on the finished trip and store the answer.
    pub async fn request_advice<S: AdviceService>(&mut self, service: &S) -> Option<String> {
        match self.prepare_advice() {
            AdviceRequest::Ready { ticket, data } => {
                let text = fetch_advice(service, &data, self.config.min_advice_samples).await;
                self.complete_advice(ticket, Ok(text));
            }
            AdviceRequest::NotEnoughData => {}
            AdviceRequest::StillTracking => return None,
        }
        self.advice().map(str::to_string)
    }

    pub fn advice(&self) -> Option<&str> {
        self.advice.advice()
    }

    pub fn is_advice_loading(&self) -> bool {
        self.advice.is_loading()
    }

    // ========================================================================
    // Trip history
    // ========================================================================

    pub fn trip_history(&self) -> Result<Vec<TripRecord>> {
        self.repository.get_all_trips()
    }

    pub fn delete_trip(&mut self, id: i64) -> Result<()> {
        self.repository.delete_trip(id)
    }

    pub fn clear_trip_history(&mut self) -> Result<()> {
        self.repository.clear_trips()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == SessionState::Tracking
    }

    pub fn tracking_data(&self) -> &TrackingData {
        &self.data
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.current_speed_kmh
    }

    pub fn bike(&self) -> &Bike {
        &self.bike
    }

    pub fn fuel_liters(&self) -> f64 {
        self.fuel.liters()
    }

    pub fn error_banner(&self) -> Option<&str> {
        self.error_banner.as_deref()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn source(&self) -> &P {
        self.sampler.source()
    }
}

// ============================================================================
// Tests
// ============================================================================
