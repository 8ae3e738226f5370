//! Mileage advice from an external AI service.
//!
//! The service itself is opaque: trip data in, advice text out. This module
//! owns the prompt, the too-little-data short circuit, the user-facing
//! fallbacks, and [`AdviceSlot`], which makes sure only the most recent
//! request can land its answer.

use log::{debug, warn};

use crate::{Result, TrackingData};

pub const NOT_ENOUGH_DATA_MESSAGE: &str = "Not enough driving data. Please track a longer trip.";
pub const ADVICE_FALLBACK_MESSAGE: &str =
    "Sorry, I could not get advice at this time. Please check your API key and try again.";

/// Produces riding tips for a finished trip.
#[allow(async_fn_in_trait)]
pub trait AdviceService {
    /// Fails with `ConfigurationError` or `ServiceFailure`.
    async fn get_mileage_tips(&self, data: &TrackingData) -> Result<String>;
}

/// Prompt sent to the language model for `data`.
pub fn build_prompt(data: &TrackingData) -> String {
    format!(
        "Analyze the following bike driving data and provide actionable tips to improve mileage.\n\
         The response should be concise, friendly, and formatted as a list of suggestions.\n\
         - Total Distance: {:.2} km\n\
         - Average Speed: {:.2} km/h\n\
         - Maximum Speed: {:.2} km/h\n\
         \n\
         Based on this data, how can the rider improve their fuel efficiency?",
        data.distance_km,
        data.mean_speed_kmh(),
        data.max_speed_kmh()
    )
}

/// Identifies one advice request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdviceTicket(u64);

/// Outcome of asking a session for advice.
#[derive(Debug, Clone, PartialEq)]
pub enum AdviceRequest {
    /// Call the service with `data`, then hand the result back with `ticket`.
    Ready {
        ticket: AdviceTicket,
        data: TrackingData,
    },
    /// Too few samples; the canned message is already in the slot.
    NotEnoughData,
    /// Advice is only given for a finished trip.
    StillTracking,
}

/// Holds the advice text; the last request wins.
///
/// Every new request or reset bumps the generation, so an answer that
/// arrives for an older ticket is dropped.
#[derive(Debug, Default)]
pub struct AdviceSlot {
    generation: u64,
    advice: Option<String>,
    loading: bool,
}

impl AdviceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> AdviceTicket {
        self.generation += 1;
        self.advice = None;
        self.loading = true;
        AdviceTicket(self.generation)
    }

    /// Store the outcome for `ticket`. Returns false if it was superseded.
    pub fn complete(&mut self, ticket: AdviceTicket, result: Result<String>) -> bool {
        if ticket.0 != self.generation {
            debug!(
                "[AdviceSlot] Dropping stale advice (ticket {}, current {})",
                ticket.0, self.generation
            );
            return false;
        }
        self.loading = false;
        self.advice = Some(match result {
            Ok(text) => text,
            Err(e) => {
                warn!("[AdviceSlot] Advice request failed: {}", e);
                ADVICE_FALLBACK_MESSAGE.to_string()
            }
        });
        true
    }

    /// Replace the slot content with a local message.
    pub fn set_message(&mut self, message: &str) {
        self.generation += 1;
        self.loading = false;
        self.advice = Some(message.to_string());
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.loading = false;
        self.advice = None;
    }

    pub fn advice(&self) -> Option<&str> {
        self.advice.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }
}

/// One-shot advice for `data`: never fails, always returns display text.
pub async fn fetch_advice<S: AdviceService>(
    service: &S,
    data: &TrackingData,
    min_samples: usize,
) -> String {
    if data.sample_count() < min_samples {
        return NOT_ENOUGH_DATA_MESSAGE.to_string();
    }
    match service.get_mileage_tips(data).await {
        Ok(text) => text,
        Err(e) => {
            warn!("[Advice] {}", e);
            ADVICE_FALLBACK_MESSAGE.to_string()
        }
    }
}
