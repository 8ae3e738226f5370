//! Trip and app-state storage boundary.

use serde::{Deserialize, Serialize};

use crate::bikes::Bike;
use crate::trip::TripRecord;
use crate::{MileageError, Result};

/// What survives an app restart besides trip history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub bike: Bike,
    pub fuel_liters: f64,
}

/// Local structured storage for trips and app state.
///
/// Storage failures are returned to the caller for display; nothing here
/// retries.
pub trait TripRepository {
    /// Prepare storage. Must be safe to call more than once.
    fn initialize(&mut self) -> Result<()>;

    fn get_app_state(&self) -> Result<Option<AppState>>;

    fn save_app_state(&mut self, state: &AppState) -> Result<()>;

    /// Store a trip and return its new id. Any id on `record` is ignored.
    fn add_trip(&mut self, record: &TripRecord) -> Result<i64>;

    /// All trips, oldest first.
    fn get_all_trips(&self) -> Result<Vec<TripRecord>>;

    fn delete_trip(&mut self, id: i64) -> Result<()>;

    fn clear_trips(&mut self) -> Result<()>;
}

/// Volatile repository for tests and hosts without storage.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    initialized: bool,
    app_state: Option<AppState>,
    trips: Vec<TripRecord>,
    next_id: i64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded with saved app state, as if restored from a previous run.
    pub fn with_app_state(state: AppState) -> Self {
        Self {
            app_state: Some(state),
            ..Self::default()
        }
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(MileageError::storage("repository not initialized"))
        }
    }
}

impl TripRepository for InMemoryRepository {
    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn get_app_state(&self) -> Result<Option<AppState>> {
        self.ensure_initialized()?;
        Ok(self.app_state.clone())
    }

    fn save_app_state(&mut self, state: &AppState) -> Result<()> {
        self.ensure_initialized()?;
        self.app_state = Some(state.clone());
        Ok(())
    }

    fn add_trip(&mut self, record: &TripRecord) -> Result<i64> {
        self.ensure_initialized()?;
        self.next_id += 1;
        let id = self.next_id;
        self.trips.push(record.clone().with_id(id));
        Ok(id)
    }

    fn get_all_trips(&self) -> Result<Vec<TripRecord>> {
        self.ensure_initialized()?;
        Ok(self.trips.clone())
    }

    fn delete_trip(&mut self, id: i64) -> Result<()> {
        self.ensure_initialized()?;
        self.trips.retain(|t| t.id != Some(id));
        Ok(())
    }

    fn clear_trips(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        self.trips.clear();
        Ok(())
    }
}
