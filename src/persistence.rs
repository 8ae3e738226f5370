//! # SQLite Trip Repository
//!
//! Stores trip history and the current bike / fuel state in SQLite.
//!
//! ## Tables
//!
//! - `app_state`: a single row keyed `'appState'` with the selected bike
//!   and current fuel volume
//! - `trips`: one row per completed trip; the raw speed history is kept as
//!   a MessagePack blob since it is only ever read back whole

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::bikes::{Bike, SpeedRange};
use crate::repository::{AppState, TripRepository};
use crate::trip::TripRecord;
use crate::{MileageError, Result};

const APP_STATE_KEY: &str = "appState";

/// Trip repository backed by a SQLite database file.
pub struct SqliteTripRepository {
    /// Database connection
    db: Connection,

    /// Database path (":memory:" for tests)
    db_path: String,
}

impl SqliteTripRepository {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) the database at `db_path`.
    ///
    /// The schema is not created until [`TripRepository::initialize`].
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Selected bike and fuel (single row)
            CREATE TABLE IF NOT EXISTS app_state (
                id TEXT PRIMARY KEY,
                make TEXT NOT NULL,
                model TEXT NOT NULL,
                average_km_per_liter REAL NOT NULL,
                tank_size_liters REAL NOT NULL,
                optimal_min REAL NOT NULL,
                optimal_max REAL NOT NULL,
                fuel_liters REAL NOT NULL
            );

            -- Completed trips
            CREATE TABLE IF NOT EXISTS trips (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                distance_km REAL NOT NULL,
                speed_history BLOB NOT NULL,
                bike_make TEXT NOT NULL,
                bike_model TEXT NOT NULL,
                avg_speed_kmh REAL NOT NULL,
                max_speed_kmh REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_trips_date ON trips(date);
            "#,
        )?;
        Ok(())
    }

    // ========================================================================
    // Row mapping
    // ========================================================================

    fn load_trips(&self) -> Result<Vec<TripRecord>> {
        let mut stmt = self.db.prepare(
            "SELECT id, date, distance_km, speed_history, bike_make, bike_model,
                    avg_speed_kmh, max_speed_kmh
             FROM trips ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, f64>(7)?,
            ))
        })?;

        let mut trips = Vec::new();
        for row in rows {
            let (id, date, distance_km, blob, bike_make, bike_model, avg, max) = row?;
            let date = DateTime::parse_from_rfc3339(&date)
                .map_err(|e| MileageError::storage(format!("trip {} has bad date: {}", id, e)))?
                .with_timezone(&Utc);
            let speed_history: Vec<f64> = rmp_serde::from_slice(&blob)?;

            trips.push(TripRecord {
                id: Some(id),
                date,
                distance_km,
                speed_history,
                bike_make,
                bike_model,
                avg_speed_kmh: avg,
                max_speed_kmh: max,
            });
        }
        Ok(trips)
    }
}

impl TripRepository for SqliteTripRepository {
    fn initialize(&mut self) -> Result<()> {
        Self::init_schema(&self.db)?;
        info!("[SqliteTripRepository] Ready at {}", self.db_path);
        Ok(())
    }

    fn get_app_state(&self) -> Result<Option<AppState>> {
        let state = self
            .db
            .query_row(
                "SELECT make, model, average_km_per_liter, tank_size_liters,
                        optimal_min, optimal_max, fuel_liters
                 FROM app_state WHERE id = ?",
                params![APP_STATE_KEY],
                |row| {
                    Ok(AppState {
                        bike: Bike {
                            make: row.get(0)?,
                            model: row.get(1)?,
                            average_km_per_liter: row.get(2)?,
                            tank_size_liters: row.get(3)?,
                            optimal_speed: SpeedRange::new(row.get(4)?, row.get(5)?),
                        },
                        fuel_liters: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    fn save_app_state(&mut self, state: &AppState) -> Result<()> {
        let bike = &state.bike;
        self.db.execute(
            "INSERT OR REPLACE INTO app_state
                (id, make, model, average_km_per_liter, tank_size_liters,
                 optimal_min, optimal_max, fuel_liters)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                APP_STATE_KEY,
                bike.make,
                bike.model,
                bike.average_km_per_liter,
                bike.tank_size_liters,
                bike.optimal_speed.min,
                bike.optimal_speed.max,
                state.fuel_liters,
            ],
        )?;
        debug!(
            "[SqliteTripRepository] Saved state: {} with {:.2} L",
            bike.display_name(),
            state.fuel_liters
        );
        Ok(())
    }

    fn add_trip(&mut self, record: &TripRecord) -> Result<i64> {
        let blob = rmp_serde::to_vec(&record.speed_history)?;
        self.db.execute(
            "INSERT INTO trips
                (date, distance_km, speed_history, bike_make, bike_model,
                 avg_speed_kmh, max_speed_kmh)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.date.to_rfc3339(),
                record.distance_km,
                blob,
                record.bike_make,
                record.bike_model,
                record.avg_speed_kmh,
                record.max_speed_kmh,
            ],
        )?;
        let id = self.db.last_insert_rowid();
        debug!(
            "[SqliteTripRepository] Trip {} stored ({:.2} km, {} samples)",
            id,
            record.distance_km,
            record.speed_history.len()
        );
        Ok(id)
    }

    fn get_all_trips(&self) -> Result<Vec<TripRecord>> {
        self.load_trips()
    }

    fn delete_trip(&mut self, id: i64) -> Result<()> {
        self.db.execute("DELETE FROM trips WHERE id = ?", params![id])?;
        Ok(())
    }

    fn clear_trips(&mut self) -> Result<()> {
        self.db.execute("DELETE FROM trips", [])?;
        info!("[SqliteTripRepository] Trip history cleared");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
