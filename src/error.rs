//! Unified error handling for the mileage companion.
//!
//! Geo sampler failures are deliberately not part of this type: they are
//! recovered locally into a display banner (see [`crate::sampler::GeoError`]).
//! Everything that a caller has to react to goes through [`MileageError`].

use std::fmt;

/// Unified error type for tracker, storage and advice operations.
#[derive(Debug, Clone, PartialEq)]
pub enum MileageError {
    /// Advice service or tracker configuration is missing or malformed
    ConfigurationError { message: String },
    /// Remote advice service call failed
    ServiceFailure {
        message: String,
        status_code: Option<u16>,
    },
    /// Trip repository failure
    StorageError { message: String },
    /// Refill amount was zero, negative or not a number
    InvalidFuelAmount { amount: f64 },
    /// Bike reference data is unusable (zero tank, inverted speed range, ...)
    InvalidBike { message: String },
    /// Generic internal error
    Internal { message: String },
}

impl fmt::Display for MileageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MileageError::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            MileageError::ServiceFailure {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "Advice service error ({}): {}", code, message)
                } else {
                    write!(f, "Advice service error: {}", message)
                }
            }
            MileageError::StorageError { message } => {
                write!(f, "Storage error: {}", message)
            }
            MileageError::InvalidFuelAmount { amount } => {
                write!(f, "Refill amount must be greater than 0 L (got {})", amount)
            }
            MileageError::InvalidBike { message } => {
                write!(f, "Invalid bike: {}", message)
            }
            MileageError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for MileageError {}

impl MileageError {
    pub fn storage(message: impl Into<String>) -> Self {
        MileageError::StorageError {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        MileageError::ConfigurationError {
            message: message.into(),
        }
    }

    /// Whether the error came from the advice service boundary.
    pub fn is_advice_failure(&self) -> bool {
        matches!(
            self,
            MileageError::ConfigurationError { .. } | MileageError::ServiceFailure { .. }
        )
    }
}

impl From<serde_json::Error> for MileageError {
    fn from(e: serde_json::Error) -> Self {
        MileageError::configuration(e.to_string())
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for MileageError {
    fn from(e: rusqlite::Error) -> Self {
        MileageError::storage(e.to_string())
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::encode::Error> for MileageError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        MileageError::storage(format!("speed history encode: {}", e))
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::decode::Error> for MileageError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        MileageError::storage(format!("speed history decode: {}", e))
    }
}

/// Result type alias for mileage companion operations.
pub type Result<T> = std::result::Result<T, MileageError>;

/// Extension trait for converting Option to MileageError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a storage error.
    fn ok_or_storage(self, message: &str) -> Result<T>;

    /// Convert Option to Result with generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_storage(self, message: &str) -> Result<T> {
        self.ok_or_else(|| MileageError::storage(message))
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| MileageError::Internal {
            message: message.to_string(),
        })
    }
}
