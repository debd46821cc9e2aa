//! Crate-wide error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::types::VillageId;

/// Errors raised while loading inputs or running a dispatch.
///
/// Degenerate numerics (zero capacity, zero pooled deficit) never produce an
/// error; they are guarded inside the simulator and coordinator.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A required forecast field is missing or holds an invalid value.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// Name of the offending field (e.g. `"demand_kw"`).
        field: String,
        /// Human-readable description, including the row or village.
        message: String,
    },

    /// A village forecast series contains no points.
    #[error("empty forecast series for village \"{village}\"")]
    EmptyInput {
        /// Village whose series was empty.
        village: VillageId,
    },

    /// Cross-village inputs are inconsistent with each other.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// Scenario configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Forecast model store could not be read or written.
    #[error("model store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl DispatchError {
    /// Shorthand for a [`DispatchError::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DispatchError>;
