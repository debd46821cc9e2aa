//! Village battery and solar dispatch with cross-village surplus pooling.

/// REST API over a finished run (feature `api`).
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod forecast;
pub mod io;
mod parallel;
pub mod runner;

pub use error::{DispatchError, Result};
