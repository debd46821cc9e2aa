//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::dispatch::{DispatchRecord, VillageId, VillageSummary};

/// One village in the `/villages` listing.
#[derive(Debug, Serialize)]
pub struct VillageEntry {
    pub id: VillageId,
    /// Number of dispatched timesteps.
    pub timesteps: usize,
    pub summary: VillageSummary,
}

/// A dispatch record tagged with its timestep index.
#[derive(Debug, Serialize)]
pub struct TimedRecord {
    pub timestep: usize,
    #[serde(flatten)]
    pub record: DispatchRecord,
}

/// Optional range query parameters for the dispatch endpoint.
#[derive(Debug, Deserialize)]
pub struct DispatchQuery {
    /// Start timestep (inclusive).
    pub from: Option<usize>,
    /// End timestep (inclusive).
    pub to: Option<usize>,
}

/// Error response body for 4xx errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
