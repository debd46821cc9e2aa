//! REST API over a finished dispatch run.
//!
//! Provides three GET endpoints:
//! - `/villages` village ids with their KPI summaries
//! - `/villages/{id}/dispatch` finalized records with optional range filtering
//! - `/pool` per-timestep pool aggregates

mod handlers;
pub mod types;

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::dispatch::{DispatchRecord, PoolStep, VillageId, VillageSummary};
use crate::runner::ScenarioRun;

/// Immutable application state shared across all request handlers.
///
/// Constructed once after the run completes and wrapped in `Arc`; all data
/// is read-only so no locks are needed.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Finalized records per village.
    pub dispatch: BTreeMap<VillageId, Vec<DispatchRecord>>,
    /// KPI summary per village.
    pub summaries: BTreeMap<VillageId, VillageSummary>,
    /// Pool aggregates per timestep.
    pub pool_steps: Vec<PoolStep>,
}

impl From<ScenarioRun> for AppState {
    fn from(run: ScenarioRun) -> Self {
        Self {
            dispatch: run.output.dispatch,
            summaries: run.summaries,
            pool_steps: run.output.pool_steps,
        }
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/villages", get(handlers::get_villages))
        .route("/villages/{id}/dispatch", get(handlers::get_dispatch))
        .route("/pool", get(handlers::get_pool))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server stops.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
