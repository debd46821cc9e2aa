//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use super::AppState;
use super::types::{DispatchQuery, ErrorResponse, TimedRecord, VillageEntry};
use crate::dispatch::{PoolStep, VillageId};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

/// Lists villages in ascending id order with their KPI summaries.
///
/// `GET /villages` → 200 + `Vec<VillageEntry>` JSON
pub async fn get_villages(State(state): State<Arc<AppState>>) -> Json<Vec<VillageEntry>> {
    let entries = state
        .summaries
        .iter()
        .map(|(id, summary)| VillageEntry {
            id: id.clone(),
            timesteps: state.dispatch.get(id).map_or(0, Vec::len),
            summary: summary.clone(),
        })
        .collect();
    Json(entries)
}

/// Returns one village's records, optionally filtered by timestep range.
///
/// `GET /villages/{id}/dispatch` → 200 + `Vec<TimedRecord>` JSON
/// `GET /villages/{id}/dispatch?from=N&to=M` → filtered range (inclusive)
/// `GET /villages/{id}/dispatch?from=10&to=5` → 400 + `ErrorResponse`
/// unknown `id` → 404 + `ErrorResponse`
pub async fn get_dispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DispatchQuery>,
) -> Result<Json<Vec<TimedRecord>>, ApiError> {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);

    if from > to {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("`from` ({from}) must be <= `to` ({to})"),
        ));
    }

    let records = state.dispatch.get(&VillageId::new(id.as_str())).ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, format!("unknown village \"{id}\""))
    })?;

    let timed = records
        .iter()
        .enumerate()
        .filter(|(t, _)| *t >= from && *t <= to)
        .map(|(timestep, record)| TimedRecord {
            timestep,
            record: *record,
        })
        .collect();

    Ok(Json(timed))
}

/// Returns the pool aggregates for every timestep.
///
/// `GET /pool` → 200 + `Vec<PoolStep>` JSON
pub async fn get_pool(State(state): State<Arc<AppState>>) -> Json<Vec<PoolStep>> {
    Json(state.pool_steps.clone())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, NaiveDate};
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::dispatch::{BatteryConfig, ForecastPoint, MultiVillageOrchestrator, VillageSummary};

    fn make_test_state() -> Arc<AppState> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        let series = |demand: f64, solar: f64| -> Vec<ForecastPoint> {
            (0..24)
                .map(|h| ForecastPoint::new(start + Duration::hours(h), demand, solar).unwrap())
                .collect()
        };
        let forecasts = BTreeMap::from([
            (VillageId::new("east"), series(20.0, 5.0)),
            (VillageId::new("west"), series(5.0, 40.0)),
        ]);
        let orchestrator = MultiVillageOrchestrator::new(BatteryConfig::default());
        let output = orchestrator.run(&forecasts).unwrap();
        let summaries = output
            .dispatch
            .iter()
            .map(|(id, r)| (id.clone(), VillageSummary::from_records(r, &BatteryConfig::default())))
            .collect();
        Arc::new(AppState {
            dispatch: output.dispatch,
            summaries,
            pool_steps: output.pool_steps,
        })
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let app = router(make_test_state());
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn villages_lists_ids_in_order() {
        let (status, json) = get_json("/villages").await;
        assert_eq!(status, StatusCode::OK);
        let list = json.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["id"], "east");
        assert_eq!(list[1]["id"], "west");
        assert_eq!(list[0]["timesteps"], 24);
        assert!(list[0]["summary"].get("final_soc").is_some());
    }

    #[tokio::test]
    async fn dispatch_returns_all_steps() {
        let (status, json) = get_json("/villages/east/dispatch").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 24);
    }

    #[tokio::test]
    async fn dispatch_range_query() {
        let (status, json) = get_json("/villages/west/dispatch?from=5&to=10").await;
        assert_eq!(status, StatusCode::OK);
        let list = json.as_array().unwrap();
        assert_eq!(list.len(), 6); // timesteps 5,6,7,8,9,10
        assert_eq!(list[0]["timestep"], 5);
        assert_eq!(list[5]["timestep"], 10);
    }

    #[tokio::test]
    async fn dispatch_invalid_range_returns_400() {
        let (status, json) = get_json("/villages/east/dispatch?from=10&to=5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json.get("error").is_some());
    }

    #[tokio::test]
    async fn unknown_village_returns_404() {
        let (status, json) = get_json("/villages/north/dispatch").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("north"));
    }

    #[tokio::test]
    async fn pool_returns_one_entry_per_timestep() {
        let (status, json) = get_json("/pool").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 24);
        assert_eq!(json[0]["timestep"], 0);
    }
}
