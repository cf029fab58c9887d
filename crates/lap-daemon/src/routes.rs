//! Axum router and all HTTP handlers for lap-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and
//! attaches middleware layers. All handlers are `pub(crate)` so router
//! tests can compose the router directly.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};

use lap_db::{Field, ListQuery, SortKey, SortOrder};
use lap_schemas::{ApplyError, ApplyStatus, Plan};

use crate::api_types::{ApiError, HealthResponse, StartResponse, StatusPairResponse};
use crate::state::AppState;

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/cdim/api/v1/health", get(health))
        .route("/cdim/api/v1/layout-apply", post(start_apply))
        .route("/cdim/api/v1/layout-apply", get(list_applies))
        .route("/cdim/api/v1/layout-apply/:id", get(get_apply))
        .route("/cdim/api/v1/layout-apply/:id", put(transition_apply))
        .route("/cdim/api/v1/layout-apply/:id", delete(delete_apply))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /cdim/api/v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /cdim/api/v1/layout-apply
// ---------------------------------------------------------------------------

pub(crate) async fn start_apply(
    State(st): State<Arc<AppState>>,
    body: Result<Json<Plan>, axum::extract::rejection::JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(plan) = body.map_err(|e| ApplyError::Validation(e.to_string()))?;
    let apply_id = st.orchestrator.start_apply(&plan).await?;
    Ok((StatusCode::ACCEPTED, Json(StartResponse { apply_id })))
}

// ---------------------------------------------------------------------------
// GET /cdim/api/v1/layout-apply/{id}
// ---------------------------------------------------------------------------

pub(crate) async fn get_apply(
    State(st): State<Arc<AppState>>,
    Path(apply_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = st.store.get(&apply_id).await?;
    Ok((StatusCode::OK, Json(record)))
}

// ---------------------------------------------------------------------------
// GET /cdim/api/v1/layout-apply
// ---------------------------------------------------------------------------

pub(crate) async fn list_applies(
    State(st): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let query = parse_list_query(&params)?;
    let result = st.store.list(&query).await?;
    Ok((StatusCode::OK, Json(result)))
}

fn parse_list_query(params: &HashMap<String, String>) -> Result<ListQuery, ApplyError> {
    let mut query = ListQuery::default();

    if let Some(status) = params.get("status") {
        query.status = Some(ApplyStatus::parse(status).map_err(|_| {
            ApplyError::Validation(format!("unknown status filter: {status}"))
        })?);
    }
    query.started_at_since = parse_time(params, "startedAtSince")?;
    query.started_at_until = parse_time(params, "startedAtUntil")?;
    query.ended_at_since = parse_time(params, "endedAtSince")?;
    query.ended_at_until = parse_time(params, "endedAtUntil")?;
    if let Some(sort_by) = params.get("sortBy") {
        query.sort_by = SortKey::parse(sort_by)?;
    }
    if let Some(order) = params.get("orderBy") {
        query.order = SortOrder::parse(order)?;
    }
    if let Some(limit) = params.get("limit") {
        let limit: i64 = limit
            .parse()
            .map_err(|_| ApplyError::Validation(format!("invalid limit: {limit}")))?;
        if limit < 0 {
            return Err(ApplyError::Validation("limit must not be negative".into()));
        }
        query.limit = Some(limit);
    }
    if let Some(offset) = params.get("offset") {
        query.offset = offset
            .parse()
            .map_err(|_| ApplyError::Validation(format!("invalid offset: {offset}")))?;
        if query.offset < 0 {
            return Err(ApplyError::Validation("offset must not be negative".into()));
        }
    }
    if let Some(fields) = params.get("fields") {
        for name in fields.split(',').filter(|s| !s.is_empty()) {
            query.fields.push(Field::parse(name.trim())?);
        }
    }
    Ok(query)
}

fn parse_time(
    params: &HashMap<String, String>,
    key: &str,
) -> Result<Option<DateTime<Utc>>, ApplyError> {
    match params.get(key) {
        None => Ok(None),
        Some(raw) => {
            let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
                .map_err(|_| ApplyError::Validation(format!("invalid {key}: {raw}")))?;
            Ok(Some(DateTime::from_naive_utc_and_offset(naive, Utc)))
        }
    }
}

// ---------------------------------------------------------------------------
// PUT /cdim/api/v1/layout-apply/{id}?action=cancel|resume
// ---------------------------------------------------------------------------

pub(crate) async fn transition_apply(
    State(st): State<Arc<AppState>>,
    Path(apply_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    match params.get("action").map(String::as_str) {
        Some("cancel") => {
            let rollback_on_cancel = params
                .get("rollbackOnCancel")
                .map(|v| v == "true")
                .unwrap_or(false);
            let outcome = st
                .orchestrator
                .cancel_apply(&apply_id, rollback_on_cancel)
                .await?;
            Ok((
                StatusCode::OK,
                Json(StatusPairResponse {
                    status: outcome.status.as_str().to_string(),
                    rollback_status: outcome.rollback_status.map(|s| s.as_str().to_string()),
                }),
            ))
        }
        Some("resume") => {
            let outcome = st.orchestrator.resume_apply(&apply_id).await?;
            Ok((
                StatusCode::OK,
                Json(StatusPairResponse {
                    status: outcome.status.as_str().to_string(),
                    rollback_status: outcome.rollback_status.map(|s| s.as_str().to_string()),
                }),
            ))
        }
        other => Err(ApplyError::Validation(format!(
            "action must be 'cancel' or 'resume', got {:?}",
            other.unwrap_or("<missing>")
        ))
        .into()),
    }
}

// ---------------------------------------------------------------------------
// DELETE /cdim/api/v1/layout-apply/{id}
// ---------------------------------------------------------------------------

pub(crate) async fn delete_apply(
    State(st): State<Arc<AppState>>,
    Path(apply_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    st.store.delete(&apply_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn list_query_parses_filters_and_fields() {
        let query = parse_list_query(&params(&[
            ("status", "COMPLETED"),
            ("startedAtSince", "2023-10-02T00:00:00Z"),
            ("sortBy", "endedAt"),
            ("orderBy", "desc"),
            ("limit", "20"),
            ("offset", "40"),
            ("fields", "applyResult,rollbackResult"),
        ]))
        .unwrap();
        assert_eq!(query.status, Some(ApplyStatus::Completed));
        assert!(query.started_at_since.is_some());
        assert_eq!(query.sort_by, SortKey::EndedAt);
        assert_eq!(query.order, SortOrder::Desc);
        assert_eq!(query.limit, Some(20));
        assert_eq!(query.offset, 40);
        assert_eq!(query.fields, vec![Field::ApplyResult, Field::RollbackResult]);
    }

    #[test]
    fn bad_status_filter_is_a_validation_error() {
        let err = parse_list_query(&params(&[("status", "RUNNING")])).unwrap_err();
        assert_eq!(err.code(), "E40001");
    }

    #[test]
    fn bad_timestamp_is_a_validation_error() {
        let err = parse_list_query(&params(&[("startedAtSince", "yesterday")])).unwrap_err();
        assert_eq!(err.code(), "E40001");
    }

    #[test]
    fn negative_limit_rejected() {
        assert!(parse_list_query(&params(&[("limit", "-1")])).is_err());
    }
}
