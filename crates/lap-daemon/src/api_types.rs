//! Request/response types and the error→HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use lap_schemas::ApplyError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    #[serde(rename = "applyID")]
    pub apply_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusPairResponse {
    pub status: String,
    #[serde(rename = "rollbackStatus", skip_serializing_if = "Option::is_none")]
    pub rollback_status: Option<String>,
}

/// Stable error body: `{code, message}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Wrapper giving every handler a uniform error path.
pub struct ApiError(pub ApplyError);

impl From<ApplyError> for ApiError {
    fn from(err: ApplyError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &ApplyError) -> StatusCode {
    match err {
        ApplyError::Validation(_) => StatusCode::BAD_REQUEST,
        ApplyError::NotFound(_) => StatusCode::NOT_FOUND,
        ApplyError::AlreadyRunning
        | ApplyError::SuspendedDataExists
        | ApplyError::AlreadyExecuted(_)
        | ApplyError::DeleteConflict(_) => StatusCode::CONFLICT,
        ApplyError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ApplyError::QueryFailed(_)
        | ApplyError::ExecutionFailed(_)
        | ApplyError::WorkerSpawn(_)
        | ApplyError::ProcessMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ErrorResponse {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
