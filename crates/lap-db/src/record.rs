//! Apply-record row model and the option structs the store operations take.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;

use lap_schemas::{ApplyError, ApplyStatus, Detail, Plan, Procedure};

// ---------------------------------------------------------------------------
// ApplyRecord
// ---------------------------------------------------------------------------

/// One durable apply row.
///
/// Serialized camelCase with absent fields omitted, matching the wire shape
/// callers receive from `GET /layout-apply/{id}`. Worker-identity columns are
/// internal and never serialized outward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyRecord {
    #[serde(rename = "applyID")]
    pub apply_id: String,
    pub status: ApplyStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub procedures: Option<Plan>,
    #[serde(rename = "applyResult", skip_serializing_if = "Option::is_none", default)]
    pub apply_result: Option<Vec<Detail>>,
    #[serde(
        rename = "rollbackProcedures",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub rollback_procedures: Option<Vec<Procedure>>,
    #[serde(
        rename = "startedAt",
        with = "lap_schemas::ts",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "endedAt",
        with = "lap_schemas::ts",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "canceledAt",
        with = "lap_schemas::ts",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "executeRollback",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub execute_rollback: Option<bool>,
    #[serde(
        rename = "rollbackStatus",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub rollback_status: Option<ApplyStatus>,
    #[serde(
        rename = "rollbackResult",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub rollback_result: Option<Vec<Detail>>,
    #[serde(
        rename = "rollbackStartedAt",
        with = "lap_schemas::ts",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub rollback_started_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "rollbackEndedAt",
        with = "lap_schemas::ts",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub rollback_ended_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "resumeProcedures",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub resume_procedures: Option<Vec<Procedure>>,
    #[serde(
        rename = "resumeResult",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub resume_result: Option<Vec<Detail>>,
    #[serde(
        rename = "suspendedAt",
        with = "lap_schemas::ts",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub suspended_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "resumedAt",
        with = "lap_schemas::ts",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub resumed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub process_id: Option<i32>,
    #[serde(skip)]
    pub execution_command: Option<String>,
    #[serde(skip)]
    pub process_started_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Operation inputs / outputs
// ---------------------------------------------------------------------------

/// Lightweight status poll used by the scheduler between waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentStatus {
    pub status: ApplyStatus,
    pub execute_rollback: bool,
}

/// Which result column an incremental write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTrack {
    Apply,
    Rollback,
    Resume,
}

impl ResultTrack {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            ResultTrack::Apply => "applyresult",
            ResultTrack::Rollback => "rollbackresult",
            ResultTrack::Resume => "resumeresult",
        }
    }
}

/// End-of-run write issued once by the scheduler.
///
/// `None` fields are left untouched so a resume run can record its results
/// without clobbering the original applyResult.
#[derive(Debug, Clone, Default)]
pub struct FinalUpdate {
    pub apply_id: String,
    pub status: Option<ApplyStatus>,
    pub apply_result: Option<Vec<Detail>>,
    pub rollback_procedures: Option<Vec<Procedure>>,
    pub rollback_status: Option<ApplyStatus>,
    pub rollback_result: Option<Vec<Detail>>,
    pub resume_procedures: Option<Vec<Procedure>>,
    pub resume_result: Option<Vec<Detail>>,
}

/// Result of a cancel request: the status pair after the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOutcome {
    pub status: ApplyStatus,
    pub rollback_status: Option<ApplyStatus>,
}

/// Which track a resume re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeTrack {
    Apply,
    Rollback,
}

/// `track` is `None` when the record was already resolved and nothing was
/// re-entered: the call is an idempotent echo of the current status pair
/// and no worker may be launched for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeOutcome {
    pub status: ApplyStatus,
    pub rollback_status: Option<ApplyStatus>,
    pub track: Option<ResumeTrack>,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Column present in the row but absent from a projection → `None`.
fn opt_col<'r, T>(row: &'r PgRow, name: &str) -> Result<Option<T>, ApplyError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    match row.try_get::<Option<T>, _>(name) {
        Ok(v) => Ok(v),
        Err(sqlx::Error::ColumnNotFound(_)) => Ok(None),
        Err(e) => Err(ApplyError::QueryFailed(format!("decode {name}: {e}"))),
    }
}

fn json_col<T: serde::de::DeserializeOwned>(
    row: &PgRow,
    name: &str,
) -> Result<Option<T>, ApplyError> {
    match opt_col::<Value>(row, name)? {
        None => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| ApplyError::QueryFailed(format!("decode {name}: {e}"))),
    }
}

fn status_col(row: &PgRow, name: &str) -> Result<Option<ApplyStatus>, ApplyError> {
    match opt_col::<String>(row, name)? {
        None => Ok(None),
        Some(s) => ApplyStatus::parse(&s).map(Some),
    }
}

pub(crate) fn row_to_record(row: &PgRow) -> Result<ApplyRecord, ApplyError> {
    let apply_id: String = row
        .try_get("applyid")
        .map_err(|e| ApplyError::QueryFailed(format!("decode applyid: {e}")))?;
    let status = status_col(row, "status")?
        .ok_or_else(|| ApplyError::QueryFailed(format!("apply {apply_id} has no status")))?;

    Ok(ApplyRecord {
        apply_id: apply_id.trim().to_string(),
        status,
        procedures: json_col(row, "procedures")?,
        apply_result: json_col(row, "applyresult")?,
        rollback_procedures: json_col(row, "rollbackprocedures")?,
        started_at: opt_col(row, "startedat")?,
        ended_at: opt_col(row, "endedat")?,
        canceled_at: opt_col(row, "canceledat")?,
        execute_rollback: opt_col(row, "executerollback")?,
        rollback_status: status_col(row, "rollbackstatus")?,
        rollback_result: json_col(row, "rollbackresult")?,
        rollback_started_at: opt_col(row, "rollbackstartedat")?,
        rollback_ended_at: opt_col(row, "rollbackendedat")?,
        resume_procedures: json_col(row, "resumeprocedures")?,
        resume_result: json_col(row, "resumeresult")?,
        suspended_at: opt_col(row, "suspendedat")?,
        resumed_at: opt_col(row, "resumedat")?,
        process_id: opt_col(row, "processid")?,
        execution_command: opt_col(row, "executioncommand")?,
        process_started_at: opt_col(row, "processstartedat")?,
    })
}
