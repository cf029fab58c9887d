//! Apply-state store over PostgreSQL.
//!
//! One row per apply in the `applystatus` table. Every operation runs in its
//! own serializable transaction; serialization failures (SQLSTATE 40001) and
//! connection drops are retried with exponential backoff up to a bound, then
//! surfaced as `E40019`/`E40018`. The mutual-exclusion check in
//! [`ApplyStore::register`] enforces the single-writer invariant: at most one
//! non-terminal apply (SUSPENDED included) exists at any time.

use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use lap_config::DbSection;
use lap_schemas::{ApplyError, ApplyStatus, Plan};

mod control;
mod list;
mod liveness;
mod record;

pub use list::{Field, ListQuery, ListResult, SortKey, SortOrder};
pub use liveness::{probe, WorkerIdentity};
pub use record::{
    ApplyRecord, CancelOutcome, CurrentStatus, FinalUpdate, ResultTrack, ResumeOutcome,
    ResumeTrack,
};

pub const ENV_DB_URL: &str = "LAP_DATABASE_URL";

const APPLY_ID_LEN: usize = 10;
const ID_COLLISION_RETRY_MAX: u32 = 10;
const CONNECT_RETRY_MAX: u32 = 3;
const TX_RETRY_MAX: u32 = 3;
const RETRY_BASE_MS: u64 = 100;

/// Handle to the `applystatus` table.
#[derive(Debug, Clone)]
pub struct ApplyStore {
    pool: PgPool,
}

// ---------------------------------------------------------------------------
// Connection & migration
// ---------------------------------------------------------------------------

impl ApplyStore {
    /// Connect using the `db` config section, retrying a bounded number of
    /// times before surfacing `StoreUnavailable`.
    pub async fn connect(db: &DbSection) -> Result<Self, ApplyError> {
        Self::connect_url(&db.url()).await
    }

    /// Connect using `LAP_DATABASE_URL` (tests and tooling).
    pub async fn connect_from_env() -> Result<Self, ApplyError> {
        let url = std::env::var(ENV_DB_URL)
            .map_err(|_| ApplyError::StoreUnavailable(format!("missing env var {ENV_DB_URL}")))?;
        Self::connect_url(&url).await
    }

    pub async fn connect_url(url: &str) -> Result<Self, ApplyError> {
        let mut attempt = 0u32;
        loop {
            match PgPoolOptions::new().max_connections(10).connect(url).await {
                Ok(pool) => return Ok(ApplyStore { pool }),
                Err(e) if attempt < CONNECT_RETRY_MAX => {
                    attempt += 1;
                    warn!(attempt, error = %e, "store connect failed; retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(e) => return Err(ApplyError::StoreUnavailable(e.to_string())),
            }
        }
    }

    /// Run embedded SQLx migrations.
    pub async fn migrate(&self) -> Result<(), ApplyError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ApplyError::StoreUnavailable(format!("migrate failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Retry plumbing
// ---------------------------------------------------------------------------

/// Internal error split: database errors may be retried, domain errors
/// surface immediately.
pub(crate) enum TxError {
    Db(sqlx::Error),
    Domain(ApplyError),
}

impl From<sqlx::Error> for TxError {
    fn from(e: sqlx::Error) -> Self {
        TxError::Db(e)
    }
}

impl From<ApplyError> for TxError {
    fn from(e: ApplyError) -> Self {
        TxError::Domain(e)
    }
}

fn is_serialization_failure(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|c| c == "40001")
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|c| c == "23505")
}

fn is_connection_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(RETRY_BASE_MS * 2u64.pow(attempt.min(6)))
}

fn surface(what: &str, err: sqlx::Error) -> ApplyError {
    if is_connection_failure(&err) {
        ApplyError::StoreUnavailable(format!("{what}: {err}"))
    } else {
        ApplyError::QueryFailed(format!("{what}: {err}"))
    }
}

/// Run `op` in a fresh transaction attempt, retrying serialization failures
/// and connection drops with exponential backoff up to `TX_RETRY_MAX`.
pub(crate) async fn retrying<'a, T>(
    what: &str,
    mut op: impl FnMut() -> BoxFuture<'a, Result<T, TxError>>,
) -> Result<T, ApplyError> {
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(TxError::Domain(e)) => return Err(e),
            Err(TxError::Db(e)) => {
                let retryable = is_serialization_failure(&e) || is_connection_failure(&e);
                if !retryable || attempt >= TX_RETRY_MAX {
                    return Err(surface(what, e));
                }
                attempt += 1;
                debug!(what, attempt, error = %e, "retrying store transaction");
                tokio::time::sleep(backoff(attempt)).await;
            }
        }
    }
}

/// Open a transaction pinned to serializable isolation.
pub(crate) async fn begin_serializable(
    pool: &PgPool,
) -> Result<sqlx::Transaction<'_, sqlx::Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

fn new_apply_id() -> String {
    Uuid::new_v4().simple().to_string()[..APPLY_ID_LEN].to_string()
}

// ---------------------------------------------------------------------------
// register / get / getCurrent / delete
// ---------------------------------------------------------------------------

impl ApplyStore {
    /// Register a new apply with status `IN_PROGRESS`.
    ///
    /// The mutual-exclusion check runs in the same transaction as the
    /// insert: any row that is `IN_PROGRESS`/`CANCELING`/`SUSPENDED`, or
    /// whose rollback is `IN_PROGRESS`/`SUSPENDED`, blocks registration.
    /// An applyID collision regenerates the ID and retries.
    pub async fn register(&self, plan: &Plan) -> Result<String, ApplyError> {
        retrying("register", || self.try_register(plan).boxed()).await
    }

    async fn try_register(&self, plan: &Plan) -> Result<String, TxError> {
        let procedures = serde_json::to_value(plan)
            .map_err(|e| ApplyError::QueryFailed(format!("encode procedures: {e}")))?;

        let mut collision = 0u32;
        loop {
            let mut tx = begin_serializable(&self.pool).await?;

            let live: Option<(String, Option<String>)> = sqlx::query_as(
                r#"
                SELECT status, rollbackstatus
                FROM applystatus
                WHERE status IN ('IN_PROGRESS', 'CANCELING', 'SUSPENDED')
                   OR rollbackstatus IN ('IN_PROGRESS', 'SUSPENDED')
                LIMIT 1
                "#,
            )
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((status, rollback_status)) = live {
                let suspended = status == ApplyStatus::Suspended.as_str()
                    || rollback_status.as_deref() == Some(ApplyStatus::Suspended.as_str());
                return Err(if suspended {
                    ApplyError::SuspendedDataExists.into()
                } else {
                    ApplyError::AlreadyRunning.into()
                });
            }

            let apply_id = new_apply_id();
            let inserted = sqlx::query(
                r#"
                INSERT INTO applystatus (applyid, status, procedures, startedat)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&apply_id)
            .bind(ApplyStatus::InProgress.as_str())
            .bind(&procedures)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {
                    tx.commit().await?;
                    return Ok(apply_id);
                }
                Err(e) if is_unique_violation(&e) && collision < ID_COLLISION_RETRY_MAX => {
                    collision += 1;
                    debug!(apply_id, "applyID collision; regenerating");
                    drop(tx);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fetch one full apply record.
    pub async fn get(&self, apply_id: &str) -> Result<ApplyRecord, ApplyError> {
        retrying("get", || self.try_get(apply_id).boxed()).await
    }

    async fn try_get(&self, apply_id: &str) -> Result<ApplyRecord, TxError> {
        let row = sqlx::query("SELECT * FROM applystatus WHERE applyid = $1")
            .bind(apply_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(record::row_to_record(&row)?),
            None => Err(ApplyError::NotFound(apply_id.to_string()).into()),
        }
    }

    /// Lightweight poll used by the scheduler to observe cancel requests.
    pub async fn get_current(&self, apply_id: &str) -> Result<CurrentStatus, ApplyError> {
        retrying("get_current", || self.try_get_current(apply_id).boxed()).await
    }

    async fn try_get_current(&self, apply_id: &str) -> Result<CurrentStatus, TxError> {
        let row: Option<(String, Option<bool>)> =
            sqlx::query_as("SELECT status, executerollback FROM applystatus WHERE applyid = $1")
                .bind(apply_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((status, execute_rollback)) => Ok(CurrentStatus {
                status: ApplyStatus::parse(&status)?,
                execute_rollback: execute_rollback.unwrap_or(false),
            }),
            None => Err(ApplyError::NotFound(apply_id.to_string()).into()),
        }
    }

    /// Delete a terminal apply. Live applies (rollback included) conflict.
    pub async fn delete(&self, apply_id: &str) -> Result<(), ApplyError> {
        retrying("delete", || self.try_delete(apply_id).boxed()).await
    }

    async fn try_delete(&self, apply_id: &str) -> Result<(), TxError> {
        let mut tx = begin_serializable(&self.pool).await?;

        let row: Option<(String, Option<String>)> = sqlx::query_as(
            "SELECT status, rollbackstatus FROM applystatus WHERE applyid = $1 FOR UPDATE",
        )
        .bind(apply_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, rollback_status)) = row else {
            return Err(ApplyError::NotFound(apply_id.to_string()).into());
        };
        let status = ApplyStatus::parse(&status)?;
        let rollback_status = rollback_status
            .as_deref()
            .map(ApplyStatus::parse)
            .transpose()?;

        let rollback_live = matches!(
            rollback_status,
            Some(ApplyStatus::InProgress) | Some(ApplyStatus::Suspended)
        );
        if !status.is_terminal() || rollback_live {
            return Err(ApplyError::DeleteConflict(apply_id.to_string()).into());
        }

        sqlx::query("DELETE FROM applystatus WHERE applyid = $1")
            .bind(apply_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
