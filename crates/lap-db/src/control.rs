//! Status-transition operations: cancel, resume, and the scheduler's writes.

use chrono::Utc;
use futures_util::FutureExt;
use sqlx::QueryBuilder;
use tracing::{info, warn};

use lap_schemas::{ApplyError, ApplyStatus, Detail, Procedure};

use crate::record::{CancelOutcome, FinalUpdate, ResultTrack, ResumeOutcome, ResumeTrack};
use crate::{begin_serializable, liveness, retrying, ApplyStore, TxError, WorkerIdentity};

impl ApplyStore {
    /// Request cancellation of a running apply.
    ///
    /// `IN_PROGRESS` transitions to `CANCELING` and records `canceledAt` and
    /// `executeRollback`. A `SUSPENDED` track (apply or rollback) cannot be
    /// drained by a worker, so it is forced to `FAILED` instead. When the
    /// registered worker process is gone the live track is forced to
    /// `FAILED` and `ProcessMissing` is surfaced. Cancelling an apply that
    /// already reached `CANCELED` (with no live rollback) is an idempotent
    /// echo of the current status pair; only `COMPLETED`/`FAILED` error
    /// with `AlreadyExecuted`.
    pub async fn request_cancel(
        &self,
        apply_id: &str,
        rollback_on_cancel: bool,
    ) -> Result<CancelOutcome, ApplyError> {
        retrying("request_cancel", || {
            self.try_request_cancel(apply_id, rollback_on_cancel).boxed()
        })
        .await
    }

    async fn try_request_cancel(
        &self,
        apply_id: &str,
        rollback_on_cancel: bool,
    ) -> Result<CancelOutcome, TxError> {
        let mut tx = begin_serializable(&self.pool).await?;

        let row: Option<(String, Option<String>, Option<i32>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT status, rollbackstatus, processid, executioncommand
            FROM applystatus
            WHERE applyid = $1
            FOR UPDATE
            "#,
        )
        .bind(apply_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, rollback_status, process_id, command)) = row else {
            return Err(ApplyError::NotFound(apply_id.to_string()).into());
        };
        let status = ApplyStatus::parse(&status)?;
        let rollback_status = rollback_status
            .as_deref()
            .map(ApplyStatus::parse)
            .transpose()?;

        let worker_alive = || {
            process_id
                .is_some_and(|pid| liveness::probe(pid, command.as_deref().unwrap_or_default()))
        };

        // A suspended rollback has no worker to drain; force it to FAILED.
        if rollback_status == Some(ApplyStatus::Suspended) {
            sqlx::query(
                "UPDATE applystatus SET rollbackstatus = $2, rollbackendedat = $3 WHERE applyid = $1",
            )
            .bind(apply_id)
            .bind(ApplyStatus::Failed.as_str())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            info!(apply_id, "suspended rollback forced to FAILED on cancel");
            return Ok(CancelOutcome {
                status,
                rollback_status: Some(ApplyStatus::Failed),
            });
        }

        if rollback_status == Some(ApplyStatus::InProgress) {
            if !worker_alive() {
                sqlx::query(
                    "UPDATE applystatus SET rollbackstatus = $2, rollbackendedat = $3 WHERE applyid = $1",
                )
                .bind(apply_id)
                .bind(ApplyStatus::Failed.as_str())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                warn!(apply_id, "rollback worker missing; rollbackStatus forced to FAILED");
                return Err(ApplyError::ProcessMissing(apply_id.to_string()).into());
            }
            // The rollback is actively running; it is not cancelable.
            return Err(ApplyError::AlreadyExecuted(apply_id.to_string()).into());
        }

        match status {
            ApplyStatus::InProgress => {
                if !worker_alive() {
                    sqlx::query(
                        "UPDATE applystatus SET status = $2, endedat = $3 WHERE applyid = $1",
                    )
                    .bind(apply_id)
                    .bind(ApplyStatus::Failed.as_str())
                    .bind(Utc::now())
                    .execute(&mut *tx)
                    .await?;
                    tx.commit().await?;
                    warn!(apply_id, "apply worker missing; status forced to FAILED");
                    return Err(ApplyError::ProcessMissing(apply_id.to_string()).into());
                }
                sqlx::query(
                    r#"
                    UPDATE applystatus
                    SET status = $2, canceledat = $3, executerollback = $4
                    WHERE applyid = $1
                    "#,
                )
                .bind(apply_id)
                .bind(ApplyStatus::Canceling.as_str())
                .bind(Utc::now())
                .bind(rollback_on_cancel)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                info!(apply_id, rollback_on_cancel, "cancel requested");
                Ok(CancelOutcome {
                    status: ApplyStatus::Canceling,
                    rollback_status,
                })
            }
            // Repeated cancel while the drain is still in progress.
            ApplyStatus::Canceling => Ok(CancelOutcome {
                status: ApplyStatus::Canceling,
                rollback_status,
            }),
            // A suspended apply has no worker to drain; force it to FAILED.
            ApplyStatus::Suspended => {
                sqlx::query("UPDATE applystatus SET status = $2, endedat = $3 WHERE applyid = $1")
                    .bind(apply_id)
                    .bind(ApplyStatus::Failed.as_str())
                    .bind(Utc::now())
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                info!(apply_id, "suspended apply forced to FAILED on cancel");
                Ok(CancelOutcome {
                    status: ApplyStatus::Failed,
                    rollback_status,
                })
            }
            // An apply that already reached CANCELED (rollback absent or
            // itself terminal) has nothing left to cancel; echo the pair.
            ApplyStatus::Canceled => Ok(CancelOutcome {
                status: ApplyStatus::Canceled,
                rollback_status,
            }),
            ApplyStatus::Completed | ApplyStatus::Failed => {
                Err(ApplyError::AlreadyExecuted(apply_id.to_string()).into())
            }
        }
    }

    /// Re-enter a suspended apply (or its suspended rollback).
    ///
    /// Resuming a record that already reached a terminal status with no
    /// live rollback is an idempotent no-op: the current status pair is
    /// echoed with `track: None` and no work is re-entered.
    pub async fn request_resume(&self, apply_id: &str) -> Result<ResumeOutcome, ApplyError> {
        retrying("request_resume", || self.try_request_resume(apply_id).boxed()).await
    }

    async fn try_request_resume(&self, apply_id: &str) -> Result<ResumeOutcome, TxError> {
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

        if rollback_status == Some(ApplyStatus::Suspended) {
            sqlx::query(
                "UPDATE applystatus SET rollbackstatus = $2, resumedat = $3 WHERE applyid = $1",
            )
            .bind(apply_id)
            .bind(ApplyStatus::InProgress.as_str())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            info!(apply_id, "rollback resume requested");
            return Ok(ResumeOutcome {
                status,
                rollback_status: Some(ApplyStatus::InProgress),
                track: Some(ResumeTrack::Rollback),
            });
        }

        if status == ApplyStatus::Suspended {
            sqlx::query("UPDATE applystatus SET status = $2, resumedat = $3 WHERE applyid = $1")
                .bind(apply_id)
                .bind(ApplyStatus::InProgress.as_str())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(apply_id, "apply resume requested");
            return Ok(ResumeOutcome {
                status: ApplyStatus::InProgress,
                rollback_status,
                track: Some(ResumeTrack::Apply),
            });
        }

        let rollback_live = matches!(rollback_status, Some(ApplyStatus::InProgress));
        if status.is_terminal() && !rollback_live {
            // Already resolved; nothing to re-enter. Echo the pair.
            info!(apply_id, status = status.as_str(), "resume of a resolved apply; no-op");
            return Ok(ResumeOutcome {
                status,
                rollback_status,
                track: None,
            });
        }
        Err(ApplyError::AlreadyRunning.into())
    }

    /// End-of-run write: terminal status, results, and synthesized plans.
    ///
    /// Terminal statuses also stamp the matching ended-at column; a
    /// `SUSPENDED` status on either track stamps `suspendedat`.
    pub async fn update(&self, update: &FinalUpdate) -> Result<(), ApplyError> {
        retrying("update", || self.try_update(update).boxed()).await
    }

    async fn try_update(&self, update: &FinalUpdate) -> Result<(), TxError> {
        let now = Utc::now();
        let mut qb = QueryBuilder::new("UPDATE applystatus SET ");
        let mut sep = qb.separated(", ");
        let mut wrote = false;

        if let Some(status) = update.status {
            wrote = true;
            sep.push("status = ").push_bind_unseparated(status.as_str());
            if status.is_terminal() {
                sep.push("endedat = ").push_bind_unseparated(now);
            }
            if status == ApplyStatus::Suspended {
                sep.push("suspendedat = ").push_bind_unseparated(now);
            }
        }
        if let Some(result) = &update.apply_result {
            wrote = true;
            sep.push("applyresult = ")
                .push_bind_unseparated(encode(result)?);
        }
        if let Some(procs) = &update.rollback_procedures {
            wrote = true;
            sep.push("rollbackprocedures = ")
                .push_bind_unseparated(encode(procs)?);
        }
        if let Some(status) = update.rollback_status {
            wrote = true;
            sep.push("rollbackstatus = ")
                .push_bind_unseparated(status.as_str());
            if status.is_terminal() {
                sep.push("rollbackendedat = ").push_bind_unseparated(now);
            }
            if status == ApplyStatus::Suspended {
                sep.push("suspendedat = ").push_bind_unseparated(now);
            }
        }
        if let Some(result) = &update.rollback_result {
            wrote = true;
            sep.push("rollbackresult = ")
                .push_bind_unseparated(encode(result)?);
        }
        if let Some(procs) = &update.resume_procedures {
            wrote = true;
            sep.push("resumeprocedures = ")
                .push_bind_unseparated(encode(procs)?);
        }
        if let Some(result) = &update.resume_result {
            wrote = true;
            sep.push("resumeresult = ")
                .push_bind_unseparated(encode(result)?);
        }

        if !wrote {
            return Ok(());
        }

        qb.push(" WHERE applyid = ");
        qb.push_bind(&update.apply_id);

        let mut tx = begin_serializable(&self.pool).await?;
        let affected = qb.build().execute(&mut *tx).await?.rows_affected();
        if affected == 0 {
            return Err(ApplyError::NotFound(update.apply_id.clone()).into());
        }
        tx.commit().await?;
        Ok(())
    }

    /// Mark the rollback track started and persist its synthesized plan.
    pub async fn update_rollback_status(
        &self,
        apply_id: &str,
        status: ApplyStatus,
        procedures: Option<&[Procedure]>,
    ) -> Result<(), ApplyError> {
        retrying("update_rollback_status", || {
            self.try_update_rollback_status(apply_id, status, procedures)
                .boxed()
        })
        .await
    }

    async fn try_update_rollback_status(
        &self,
        apply_id: &str,
        status: ApplyStatus,
        procedures: Option<&[Procedure]>,
    ) -> Result<(), TxError> {
        let mut tx = begin_serializable(&self.pool).await?;
        let affected = match procedures {
            Some(procs) => {
                sqlx::query(
                    r#"
                    UPDATE applystatus
                    SET rollbackstatus = $2, rollbackstartedat = $3, rollbackprocedures = $4
                    WHERE applyid = $1
                    "#,
                )
                .bind(apply_id)
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(encode(procs)?)
                .execute(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE applystatus
                    SET rollbackstatus = $2, rollbackstartedat = $3
                    WHERE applyid = $1
                    "#,
                )
                .bind(apply_id)
                .bind(status.as_str())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?
            }
        }
        .rows_affected();
        if affected == 0 {
            return Err(ApplyError::NotFound(apply_id.to_string()).into());
        }
        tx.commit().await?;
        Ok(())
    }

    /// Incremental result write for the given track, issued after each batch
    /// of completed operations.
    pub async fn update_result(
        &self,
        apply_id: &str,
        details: &[Detail],
        track: ResultTrack,
    ) -> Result<(), ApplyError> {
        retrying("update_result", || {
            self.try_update_result(apply_id, details, track).boxed()
        })
        .await
    }

    async fn try_update_result(
        &self,
        apply_id: &str,
        details: &[Detail],
        track: ResultTrack,
    ) -> Result<(), TxError> {
        let sql = format!(
            "UPDATE applystatus SET {} = $2 WHERE applyid = $1",
            track.column()
        );
        let affected = sqlx::query(&sql)
            .bind(apply_id)
            .bind(encode(details)?)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(ApplyError::NotFound(apply_id.to_string()).into());
        }
        Ok(())
    }

    /// Record the identity of the process hosting the scheduler worker.
    pub async fn record_worker(
        &self,
        apply_id: &str,
        identity: &WorkerIdentity,
    ) -> Result<(), ApplyError> {
        retrying("record_worker", || {
            self.try_record_worker(apply_id, identity).boxed()
        })
        .await
    }

    async fn try_record_worker(
        &self,
        apply_id: &str,
        identity: &WorkerIdentity,
    ) -> Result<(), TxError> {
        let affected = sqlx::query(
            r#"
            UPDATE applystatus
            SET processid = $2, executioncommand = $3, processstartedat = $4
            WHERE applyid = $1
            "#,
        )
        .bind(apply_id)
        .bind(identity.pid)
        .bind(&identity.command)
        .bind(identity.started_at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(ApplyError::NotFound(apply_id.to_string()).into());
        }
        Ok(())
    }
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, ApplyError> {
    serde_json::to_value(value).map_err(|e| ApplyError::QueryFailed(format!("encode json: {e}")))
}
