//! The DAG scheduler.
//!
//! One scheduler drives one plan to completion under bounded parallelism:
//!
//! 1. Pre-check: a plan launched into an already-CANCELING row marks every
//!    node CANCELED without dispatching anything.
//! 2. Seed: every dependency-free node is submitted to the worker pool.
//! 3. Loop: wait for at least one completion, collect the whole ready
//!    batch, poll the store for a cancel request (draining all inflight
//!    work before honoring one), propagate FAILED results through the skip
//!    closure, then submit newly-runnable nodes.
//! 4. Finalize: SUSPENDED beats FAILED beats CANCELED beats COMPLETED, and
//!    the terminal row is written exactly once per track.
//!
//! The scheduler never raises to its caller; any internal error is caught
//! at the top of [`Scheduler::run`] and logged, leaving the store in
//! whatever state was last written.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use lap_db::{FinalUpdate, ResultTrack};
use lap_hwctl::{DispatchOutcome, Dispatcher};
use lap_schemas::{ApplyError, ApplyStatus, Detail, DetailStatus, Procedure};

use crate::action::Action;
use crate::plan::{resume_plan, rollback_plan};
use crate::store_api::StateStore;

pub struct Scheduler {
    store: Arc<dyn StateStore>,
    dispatcher: Arc<dyn Dispatcher>,
    apply_id: String,
    max_workers: usize,
    cancel: CancellationToken,
}

/// Everything one plan execution produced.
struct PlanRun {
    executed: Vec<Detail>,
    suspended: bool,
    rollback_flag: bool,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        dispatcher: Arc<dyn Dispatcher>,
        apply_id: impl Into<String>,
        max_workers: Option<usize>,
    ) -> Self {
        let max_workers = max_workers
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(4);
        Scheduler {
            store,
            dispatcher,
            apply_id: apply_id.into(),
            max_workers: max_workers.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Token observed by dispatch tasks inside retry/poll sleeps; used for
    /// cooperative shutdown on process exit.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the plan to a terminal row. Never raises.
    pub async fn run(&self, plan: Vec<Procedure>, action: Action) {
        if let Err(err) = self.drive(plan, action).await {
            error!(
                apply_id = %self.apply_id,
                code = err.code(),
                error = %err,
                "failed to execute layout apply"
            );
        }
    }

    async fn drive(&self, plan: Vec<Procedure>, action: Action) -> Result<(), ApplyError> {
        info!(
            apply_id = %self.apply_id,
            action = action.as_str(),
            operations = plan.len(),
            "start running"
        );

        let track = match action {
            Action::Request => ResultTrack::Apply,
            Action::Resume | Action::RollbackResume => ResultTrack::Resume,
        };
        let run = self.execute_plan(&plan, track, true).await?;
        let final_status = finalize(&run);

        let mut status = Some(final_status);
        let mut apply_result = Some(run.executed.clone());
        let mut rollback_status: Option<ApplyStatus> = None;
        let mut rollback_result: Option<Vec<Detail>> = None;
        let mut rollback_procedures: Option<Vec<Procedure>> = None;
        let mut resume_result: Option<Vec<Detail>> = None;
        // What a later resume would re-run: the primary plan unless a
        // rollback took over.
        let mut resume_basis: (Vec<Procedure>, Vec<Detail>) = (plan, run.executed);

        if final_status == ApplyStatus::Failed {
            error!(apply_id = %self.apply_id, code = "E40005", "layout apply finished with failed operations");
        }

        // Rollback composes only for fresh applies.
        if final_status == ApplyStatus::Canceled && action == Action::Request {
            let rollback = rollback_plan(&resume_basis.0, &resume_basis.1);
            rollback_procedures = Some(rollback.clone());
            if run.rollback_flag {
                self.store
                    .update_rollback_status(&self.apply_id, ApplyStatus::InProgress, Some(&rollback))
                    .await?;
                info!(apply_id = %self.apply_id, operations = rollback.len(), "start rollback");
                // No cancel polling inside the rollback run: the row
                // already reads CANCELING/CANCELED.
                let rollback_run = self.execute_plan(&rollback, ResultTrack::Rollback, false).await?;
                rollback_status = Some(finalize(&rollback_run));
                rollback_result = Some(rollback_run.executed.clone());
                resume_basis = (rollback, rollback_run.executed);
            }
        }

        match action {
            Action::Request => {}
            Action::Resume => {
                // The original applyResult is preserved; this run's details
                // are the resume result.
                resume_result = apply_result.take();
            }
            Action::RollbackResume => {
                resume_result = apply_result.take();
                rollback_status = status.take();
            }
        }

        let resume_procedures = if status == Some(ApplyStatus::Suspended)
            || rollback_status == Some(ApplyStatus::Suspended)
        {
            Some(resume_plan(&resume_basis.0, &resume_basis.1))
        } else {
            None
        };

        self.store
            .update(&FinalUpdate {
                apply_id: self.apply_id.clone(),
                status,
                apply_result,
                rollback_procedures,
                rollback_status,
                rollback_result,
                resume_procedures,
                resume_result,
            })
            .await?;

        info!(apply_id = %self.apply_id, status = final_status.as_str(), "completed");
        Ok(())
    }

    /// Execute one plan to a full result list. `poll_cancel` is off for
    /// rollback runs, which are not themselves cancelable.
    async fn execute_plan(
        &self,
        plan: &[Procedure],
        track: ResultTrack,
        poll_cancel: bool,
    ) -> Result<PlanRun, ApplyError> {
        let total = plan.len();
        let mut executed: Vec<Detail> = Vec::with_capacity(total);
        let mut pending: Vec<Procedure> = plan.to_vec();
        let mut suspended = false;
        let mut cancel_flag = false;
        let mut rollback_flag = false;

        // Pre-check: cancel arrived before the first dispatch.
        if poll_cancel {
            let current = self.store.get_current(&self.apply_id).await?;
            if current.status == ApplyStatus::Canceling {
                debug!(apply_id = %self.apply_id, "cancel requested before start; all tasks canceled");
                for proc in pending.drain(..) {
                    executed.push(Detail::bare(proc.operation_id, DetailStatus::Canceled));
                }
                self.store
                    .update_result(&self.apply_id, &executed, track)
                    .await?;
                return Ok(PlanRun {
                    executed,
                    suspended: false,
                    rollback_flag: false,
                });
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut inflight: JoinSet<DispatchOutcome> = JoinSet::new();

        // Seed: every node with no dependencies, in source order.
        let (ready, rest): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|p| p.dependencies.is_empty());
        pending = rest;
        for proc in ready {
            self.submit(&mut inflight, &semaphore, proc);
        }

        while executed.len() < total {
            let mut batch: Vec<DispatchOutcome> = Vec::new();
            match inflight.join_next().await {
                Some(joined) => batch.push(joined.map_err(worker_died)?),
                None => {
                    // Nothing inflight and nothing executable: a graph this
                    // loop cannot finish. Validation rejects such plans;
                    // surface rather than spin.
                    return Err(ApplyError::ExecutionFailed(format!(
                        "no runnable operations left with {} of {total} results collected",
                        executed.len()
                    )));
                }
            }
            while let Some(joined) = inflight.try_join_next() {
                batch.push(joined.map_err(worker_died)?);
            }

            if !suspended {
                suspended = batch.iter().any(|o| o.suspended);
            }

            // Cancel is observed between waits only, and never once a
            // suspension is pending.
            if poll_cancel && !suspended && !cancel_flag {
                let current = self.store.get_current(&self.apply_id).await?;
                if current.status == ApplyStatus::Canceling {
                    cancel_flag = true;
                    rollback_flag = current.execute_rollback;
                    debug!(apply_id = %self.apply_id, "cancel requested; draining inflight operations");
                    while let Some(joined) = inflight.join_next().await {
                        batch.push(joined.map_err(worker_died)?);
                    }
                    if !suspended {
                        suspended = batch.iter().any(|o| o.suspended);
                    }
                }
            }

            for outcome in batch {
                let failed = outcome.detail.status == DetailStatus::Failed;
                let failed_id = outcome.detail.operation_id;
                executed.push(outcome.detail);

                if failed {
                    for id in skip_closure(failed_id, &mut pending) {
                        executed.push(Detail::bare(id, DetailStatus::Skipped));
                    }
                }
                if cancel_flag {
                    for proc in pending.drain(..) {
                        executed.push(Detail::bare(proc.operation_id, DetailStatus::Canceled));
                    }
                }
            }

            self.store
                .update_result(&self.apply_id, &executed, track)
                .await?;

            if !pending.is_empty() {
                let completed: HashSet<i64> = executed
                    .iter()
                    .filter(|d| d.status == DetailStatus::Completed)
                    .map(|d| d.operation_id)
                    .collect();
                // Strict set containment: every dependency must be
                // COMPLETED before a node becomes runnable.
                let (ready, rest): (Vec<_>, Vec<_>) = pending
                    .into_iter()
                    .partition(|p| p.dependencies.iter().all(|dep| completed.contains(dep)));
                pending = rest;
                for proc in ready {
                    self.submit(&mut inflight, &semaphore, proc);
                }
            }
        }

        // The loop only exits with every submitted task collected; dropping
        // the set cannot abort work that still intends to write anywhere.
        drop(inflight);

        Ok(PlanRun {
            executed,
            suspended,
            rollback_flag,
        })
    }

    fn submit(
        &self,
        inflight: &mut JoinSet<DispatchOutcome>,
        semaphore: &Arc<Semaphore>,
        procedure: Procedure,
    ) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let semaphore = Arc::clone(semaphore);
        let cancel = self.cancel.clone();
        inflight.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("worker-pool semaphore is never closed");
            dispatcher.dispatch(&procedure, &cancel).await
        });
    }
}

fn worker_died(err: tokio::task::JoinError) -> ApplyError {
    ApplyError::ExecutionFailed(format!("worker task died: {err}"))
}

/// Final status derivation for one track.
fn finalize(run: &PlanRun) -> ApplyStatus {
    if run.suspended {
        ApplyStatus::Suspended
    } else if run
        .executed
        .iter()
        .any(|d| d.status == DetailStatus::Failed)
    {
        ApplyStatus::Failed
    } else if run
        .executed
        .iter()
        .any(|d| d.status == DetailStatus::Canceled)
    {
        ApplyStatus::Canceled
    } else {
        ApplyStatus::Completed
    }
}

/// Remove from `pending` every node that transitively depends on
/// `failed_id`, returning the removed ids in removal order. Skipped ids are
/// themselves treated as failure-like roots.
fn skip_closure(failed_id: i64, pending: &mut Vec<Procedure>) -> Vec<i64> {
    let mut roots: HashSet<i64> = HashSet::from([failed_id]);
    let mut skipped: Vec<i64> = Vec::new();
    loop {
        let before = pending.len();
        let mut index = 0;
        while index < pending.len() {
            if pending[index]
                .dependencies
                .iter()
                .any(|dep| roots.contains(dep))
            {
                let proc = pending.remove(index);
                roots.insert(proc.operation_id);
                skipped.push(proc.operation_id);
            } else {
                index += 1;
            }
        }
        if pending.len() == before {
            return skipped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lap_schemas::Operation;

    fn node(id: i64, deps: &[i64]) -> Procedure {
        Procedure {
            operation_id: id,
            operation: Operation::Boot,
            target_cpu_id: None,
            target_device_id: Some(format!("dev-{id}")),
            target_service_id: None,
            dependencies: deps.to_vec(),
        }
    }

    fn run_with(statuses: &[DetailStatus], suspended: bool) -> PlanRun {
        PlanRun {
            executed: statuses
                .iter()
                .enumerate()
                .map(|(i, s)| Detail::bare(i as i64 + 1, *s))
                .collect(),
            suspended,
            rollback_flag: false,
        }
    }

    #[test]
    fn skip_closure_is_transitive() {
        let mut pending = vec![node(2, &[1]), node(3, &[2]), node(4, &[9]), node(5, &[3, 4])];
        let skipped = skip_closure(1, &mut pending);
        assert_eq!(skipped, vec![2, 3, 5]);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation_id, 4, "unrelated node survives");
    }

    #[test]
    fn skip_closure_with_no_dependents_is_empty() {
        let mut pending = vec![node(2, &[]), node(3, &[2])];
        assert!(skip_closure(1, &mut pending).is_empty());
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn finalize_suspended_beats_failed() {
        let run = run_with(&[DetailStatus::Failed, DetailStatus::Completed], true);
        assert_eq!(finalize(&run), ApplyStatus::Suspended);
    }

    #[test]
    fn finalize_failed_beats_canceled() {
        let run = run_with(
            &[
                DetailStatus::Failed,
                DetailStatus::Canceled,
                DetailStatus::Skipped,
            ],
            false,
        );
        assert_eq!(finalize(&run), ApplyStatus::Failed);
    }

    #[test]
    fn finalize_canceled_beats_completed() {
        let run = run_with(&[DetailStatus::Completed, DetailStatus::Canceled], false);
        assert_eq!(finalize(&run), ApplyStatus::Canceled);
    }

    #[test]
    fn finalize_all_completed_and_empty_plan_complete() {
        assert_eq!(
            finalize(&run_with(&[DetailStatus::Completed], false)),
            ApplyStatus::Completed
        );
        assert_eq!(finalize(&run_with(&[], false)), ApplyStatus::Completed);
    }

    #[test]
    fn skipped_alone_is_not_failure_for_finalization() {
        // A SKIPPED entry carries no execution evidence; with its FAILED
        // root absent (hypothetically) it would not fail the apply.
        let run = run_with(&[DetailStatus::Completed, DetailStatus::Skipped], false);
        assert_eq!(finalize(&run), ApplyStatus::Completed);
    }
}
