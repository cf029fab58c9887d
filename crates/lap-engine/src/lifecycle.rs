//! Lifecycle orchestrator: the start/cancel/resume entry points.
//!
//! Start and resume validate/transition through the store first, then
//! launch the scheduler in a worker task and return immediately. The worker
//! identity (pid, command line, start time) is recorded so the cancel path
//! can detect a dead worker. Cancel communicates with a running scheduler
//! only through the store row; there is no channel into the worker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use lap_db::{ApplyStore, CancelOutcome, ResumeOutcome, ResumeTrack, WorkerIdentity};
use lap_hwctl::Dispatcher;
use lap_schemas::{validate_plan, ApplyError, ApplyStatus, Plan, Procedure};

use crate::action::Action;
use crate::scheduler::Scheduler;
use crate::store_api::StateStore;

/// Published once per terminal apply transition; delivery failures must not
/// block finalization.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, apply_id: &str, status: ApplyStatus);
}

pub struct Orchestrator {
    store: Arc<ApplyStore>,
    dispatcher: Arc<dyn Dispatcher>,
    max_workers: Option<usize>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<ApplyStore>,
        dispatcher: Arc<dyn Dispatcher>,
        max_workers: Option<usize>,
    ) -> Self {
        Orchestrator {
            store,
            dispatcher,
            max_workers,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Validate, register, and launch a fresh apply. Returns as soon as the
    /// worker is running.
    pub async fn start_apply(&self, plan: &Plan) -> Result<String, ApplyError> {
        validate_plan(plan)?;
        let apply_id = self.store.register(plan).await?;
        self.launch(apply_id.clone(), plan.procedures.clone(), Action::Request)
            .await?;
        info!(apply_id, "layout apply accepted");
        Ok(apply_id)
    }

    /// Request cancellation; returns the resulting status pair.
    pub async fn cancel_apply(
        &self,
        apply_id: &str,
        rollback_on_cancel: bool,
    ) -> Result<CancelOutcome, ApplyError> {
        self.store.request_cancel(apply_id, rollback_on_cancel).await
    }

    /// Re-enter a suspended apply (or rollback) with the persisted resume
    /// plan.
    ///
    /// A resume of an already-resolved record comes back with `track: None`;
    /// the echoed status pair is returned as-is and no worker is launched.
    pub async fn resume_apply(&self, apply_id: &str) -> Result<ResumeOutcome, ApplyError> {
        let outcome = self.store.request_resume(apply_id).await?;
        let Some(track) = outcome.track else {
            info!(apply_id, status = outcome.status.as_str(), "resume is a no-op; apply already resolved");
            return Ok(outcome);
        };
        let record = self.store.get(apply_id).await?;
        let plan = record.resume_procedures.unwrap_or_default();
        let action = match track {
            ResumeTrack::Apply => Action::Resume,
            ResumeTrack::Rollback => Action::RollbackResume,
        };
        self.launch(apply_id.to_string(), plan, action).await?;
        info!(apply_id, action = action.as_str(), "layout apply resumed");
        Ok(outcome)
    }

    async fn launch(
        &self,
        apply_id: String,
        plan: Vec<Procedure>,
        action: Action,
    ) -> Result<(), ApplyError> {
        self.store
            .record_worker(&apply_id, &WorkerIdentity::current())
            .await
            .map_err(|e| ApplyError::WorkerSpawn(e.to_string()))?;

        let store: Arc<dyn StateStore> = self.store.clone();
        let scheduler = Scheduler::new(
            store,
            Arc::clone(&self.dispatcher),
            apply_id.clone(),
            self.max_workers,
        );
        let status_store = Arc::clone(&self.store);
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            scheduler.run(plan, action).await;
            let Some(notifier) = notifier else { return };
            match status_store.get_current(&apply_id).await {
                Ok(current) => notifier.notify(&apply_id, current.status).await,
                Err(err) => {
                    warn!(apply_id, error = %err, "could not read final status for notification")
                }
            }
        });
        Ok(())
    }
}
