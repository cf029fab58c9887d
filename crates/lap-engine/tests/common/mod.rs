//! In-process stand-ins for the scheduler's two seams: an in-memory state
//! store and a scripted dispatcher.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use lap_db::{CurrentStatus, FinalUpdate, ResultTrack};
use lap_engine::StateStore;
use lap_hwctl::{DispatchOutcome, Dispatcher};
use lap_schemas::{ApplyError, ApplyStatus, Detail, DetailStatus, Procedure};

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

struct StoreState {
    status: ApplyStatus,
    execute_rollback: bool,
    polls: u32,
    /// Flip status to CANCELING when the poll counter reaches this value.
    cancel_on_poll: Option<u32>,
    updates: Vec<FinalUpdate>,
    rollback_marks: Vec<(ApplyStatus, Option<Vec<Procedure>>)>,
    incremental: Vec<(ResultTrack, Vec<Detail>)>,
}

pub struct MockStore {
    state: Mutex<StoreState>,
}

impl MockStore {
    pub fn in_progress() -> Self {
        MockStore {
            state: Mutex::new(StoreState {
                status: ApplyStatus::InProgress,
                ..StoreState::empty()
            }),
        }
    }

    pub fn canceling(execute_rollback: bool) -> Self {
        MockStore {
            state: Mutex::new(StoreState {
                status: ApplyStatus::Canceling,
                execute_rollback,
                ..StoreState::empty()
            }),
        }
    }

    /// IN_PROGRESS until the n-th `get_current` poll, then CANCELING.
    pub fn cancel_on_poll(n: u32, execute_rollback: bool) -> Self {
        MockStore {
            state: Mutex::new(StoreState {
                status: ApplyStatus::InProgress,
                execute_rollback,
                cancel_on_poll: Some(n),
                ..StoreState::empty()
            }),
        }
    }

    pub fn updates(&self) -> Vec<FinalUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn last_update(&self) -> FinalUpdate {
        self.state
            .lock()
            .unwrap()
            .updates
            .last()
            .expect("scheduler wrote no final update")
            .clone()
    }

    pub fn rollback_marks(&self) -> Vec<(ApplyStatus, Option<Vec<Procedure>>)> {
        self.state.lock().unwrap().rollback_marks.clone()
    }

    pub fn incremental_writes(&self) -> Vec<(ResultTrack, Vec<Detail>)> {
        self.state.lock().unwrap().incremental.clone()
    }
}

impl StoreState {
    fn empty() -> Self {
        StoreState {
            status: ApplyStatus::InProgress,
            execute_rollback: false,
            polls: 0,
            cancel_on_poll: None,
            updates: Vec::new(),
            rollback_marks: Vec::new(),
            incremental: Vec::new(),
        }
    }
}

#[async_trait]
impl StateStore for MockStore {
    async fn get_current(&self, _apply_id: &str) -> Result<CurrentStatus, ApplyError> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        if let Some(n) = state.cancel_on_poll {
            if state.polls >= n {
                state.status = ApplyStatus::Canceling;
            }
        }
        Ok(CurrentStatus {
            status: state.status,
            execute_rollback: state.execute_rollback,
        })
    }

    async fn update(&self, update: &FinalUpdate) -> Result<(), ApplyError> {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = update.status {
            state.status = status;
        }
        state.updates.push(update.clone());
        Ok(())
    }

    async fn update_rollback_status(
        &self,
        _apply_id: &str,
        status: ApplyStatus,
        procedures: Option<&[Procedure]>,
    ) -> Result<(), ApplyError> {
        self.state
            .lock()
            .unwrap()
            .rollback_marks
            .push((status, procedures.map(|p| p.to_vec())));
        Ok(())
    }

    async fn update_result(
        &self,
        _apply_id: &str,
        details: &[Detail],
        track: ResultTrack,
    ) -> Result<(), ApplyError> {
        self.state
            .lock()
            .unwrap()
            .incremental
            .push((track, details.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedDispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Complete,
    /// Definite failure: FAILED detail, no suspension.
    Fail,
    /// Transient exhaustion: FAILED detail with the suspend flag raised.
    Suspend,
}

pub struct ScriptedDispatcher {
    scripts: HashMap<i64, Script>,
    /// Narrower scripts for ids that run under more than one operation
    /// (apply vs. rollback track); these win over `scripts`.
    op_scripts: HashMap<(i64, lap_schemas::Operation), Script>,
    calls: Mutex<Vec<i64>>,
}

impl ScriptedDispatcher {
    /// Every operation completes.
    pub fn all_complete() -> Self {
        Self::with_scripts([])
    }

    pub fn with_scripts(scripts: impl IntoIterator<Item = (i64, Script)>) -> Self {
        ScriptedDispatcher {
            scripts: scripts.into_iter().collect(),
            op_scripts: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_op_scripts(
        scripts: impl IntoIterator<Item = ((i64, lap_schemas::Operation), Script)>,
    ) -> Self {
        ScriptedDispatcher {
            scripts: HashMap::new(),
            op_scripts: scripts.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// OperationIDs in dispatch order.
    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn executed_detail(operation_id: i64, status: DetailStatus) -> Detail {
    let mut detail = Detail::bare(operation_id, status);
    detail.uri = Some(format!("http://hw.mock/devices/dev-{operation_id}/power-operation"));
    detail.method = Some("PUT".into());
    detail.status_code = Some(if status == DetailStatus::Completed { 200 } else { 500 });
    detail.started_at = Some(Utc::now());
    detail.ended_at = Some(Utc::now());
    detail
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn dispatch(
        &self,
        procedure: &Procedure,
        _cancel: &CancellationToken,
    ) -> DispatchOutcome {
        self.calls.lock().unwrap().push(procedure.operation_id);
        // Yield so peer tasks interleave the way real HTTP calls would.
        tokio::task::yield_now().await;
        let script = self
            .op_scripts
            .get(&(procedure.operation_id, procedure.operation))
            .or_else(|| self.scripts.get(&procedure.operation_id))
            .copied()
            .unwrap_or(Script::Complete);
        match script {
            Script::Complete => DispatchOutcome {
                detail: executed_detail(procedure.operation_id, DetailStatus::Completed),
                suspended: false,
            },
            Script::Fail => DispatchOutcome {
                detail: executed_detail(procedure.operation_id, DetailStatus::Failed),
                suspended: false,
            },
            Script::Suspend => DispatchOutcome {
                detail: executed_detail(procedure.operation_id, DetailStatus::Failed),
                suspended: true,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Plan helpers
// ---------------------------------------------------------------------------

pub fn node(id: i64, operation: lap_schemas::Operation, deps: &[i64]) -> Procedure {
    Procedure {
        operation_id: id,
        operation,
        target_cpu_id: Some("cpu-1".into()),
        target_device_id: Some(format!("dev-{id}")),
        target_service_id: Some(format!("svc-{id}")),
        dependencies: deps.to_vec(),
    }
}
