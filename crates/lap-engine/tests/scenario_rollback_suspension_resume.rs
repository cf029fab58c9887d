//! Suspension on the rollback track: the rollback run suspends, the resume
//! plan captures the remaining rollback, and a ROLLBACK_RESUME run
//! finishes it with the status attributed to the rollback track.

mod common;

use std::sync::Arc;

use common::{MockStore, Script, ScriptedDispatcher};
use lap_engine::{Action, Scheduler};
use lap_schemas::{ApplyStatus, DetailStatus, Operation};

fn four_node_plan() -> Vec<lap_schemas::Procedure> {
    vec![
        common::node(1, Operation::Disconnect, &[]),
        common::node(2, Operation::Shutdown, &[1]),
        common::node(3, Operation::Connect, &[2]),
        common::node(4, Operation::Disconnect, &[3]),
    ]
}

#[tokio::test]
async fn rollback_suspension_is_resumable_on_the_rollback_track() {
    // Cancel after node 2; the rollback's boot of node 2 suspends.
    let store = Arc::new(MockStore::cancel_on_poll(3, true));
    let dispatcher = Arc::new(ScriptedDispatcher::with_op_scripts([(
        (2, Operation::Boot),
        Script::Suspend,
    )]));
    Scheduler::new(store.clone(), dispatcher, "0123456789", Some(2))
        .run(four_node_plan(), Action::Request)
        .await;

    let update = store.last_update();
    assert_eq!(update.status, Some(ApplyStatus::Canceled));
    assert_eq!(update.rollback_status, Some(ApplyStatus::Suspended));

    let rollback_result = update.rollback_result.expect("rollback result recorded");
    let status_of = |id: i64| {
        rollback_result
            .iter()
            .find(|d| d.operation_id == id)
            .unwrap()
            .status
    };
    assert_eq!(status_of(2), DetailStatus::Failed, "suspended boot");
    assert_eq!(status_of(1), DetailStatus::Skipped, "blocked behind the failure");

    // The resume plan is the remaining rollback work.
    let mut resume = update.resume_procedures.expect("resume plan persisted");
    resume.sort_by_key(|p| p.operation_id);
    assert_eq!(resume.len(), 2);
    assert_eq!(resume[0].operation, Operation::Connect);
    assert_eq!(resume[0].dependencies, vec![2]);
    assert_eq!(resume[1].operation, Operation::Boot);
    assert!(resume[1].dependencies.is_empty());

    // The workflow-manager recovered; drive the rest as ROLLBACK_RESUME.
    let store = Arc::new(MockStore::in_progress());
    let healthy = Arc::new(ScriptedDispatcher::all_complete());
    Scheduler::new(store.clone(), healthy, "0123456789", Some(2))
        .run(resume, Action::RollbackResume)
        .await;

    let update = store.last_update();
    assert!(
        update.status.is_none(),
        "apply-track status is left untouched by a rollback resume"
    );
    assert_eq!(update.rollback_status, Some(ApplyStatus::Completed));
    assert!(update.apply_result.is_none());

    let resume_result = update.resume_result.expect("resumeResult written");
    assert_eq!(resume_result.len(), 2);
    assert!(resume_result
        .iter()
        .all(|d| d.status == DetailStatus::Completed));
}

#[tokio::test]
async fn suspended_rollback_resume_can_suspend_again() {
    // A ROLLBACK_RESUME run that suspends again persists a fresh leftover.
    let store = Arc::new(MockStore::in_progress());
    let dispatcher = Arc::new(ScriptedDispatcher::with_scripts([(2, Script::Suspend)]));
    let resume_input = vec![
        common::node(2, Operation::Boot, &[]),
        common::node(1, Operation::Connect, &[2]),
    ];
    Scheduler::new(store.clone(), dispatcher, "0123456789", None)
        .run(resume_input, Action::RollbackResume)
        .await;

    let update = store.last_update();
    assert_eq!(update.rollback_status, Some(ApplyStatus::Suspended));
    assert!(update.status.is_none());
    let resume = update.resume_procedures.expect("fresh leftover persisted");
    assert_eq!(resume.len(), 2);
}
