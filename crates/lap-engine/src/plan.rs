//! Rollback and resume plan synthesizers.
//!
//! Both are pure functions over an input plan and its result list; the
//! scheduler computes readiness from `dependencies` alone, so neither cares
//! about output ordering.

use std::collections::HashSet;

use lap_schemas::{Detail, DetailStatus, Procedure};

fn ids_with_status(details: &[Detail], status: DetailStatus) -> HashSet<i64> {
    details
        .iter()
        .filter(|d| d.status == status)
        .map(|d| d.operation_id)
        .collect()
}

/// Derive the inverse plan over the completed subset.
///
/// Undoables are completed nodes whose operation has an inverse
/// (`shutdown↔boot`, `connect↔disconnect`; workflow start/stop is not
/// invertible and is excluded). Every edge `u → v` inside the undoable set
/// is reversed — the rollback of `u` now waits for the rollback of `v` —
/// and dependencies leaving the set are dropped. OperationIDs are
/// preserved.
pub fn rollback_plan(origin: &[Procedure], executed: &[Detail]) -> Vec<Procedure> {
    let completed = ids_with_status(executed, DetailStatus::Completed);

    let undoable: Vec<&Procedure> = origin
        .iter()
        .filter(|p| completed.contains(&p.operation_id) && p.operation.inverse().is_some())
        .collect();
    undoable
        .iter()
        .map(|proc| {
            // Reversed adjacency restricted to the undoable set: the
            // rollback of `proc` waits for every undoable node that
            // originally depended on it.
            let dependencies = undoable
                .iter()
                .filter(|other| other.dependencies.contains(&proc.operation_id))
                .map(|other| other.operation_id)
                .collect();
            Procedure {
                operation_id: proc.operation_id,
                operation: proc
                    .operation
                    .inverse()
                    .expect("undoable set only holds invertible operations"),
                target_cpu_id: proc.target_cpu_id.clone(),
                target_device_id: proc.target_device_id.clone(),
                target_service_id: proc.target_service_id.clone(),
                dependencies,
            }
        })
        .collect()
}

/// Derive the remaining-work plan over the FAILED/SKIPPED subset.
///
/// Dependencies pointing at COMPLETED operations are dropped (already
/// satisfied); operationIDs and operation kinds are preserved.
pub fn resume_plan(origin: &[Procedure], executed: &[Detail]) -> Vec<Procedure> {
    let mut leftover = ids_with_status(executed, DetailStatus::Failed);
    leftover.extend(ids_with_status(executed, DetailStatus::Skipped));
    let completed = ids_with_status(executed, DetailStatus::Completed);

    origin
        .iter()
        .filter(|p| leftover.contains(&p.operation_id))
        .map(|p| {
            let mut proc = p.clone();
            proc.dependencies.retain(|dep| !completed.contains(dep));
            proc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lap_schemas::Operation;

    fn node(id: i64, operation: Operation, deps: &[i64]) -> Procedure {
        Procedure {
            operation_id: id,
            operation,
            target_cpu_id: Some("cpu-1".into()),
            target_device_id: Some(format!("dev-{id}")),
            target_service_id: Some(format!("svc-{id}")),
            dependencies: deps.to_vec(),
        }
    }

    fn done(id: i64) -> Detail {
        Detail::bare(id, DetailStatus::Completed)
    }

    #[test]
    fn rollback_inverts_operations_and_reverses_edges() {
        // 1 (disconnect) → 2 (shutdown) → 3 (connect); 3 never completed.
        let origin = vec![
            node(1, Operation::Disconnect, &[]),
            node(2, Operation::Shutdown, &[1]),
            node(3, Operation::Connect, &[2]),
        ];
        let executed = vec![
            done(1),
            done(2),
            Detail::bare(3, DetailStatus::Canceled),
        ];

        let mut rollback = rollback_plan(&origin, &executed);
        rollback.sort_by_key(|p| p.operation_id);

        assert_eq!(rollback.len(), 2);
        assert_eq!(rollback[0].operation_id, 1);
        assert_eq!(rollback[0].operation, Operation::Connect);
        assert_eq!(rollback[0].dependencies, vec![2], "edge 1→2 reversed");
        assert_eq!(rollback[1].operation_id, 2);
        assert_eq!(rollback[1].operation, Operation::Boot);
        assert!(
            rollback[1].dependencies.is_empty(),
            "dependency on un-undoable 3 dropped"
        );
    }

    #[test]
    fn rollback_preserves_target_fields() {
        let origin = vec![node(4, Operation::Boot, &[])];
        let rollback = rollback_plan(&origin, &[done(4)]);
        assert_eq!(rollback[0].operation, Operation::Shutdown);
        assert_eq!(rollback[0].target_device_id.as_deref(), Some("dev-4"));
    }

    #[test]
    fn rollback_excludes_workflow_operations() {
        let origin = vec![
            node(1, Operation::Start, &[]),
            node(2, Operation::Boot, &[1]),
        ];
        let rollback = rollback_plan(&origin, &[done(1), done(2)]);
        assert_eq!(rollback.len(), 1);
        assert_eq!(rollback[0].operation_id, 2);
        assert!(
            rollback[0].dependencies.is_empty(),
            "edge into the excluded start node dropped"
        );
    }

    #[test]
    fn rollback_of_nothing_completed_is_empty() {
        let origin = vec![node(1, Operation::Boot, &[])];
        let executed = vec![Detail::bare(1, DetailStatus::Failed)];
        assert!(rollback_plan(&origin, &executed).is_empty());
    }

    /// Rollback synthesis is an involution on a fully-completed,
    /// all-undoable plan: applying it twice yields the original operations
    /// and edges.
    #[test]
    fn rollback_twice_restores_the_original_dag() {
        let origin = vec![
            node(1, Operation::Shutdown, &[]),
            node(2, Operation::Disconnect, &[1]),
            node(3, Operation::Connect, &[2]),
            node(4, Operation::Boot, &[2, 3]),
        ];
        let all_done: Vec<Detail> = origin.iter().map(|p| done(p.operation_id)).collect();

        let once = rollback_plan(&origin, &all_done);
        let twice = rollback_plan(&once, &all_done);

        let canon = |plan: &[Procedure]| {
            let mut v: Vec<(i64, Operation, Vec<i64>)> = plan
                .iter()
                .map(|p| {
                    let mut deps = p.dependencies.clone();
                    deps.sort_unstable();
                    (p.operation_id, p.operation, deps)
                })
                .collect();
            v.sort();
            v
        };
        assert_eq!(canon(&origin), canon(&twice));
    }

    #[test]
    fn resume_keeps_failed_and_skipped_only() {
        let origin = vec![
            node(1, Operation::Boot, &[]),
            node(2, Operation::Shutdown, &[1]),
            node(3, Operation::Connect, &[2]),
        ];
        let executed = vec![
            done(1),
            Detail::bare(2, DetailStatus::Failed),
            Detail::bare(3, DetailStatus::Skipped),
        ];

        let mut resume = resume_plan(&origin, &executed);
        resume.sort_by_key(|p| p.operation_id);

        assert_eq!(
            resume.iter().map(|p| p.operation_id).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(resume[0].operation, Operation::Shutdown, "kind preserved");
        assert!(
            resume[0].dependencies.is_empty(),
            "satisfied dependency on completed 1 dropped"
        );
        assert_eq!(
            resume[1].dependencies,
            vec![2],
            "dependency on a fellow leftover survives"
        );
    }

    #[test]
    fn resume_of_fully_completed_run_is_empty() {
        let origin = vec![node(1, Operation::Boot, &[])];
        assert!(resume_plan(&origin, &[done(1)]).is_empty());
    }
}
