//! Plan validation, executed before anything touches the store.

use std::collections::{HashMap, HashSet};

use crate::error::ApplyError;
use crate::plan::{Operation, Plan, Procedure};

/// Validate the whole plan.
///
/// Checks, in order per node: positive operationID, uniqueness, required
/// target fields for the operation kind, then graph shape (self-loops,
/// dangling dependency references, cycles). Any violation is a
/// [`ApplyError::Validation`] (`E40001`).
pub fn validate_plan(plan: &Plan) -> Result<(), ApplyError> {
    let mut ids: HashSet<i64> = HashSet::new();
    for proc in &plan.procedures {
        if proc.operation_id < 1 {
            return Err(ApplyError::Validation(format!(
                "operationID must be a positive integer, got {}",
                proc.operation_id
            )));
        }
        if !ids.insert(proc.operation_id) {
            return Err(ApplyError::Validation(format!(
                "duplicate operationID {}",
                proc.operation_id
            )));
        }
        validate_targets(proc)?;
    }

    for proc in &plan.procedures {
        for dep in &proc.dependencies {
            if *dep == proc.operation_id {
                return Err(ApplyError::Validation(format!(
                    "operationID {} depends on itself",
                    proc.operation_id
                )));
            }
            if !ids.contains(dep) {
                return Err(ApplyError::Validation(format!(
                    "operationID {} depends on undefined operationID {dep}",
                    proc.operation_id
                )));
            }
        }
    }

    detect_cycle(&plan.procedures)
}

fn validate_targets(proc: &Procedure) -> Result<(), ApplyError> {
    let require = |field: &Option<String>, name: &str| -> Result<(), ApplyError> {
        match field.as_deref() {
            Some(v) if !v.trim().is_empty() => Ok(()),
            _ => Err(ApplyError::Validation(format!(
                "operationID {}: operation '{}' requires a non-empty {name}",
                proc.operation_id, proc.operation
            ))),
        }
    };

    match proc.operation {
        Operation::Shutdown | Operation::Boot => require(&proc.target_device_id, "targetDeviceID"),
        Operation::Connect | Operation::Disconnect => {
            require(&proc.target_cpu_id, "targetCPUID")?;
            require(&proc.target_device_id, "targetDeviceID")
        }
        Operation::Start | Operation::Stop => {
            require(&proc.target_cpu_id, "targetCPUID")?;
            require(&proc.target_service_id, "targetServiceID")
        }
    }
}

/// Kahn's algorithm; whatever cannot be peeled off sits on a cycle.
fn detect_cycle(procedures: &[Procedure]) -> Result<(), ApplyError> {
    let mut indegree: HashMap<i64, usize> = procedures
        .iter()
        .map(|p| (p.operation_id, p.dependencies.len()))
        .collect();
    let mut dependents: HashMap<i64, Vec<i64>> = HashMap::new();
    for p in procedures {
        for dep in &p.dependencies {
            dependents.entry(*dep).or_default().push(p.operation_id);
        }
    }

    let mut ready: Vec<i64> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut peeled = 0usize;
    while let Some(id) = ready.pop() {
        peeled += 1;
        for next in dependents.get(&id).into_iter().flatten() {
            let d = indegree.get_mut(next).expect("dependent is a defined node");
            *d -= 1;
            if *d == 0 {
                ready.push(*next);
            }
        }
    }

    if peeled != procedures.len() {
        return Err(ApplyError::Validation(
            "dependencies form a cycle".to_string(),
        ));
    }
    Ok(())
}
