//! Migration-plan input model: a DAG of hardware-control operations.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// The six operation kinds a plan node can carry.
///
/// `shutdown`/`boot` act on a device, `connect`/`disconnect` bind a device to
/// a host CPU, `start`/`stop` drive an extended workflow procedure on the
/// workflow manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Shutdown,
    Boot,
    Connect,
    Disconnect,
    Start,
    Stop,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Shutdown => "shutdown",
            Operation::Boot => "boot",
            Operation::Connect => "connect",
            Operation::Disconnect => "disconnect",
            Operation::Start => "start",
            Operation::Stop => "stop",
        }
    }

    /// The inverse operation used when synthesizing a rollback plan.
    ///
    /// |origin    |   |inverse   |
    /// |----------|---|----------|
    /// |shutdown  | → |boot      |
    /// |boot      | → |shutdown  |
    /// |connect   | → |disconnect|
    /// |disconnect| → |connect   |
    ///
    /// `start`/`stop` are not undoable and return `None`; a completed
    /// workflow procedure is excluded from rollback.
    pub fn inverse(&self) -> Option<Operation> {
        match self {
            Operation::Shutdown => Some(Operation::Boot),
            Operation::Boot => Some(Operation::Shutdown),
            Operation::Connect => Some(Operation::Disconnect),
            Operation::Disconnect => Some(Operation::Connect),
            Operation::Start | Operation::Stop => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Procedure / Plan
// ---------------------------------------------------------------------------

/// One node of the migration-plan DAG.
///
/// Which target fields are required depends on the operation; see
/// [`crate::validate::validate_plan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    #[serde(rename = "operationID")]
    pub operation_id: i64,
    pub operation: Operation,
    #[serde(rename = "targetCPUID", skip_serializing_if = "Option::is_none", default)]
    pub target_cpu_id: Option<String>,
    #[serde(rename = "targetDeviceID", skip_serializing_if = "Option::is_none", default)]
    pub target_device_id: Option<String>,
    #[serde(rename = "targetServiceID", skip_serializing_if = "Option::is_none", default)]
    pub target_service_id: Option<String>,
    /// OperationIDs that must reach COMPLETED before this node may start.
    #[serde(default)]
    pub dependencies: Vec<i64>,
}

/// The full migration plan. An empty plan is legal and vacuously complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub procedures: Vec<Procedure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_round_trips_through_serde() {
        for (op, s) in [
            (Operation::Shutdown, "\"shutdown\""),
            (Operation::Boot, "\"boot\""),
            (Operation::Connect, "\"connect\""),
            (Operation::Disconnect, "\"disconnect\""),
            (Operation::Start, "\"start\""),
            (Operation::Stop, "\"stop\""),
        ] {
            assert_eq!(serde_json::to_string(&op).unwrap(), s);
            assert_eq!(serde_json::from_str::<Operation>(s).unwrap(), op);
        }
    }

    #[test]
    fn unknown_operation_is_rejected() {
        assert!(serde_json::from_str::<Operation>("\"reboot\"").is_err());
    }

    #[test]
    fn inverse_covers_hardware_ops_only() {
        assert_eq!(Operation::Shutdown.inverse(), Some(Operation::Boot));
        assert_eq!(Operation::Boot.inverse(), Some(Operation::Shutdown));
        assert_eq!(Operation::Connect.inverse(), Some(Operation::Disconnect));
        assert_eq!(Operation::Disconnect.inverse(), Some(Operation::Connect));
        assert_eq!(Operation::Start.inverse(), None);
        assert_eq!(Operation::Stop.inverse(), None);
    }

    #[test]
    fn procedure_wire_names_are_camel_case() {
        let proc = Procedure {
            operation_id: 1,
            operation: Operation::Connect,
            target_cpu_id: Some("cpu-1".into()),
            target_device_id: Some("dev-1".into()),
            target_service_id: None,
            dependencies: vec![],
        };
        let v = serde_json::to_value(&proc).unwrap();
        assert_eq!(v["operationID"], 1);
        assert_eq!(v["targetCPUID"], "cpu-1");
        assert_eq!(v["targetDeviceID"], "dev-1");
        assert!(v.get("targetServiceID").is_none());
    }

    #[test]
    fn plan_parses_from_wire_json() {
        let plan: Plan = serde_json::from_str(
            r#"{"procedures":[
                {"operationID":1,"operation":"boot","targetDeviceID":"d1","dependencies":[]},
                {"operationID":2,"operation":"shutdown","targetDeviceID":"d2","dependencies":[1]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(plan.procedures.len(), 2);
        assert_eq!(plan.procedures[1].dependencies, vec![1]);
    }
}
