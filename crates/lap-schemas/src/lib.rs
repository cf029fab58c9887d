//! Shared wire types for the layout-apply orchestrator.
//!
//! Everything that crosses a crate boundary lives here: the migration-plan
//! input model, the per-operation result model, apply-level status values,
//! plan validation, and the error taxonomy with its stable `E4xxxx` codes.
//! Field names on the wire are camelCase (`operationID`, `targetDeviceID`,
//! …); Rust code uses snake_case with `serde(rename)` at the boundary.

pub mod error;
pub mod plan;
pub mod result;
pub mod status;
pub mod ts;
pub mod validate;

pub use error::ApplyError;
pub use plan::{Operation, Plan, Procedure};
pub use result::{Detail, DetailStatus, SubDetail};
pub use status::ApplyStatus;
pub use validate::validate_plan;
