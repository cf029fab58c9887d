//! Error taxonomy surfaced outward.
//!
//! Every variant carries a stable code that operators and callers key on;
//! messages are human-readable and never include secrets.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ApplyError {
    /// Malformed plan: unknown operation, missing target field, bad
    /// dependency graph. Raised before anything is registered.
    #[error("invalid migration procedure: {0}")]
    Validation(String),

    /// The scheduler hit an unrecoverable internal failure.
    #[error("failed to execute layout apply: {0}")]
    ExecutionFailed(String),

    /// Another apply (or its rollback) is still running.
    #[error("layout apply is already running")]
    AlreadyRunning,

    /// The apply-state store could not be reached after bounded retries.
    #[error("could not connect to the apply-state store: {0}")]
    StoreUnavailable(String),

    /// A query or constraint failed in a non-retryable way.
    #[error("apply-state store query failed: {0}")]
    QueryFailed(String),

    /// No record exists for the given applyID.
    #[error("applyID not found: {0}")]
    NotFound(String),

    /// The target apply already reached a terminal state.
    #[error("layout apply already executed: {0}")]
    AlreadyExecuted(String),

    /// Delete was requested while the apply (or its rollback) is still live.
    #[error("layout apply is in progress and cannot be deleted: {0}")]
    DeleteConflict(String),

    /// The worker task could not be launched.
    #[error("failed to start apply worker: {0}")]
    WorkerSpawn(String),

    /// A suspended apply exists; it must be resumed or resolved first.
    #[error("suspended layout apply data exists")]
    SuspendedDataExists,

    /// The registered worker process is gone; the status was forced to
    /// FAILED.
    #[error("worker process is missing; status forced to FAILED: {0}")]
    ProcessMissing(String),
}

impl ApplyError {
    /// Stable error code for logs and response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ApplyError::Validation(_) => "E40001",
            ApplyError::ExecutionFailed(_) => "E40005",
            ApplyError::AlreadyRunning => "E40010",
            ApplyError::StoreUnavailable(_) => "E40018",
            ApplyError::QueryFailed(_) => "E40019",
            ApplyError::NotFound(_) => "E40020",
            ApplyError::AlreadyExecuted(_) => "E40022",
            ApplyError::DeleteConflict(_) => "E40024",
            ApplyError::WorkerSpawn(_) => "E40026",
            ApplyError::SuspendedDataExists => "E40027",
            ApplyError::ProcessMissing(_) => "E40028",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ApplyError::Validation("x".into()).code(), "E40001");
        assert_eq!(ApplyError::ExecutionFailed("x".into()).code(), "E40005");
        assert_eq!(ApplyError::AlreadyRunning.code(), "E40010");
        assert_eq!(ApplyError::StoreUnavailable("x".into()).code(), "E40018");
        assert_eq!(ApplyError::QueryFailed("x".into()).code(), "E40019");
        assert_eq!(ApplyError::NotFound("x".into()).code(), "E40020");
        assert_eq!(ApplyError::AlreadyExecuted("x".into()).code(), "E40022");
        assert_eq!(ApplyError::DeleteConflict("x".into()).code(), "E40024");
        assert_eq!(ApplyError::WorkerSpawn("x".into()).code(), "E40026");
        assert_eq!(ApplyError::SuspendedDataExists.code(), "E40027");
        assert_eq!(ApplyError::ProcessMissing("x".into()).code(), "E40028");
    }

    #[test]
    fn message_names_the_apply_id() {
        let err = ApplyError::NotFound("0123456789".into());
        assert!(err.to_string().contains("0123456789"));
    }
}
