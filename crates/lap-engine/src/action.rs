//! What kind of run the scheduler was launched for.

/// Decides which result track the run writes and whether auto-rollback may
/// compose on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A fresh apply; results land in `applyResult` and a canceled run may
    /// compose a rollback.
    Request,
    /// Re-run of the leftover plan after an apply-track suspension; results
    /// land in `resumeResult`, the original `applyResult` is preserved.
    Resume,
    /// Re-run of the leftover rollback plan; the final status lands on the
    /// rollback track.
    RollbackResume,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Request => "REQUEST",
            Action::Resume => "RESUME",
            Action::RollbackResume => "ROLLBACK_RESUME",
        }
    }
}
