//! Apply-level status values and the transition discipline.
//!
//! The same value set is used on the apply track and the rollback track.
//!
//! ```text
//!    ∅ → IN_PROGRESS
//!    IN_PROGRESS → COMPLETED | FAILED | SUSPENDED | CANCELING
//!    CANCELING   → CANCELED
//!    CANCELED (rollback ∅)   → rollback IN_PROGRESS (auto-rollback)
//!    rollback IN_PROGRESS    → COMPLETED | FAILED | SUSPENDED
//!    SUSPENDED (either track)→ IN_PROGRESS (resume) → terminal
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ApplyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyStatus {
    InProgress,
    Canceling,
    Completed,
    Failed,
    Canceled,
    Suspended,
}

impl ApplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyStatus::InProgress => "IN_PROGRESS",
            ApplyStatus::Canceling => "CANCELING",
            ApplyStatus::Completed => "COMPLETED",
            ApplyStatus::Failed => "FAILED",
            ApplyStatus::Canceled => "CANCELED",
            ApplyStatus::Suspended => "SUSPENDED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ApplyError> {
        match s {
            "IN_PROGRESS" => Ok(ApplyStatus::InProgress),
            "CANCELING" => Ok(ApplyStatus::Canceling),
            "COMPLETED" => Ok(ApplyStatus::Completed),
            "FAILED" => Ok(ApplyStatus::Failed),
            "CANCELED" => Ok(ApplyStatus::Canceled),
            "SUSPENDED" => Ok(ApplyStatus::Suspended),
            other => Err(ApplyError::QueryFailed(format!(
                "invalid apply status: {other}"
            ))),
        }
    }

    /// Returns `true` once no further transitions are possible on this track.
    ///
    /// `SUSPENDED` is non-terminal: it still blocks new applies and can be
    /// resumed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplyStatus::Completed | ApplyStatus::Failed | ApplyStatus::Canceled
        )
    }
}

impl std::fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        for s in [
            "IN_PROGRESS",
            "CANCELING",
            "COMPLETED",
            "FAILED",
            "CANCELED",
            "SUSPENDED",
        ] {
            assert_eq!(ApplyStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(ApplyStatus::parse("RUNNING").is_err());
    }

    #[test]
    fn suspended_is_not_terminal() {
        assert!(!ApplyStatus::Suspended.is_terminal());
        assert!(!ApplyStatus::InProgress.is_terminal());
        assert!(!ApplyStatus::Canceling.is_terminal());
        assert!(ApplyStatus::Completed.is_terminal());
        assert!(ApplyStatus::Failed.is_terminal());
        assert!(ApplyStatus::Canceled.is_terminal());
    }
}
