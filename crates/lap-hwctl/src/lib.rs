//! Operation dispatcher for the hardware-control and workflow-manager
//! remotes.
//!
//! One dispatch executes one plan node end to end: the main request with its
//! configured retry/skip policy, the post-success polling exchange where the
//! operation has one, and classification of the outcome into a
//! [`lap_schemas::Detail`] plus a suspend flag. Which responses are
//! retry-eligible, skip-eligible, or still-in-progress comes entirely from
//! [`lap_config`] policy tables.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lap_schemas::{Detail, Procedure};

mod client;
mod dispatcher;
mod hardware;
mod workflow;

pub use dispatcher::HttpDispatcher;

/// Result of dispatching one procedure.
///
/// `suspended` is raised for transient exhaustion (infrastructure retry or
/// polling ran out) — the detail is `FAILED` but the work is recoverable by
/// a later resume.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub detail: Detail,
    pub suspended: bool,
}

/// Seam between the scheduler and the remote endpoints.
///
/// Implementations must be `Send + Sync`; the scheduler holds one behind an
/// `Arc` and calls it from worker tasks. The cancel token is only observed
/// inside retry/poll sleeps (cooperative shutdown on process exit); the
/// scheduler's own cancel discipline drains running tasks to completion
/// instead of interrupting them.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, procedure: &Procedure, cancel: &CancellationToken) -> DispatchOutcome;
}
