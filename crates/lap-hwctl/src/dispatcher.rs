//! The concrete dispatcher wired to the configured remotes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use lap_config::LayoutApplyConfig;
use lap_schemas::{DetailStatus, Operation, Procedure};

use crate::{hardware, workflow, DispatchOutcome, Dispatcher};

/// Dispatches operations over HTTP per the configured policy tables.
///
/// Each dispatch builds its own `reqwest::Client`; tasks share nothing
/// mutable.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    config: Arc<LayoutApplyConfig>,
}

impl HttpDispatcher {
    pub fn new(config: Arc<LayoutApplyConfig>) -> Self {
        HttpDispatcher { config }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, procedure: &Procedure, cancel: &CancellationToken) -> DispatchOutcome {
        let started_at = Utc::now();
        let http = reqwest::Client::new();
        let hw = &self.config.hardware_control;

        let mut outcome = match procedure.operation {
            Operation::Connect | Operation::Disconnect => {
                hardware::fabric_operation(&http, hw, procedure, cancel).await
            }
            Operation::Boot => hardware::boot(&http, hw, procedure, cancel).await,
            Operation::Shutdown => {
                hardware::shutdown(&http, hw, &self.config.get_information, procedure, cancel).await
            }
            Operation::Start | Operation::Stop => {
                workflow::extended_procedure(&http, &self.config.workflow_manager, procedure, cancel)
                    .await
            }
        };

        // A cooperative-cancel detail carries no execution evidence at all.
        if outcome.detail.status != DetailStatus::Canceled {
            outcome.detail.started_at = Some(started_at);
            outcome.detail.ended_at = Some(Utc::now());
        }

        info!(
            operation_id = procedure.operation_id,
            operation = %procedure.operation,
            status = outcome.detail.status.as_str(),
            suspended = outcome.suspended,
            "operation dispatched"
        );
        outcome
    }
}
