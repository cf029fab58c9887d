//! Workflow-manager flows: start/stop of extended procedures.

use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use lap_config::WorkflowManagerSection;
use lap_schemas::{Detail, DetailStatus, Procedure};

use crate::client::{call_with_retry, poll_until, CallOutcome, Endpoint, Exchange, PollOutcome};
use crate::DispatchOutcome;

fn detail_from(operation_id: i64, status: DetailStatus, ex: &Exchange) -> Detail {
    let mut d = Detail::bare(operation_id, status);
    d.uri = Some(ex.uri.clone());
    d.method = Some(ex.method.clone());
    d.request_body = ex.request_body.clone();
    d.status_code = ex.status_code;
    if status != DetailStatus::Completed {
        d.response_body = ex.response_body.clone();
    }
    d
}

/// `POST …/extended-procedure` with `{operation, targetCPUID,
/// targetServiceID}`; 202 acknowledges acceptance, then the paired status
/// endpoint is polled until the procedure reports COMPLETED.
pub(crate) async fn extended_procedure(
    http: &reqwest::Client,
    wf: &WorkflowManagerSection,
    procedure: &Procedure,
    cancel: &CancellationToken,
) -> DispatchOutcome {
    let spec = &wf.extended_procedure;
    let endpoint = Endpoint {
        method: Method::POST,
        uri: format!("{}/extended-procedure", wf.base_url()),
        body: Some(json!({
            "operation": procedure.operation.as_str(),
            "targetCPUID": procedure.target_cpu_id,
            "targetServiceID": procedure.target_service_id,
        })),
        timeout: Duration::from_secs(wf.timeout),
    };

    let ex = match call_with_retry(http, &endpoint, 202, &spec.retry, &spec.skip, cancel).await {
        CallOutcome::Success(ex) => ex,
        CallOutcome::Definite(ex) => {
            return DispatchOutcome {
                detail: detail_from(procedure.operation_id, DetailStatus::Failed, &ex),
                suspended: false,
            }
        }
        CallOutcome::Exhausted(ex) => {
            return DispatchOutcome {
                detail: detail_from(procedure.operation_id, DetailStatus::Failed, &ex),
                suspended: true,
            }
        }
        CallOutcome::Canceled => {
            return DispatchOutcome {
                detail: Detail::bare(procedure.operation_id, DetailStatus::Canceled),
                suspended: false,
            }
        }
    };

    let poll = Endpoint {
        method: Method::GET,
        uri: format!(
            "{}/extended-procedure/{}",
            wf.base_url(),
            procedure.target_service_id.as_deref().unwrap_or_default()
        ),
        body: None,
        timeout: Duration::from_secs(wf.timeout),
    };
    let finished = |status: u16, body: Option<&Value>| {
        status == 200
            && body
                .and_then(|b| b.get("status"))
                .and_then(Value::as_str)
                .is_some_and(|s| s == "COMPLETED")
    };

    match poll_until(http, &poll, &spec.polling, finished, cancel).await {
        PollOutcome::Achieved(_) => DispatchOutcome {
            detail: detail_from(procedure.operation_id, DetailStatus::Completed, &ex),
            suspended: false,
        },
        PollOutcome::Definite(poll_ex) => {
            let mut detail = detail_from(procedure.operation_id, DetailStatus::Failed, &ex);
            detail.response_body = poll_ex.response_body;
            DispatchOutcome {
                detail,
                suspended: false,
            }
        }
        PollOutcome::Exhausted(poll_ex) => {
            let mut detail = detail_from(procedure.operation_id, DetailStatus::Failed, &ex);
            detail.response_body = poll_ex.response_body;
            DispatchOutcome {
                detail,
                suspended: true,
            }
        }
        PollOutcome::Canceled => DispatchOutcome {
            detail: Detail::bare(procedure.operation_id, DetailStatus::Canceled),
            suspended: false,
        },
    }
}
