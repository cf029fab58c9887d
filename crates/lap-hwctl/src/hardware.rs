//! Hardware-control flows: connect/disconnect, boot, shutdown.

use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use lap_config::{GetInformationSection, HardwareControlSection};
use lap_schemas::{Detail, DetailStatus, Operation, Procedure, SubDetail};

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

fn sub_detail(ex: &Exchange, record_response: bool) -> SubDetail {
    SubDetail {
        uri: ex.uri.clone(),
        method: ex.method.clone(),
        query_parameter: None,
        status_code: ex.status_code.unwrap_or(0),
        response_body: if record_response {
            ex.response_body.clone()
        } else {
            None
        },
    }
}

fn canceled(operation_id: i64) -> DispatchOutcome {
    DispatchOutcome {
        detail: Detail::bare(operation_id, DetailStatus::Canceled),
        suspended: false,
    }
}

// ---------------------------------------------------------------------------
// connect / disconnect
// ---------------------------------------------------------------------------

/// `PUT …/cpu/{cpuID}/operation` with `{action, deviceID}`; 200 on success,
/// no post-success polling.
pub(crate) async fn fabric_operation(
    http: &reqwest::Client,
    hw: &HardwareControlSection,
    procedure: &Procedure,
    cancel: &CancellationToken,
) -> DispatchOutcome {
    let action = procedure.operation.as_str();
    let spec = match procedure.operation {
        Operation::Connect => &hw.connect,
        _ => &hw.disconnect,
    };
    let endpoint = Endpoint {
        method: Method::PUT,
        uri: format!(
            "{}/cpu/{}/operation",
            hw.base_url(),
            procedure.target_cpu_id.as_deref().unwrap_or_default()
        ),
        body: Some(json!({
            "action": action,
            "deviceID": procedure.target_device_id,
        })),
        timeout: Duration::from_secs(spec.timeout),
    };

    match call_with_retry(http, &endpoint, 200, &spec.retry, &spec.skip, cancel).await {
        CallOutcome::Success(ex) => DispatchOutcome {
            detail: detail_from(procedure.operation_id, DetailStatus::Completed, &ex),
            suspended: false,
        },
        CallOutcome::Definite(ex) => DispatchOutcome {
            detail: detail_from(procedure.operation_id, DetailStatus::Failed, &ex),
            suspended: false,
        },
        CallOutcome::Exhausted(ex) => DispatchOutcome {
            detail: detail_from(procedure.operation_id, DetailStatus::Failed, &ex),
            suspended: true,
        },
        CallOutcome::Canceled => canceled(procedure.operation_id),
    }
}

// ---------------------------------------------------------------------------
// boot
// ---------------------------------------------------------------------------

/// `PUT …/devices/{deviceID}/power-operation` `{action:"on"}`, then poll
/// `GET …/devices/{deviceID}/os-boot` until the OS reports up. The polling
/// exchange is recorded in the `isOSBoot` sub-detail.
pub(crate) async fn boot(
    http: &reqwest::Client,
    hw: &HardwareControlSection,
    procedure: &Procedure,
    cancel: &CancellationToken,
) -> DispatchOutcome {
    let device = procedure.target_device_id.as_deref().unwrap_or_default();
    let endpoint = Endpoint {
        method: Method::PUT,
        uri: format!("{}/devices/{}/power-operation", hw.base_url(), device),
        body: Some(json!({"action": "on"})),
        timeout: Duration::from_secs(hw.boot.timeout),
    };

    let ex = match call_with_retry(http, &endpoint, 200, &hw.boot.retry, &hw.boot.skip, cancel).await
    {
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
        CallOutcome::Canceled => return canceled(procedure.operation_id),
    };

    let poll = Endpoint {
        method: Method::GET,
        uri: format!("{}/devices/{}/os-boot", hw.base_url(), device),
        body: None,
        timeout: Duration::from_secs(hw.isosboot.timeout),
    };
    let os_up = |status: u16, body: Option<&Value>| {
        status == 200
            && body
                .and_then(|b| b.get("status"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
    };

    match poll_until(http, &poll, &hw.isosboot.polling, os_up, cancel).await {
        PollOutcome::Achieved(poll_ex) => {
            let mut detail = detail_from(procedure.operation_id, DetailStatus::Completed, &ex);
            detail.is_os_boot = Some(sub_detail(&poll_ex, false));
            DispatchOutcome {
                detail,
                suspended: false,
            }
        }
        PollOutcome::Definite(poll_ex) => {
            let mut detail = detail_from(procedure.operation_id, DetailStatus::Failed, &ex);
            detail.is_os_boot = Some(sub_detail(&poll_ex, true));
            DispatchOutcome {
                detail,
                suspended: false,
            }
        }
        PollOutcome::Exhausted(poll_ex) => {
            let mut detail = detail_from(procedure.operation_id, DetailStatus::Failed, &ex);
            detail.is_os_boot = Some(sub_detail(&poll_ex, true));
            DispatchOutcome {
                detail,
                suspended: true,
            }
        }
        PollOutcome::Canceled => canceled(procedure.operation_id),
    }
}

// ---------------------------------------------------------------------------
// shutdown
// ---------------------------------------------------------------------------

/// `PUT …/devices/{deviceID}/power-operation` `{action:"off"}`, then poll
/// `GET …/devices/{deviceID}/device-info` until `powerState` reads `Off`.
/// The polling response is recorded in the `getInformation` sub-detail.
pub(crate) async fn shutdown(
    http: &reqwest::Client,
    hw: &HardwareControlSection,
    info: &GetInformationSection,
    procedure: &Procedure,
    cancel: &CancellationToken,
) -> DispatchOutcome {
    let device = procedure.target_device_id.as_deref().unwrap_or_default();
    let endpoint = Endpoint {
        method: Method::PUT,
        uri: format!("{}/devices/{}/power-operation", hw.base_url(), device),
        body: Some(json!({"action": "off"})),
        timeout: Duration::from_secs(hw.shutdown.timeout),
    };

    let ex = match call_with_retry(
        http,
        &endpoint,
        200,
        &hw.shutdown.retry,
        &hw.shutdown.skip,
        cancel,
    )
    .await
    {
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
        CallOutcome::Canceled => return canceled(procedure.operation_id),
    };

    let poll = Endpoint {
        method: Method::GET,
        uri: format!("{}/devices/{}/device-info", info.base_url(), device),
        body: None,
        timeout: Duration::from_secs(info.timeout),
    };
    let powered_off = |status: u16, body: Option<&Value>| {
        status == 200
            && body
                .and_then(|b| b.get("powerState"))
                .and_then(Value::as_str)
                .is_some_and(|s| s == "Off")
    };

    match poll_until(http, &poll, &info.polling, powered_off, cancel).await {
        PollOutcome::Achieved(poll_ex) => {
            let mut detail = detail_from(procedure.operation_id, DetailStatus::Completed, &ex);
            detail.get_information = Some(sub_detail(&poll_ex, true));
            DispatchOutcome {
                detail,
                suspended: false,
            }
        }
        PollOutcome::Definite(poll_ex) => {
            let mut detail = detail_from(procedure.operation_id, DetailStatus::Failed, &ex);
            detail.get_information = Some(sub_detail(&poll_ex, true));
            DispatchOutcome {
                detail,
                suspended: false,
            }
        }
        PollOutcome::Exhausted(poll_ex) => {
            let mut detail = detail_from(procedure.operation_id, DetailStatus::Failed, &ex);
            detail.get_information = Some(sub_detail(&poll_ex, true));
            DispatchOutcome {
                detail,
                suspended: true,
            }
        }
        PollOutcome::Canceled => canceled(procedure.operation_id),
    }
}
