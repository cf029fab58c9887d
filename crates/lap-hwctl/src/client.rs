//! Request machinery shared by every operation: one-exchange send, the
//! retry loop, and the polling loop.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lap_config::policy::{matches_skip, PollingPolicy, RetryPolicy, SkipTarget};

// ---------------------------------------------------------------------------
// Exchange model
// ---------------------------------------------------------------------------

/// One fully described request to issue.
pub(crate) struct Endpoint {
    pub method: Method,
    pub uri: String,
    /// JSON body; `None` for GET.
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// What the last attempt looked like; this is what gets recorded in the
/// Detail regardless of how many retries preceded it.
#[derive(Debug, Clone)]
pub(crate) struct Exchange {
    pub uri: String,
    pub method: String,
    pub request_body: Option<Value>,
    pub status_code: Option<u16>,
    pub response_body: Option<Value>,
}

enum Attempt {
    Response { status: u16, body: Option<Value> },
    /// Connection error or request timeout: retry-eligible infrastructure
    /// failure.
    Transport(String),
}

async fn send(http: &reqwest::Client, endpoint: &Endpoint) -> Attempt {
    let mut req = http
        .request(endpoint.method.clone(), &endpoint.uri)
        .timeout(endpoint.timeout);
    if let Some(body) = &endpoint.body {
        req = req.json(body);
    }
    match req.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let body = resp.json::<Value>().await.ok();
            Attempt::Response { status, body }
        }
        Err(e) => { eprintln!("DEBUG transport error for {}: {e:?}", endpoint.uri); Attempt::Transport(e.to_string()) },
    }
}

/// The remote's application-level error code, when the body carries one.
fn error_code(body: Option<&Value>) -> Option<&str> {
    body.and_then(|b| b.get("code")).and_then(Value::as_str)
}

fn exchange(endpoint: &Endpoint, status_code: Option<u16>, response_body: Option<Value>) -> Exchange {
    Exchange {
        uri: endpoint.uri.clone(),
        method: endpoint.method.as_str().to_string(),
        request_body: endpoint.body.clone(),
        status_code,
        response_body,
    }
}

/// Sleep the given interval unless the cancel token fires first.
/// Returns `false` on cancellation.
async fn sleep_or_cancel(secs: u64, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(Duration::from_secs(secs)) => true,
    }
}

// ---------------------------------------------------------------------------
// Retry loop
// ---------------------------------------------------------------------------

pub(crate) enum CallOutcome {
    /// Success code, or a configured skip pair (success-equivalent).
    Success(Exchange),
    /// Definite error: not retryable, not skip-eligible.
    Definite(Exchange),
    /// Retry schedule ran out on a transient failure → suspend.
    Exhausted(Exchange),
    Canceled,
}

/// Issue the request, retrying per the policy tables.
///
/// Responses matching a retry target follow that target's schedule;
/// transport failures follow `retry.default` (no default → no retry).
/// Exhaustion of either schedule classifies as suspended.
pub(crate) async fn call_with_retry(
    http: &reqwest::Client,
    endpoint: &Endpoint,
    success_code: u16,
    retry: &RetryPolicy,
    skip: &[SkipTarget],
    cancel: &CancellationToken,
) -> CallOutcome {
    let mut infra_attempts = 0u32;
    let mut target_attempts: HashMap<usize, u32> = HashMap::new();

    loop {
        match send(http, endpoint).await {
            Attempt::Transport(message) => {
                let last = exchange(endpoint, None, None);
                match retry.infra() {
                    Some(schedule) if infra_attempts < schedule.max_count => {
                        infra_attempts += 1;
                        debug!(
                            uri = %endpoint.uri,
                            attempt = infra_attempts,
                            error = %message,
                            "transport failure; retrying"
                        );
                        if !sleep_or_cancel(schedule.interval, cancel).await {
                            return CallOutcome::Canceled;
                        }
                    }
                    _ => return CallOutcome::Exhausted(last),
                }
            }
            Attempt::Response { status, body } => {
                let code = error_code(body.as_ref()).map(str::to_string);
                let last = exchange(endpoint, Some(status), body);

                if status == success_code {
                    return CallOutcome::Success(last);
                }
                if matches_skip(skip, status, code.as_deref()) {
                    return CallOutcome::Success(last);
                }
                match retry.target_index_for(status, code.as_deref()) {
                    Some(idx) => {
                        let target = &retry.targets[idx];
                        let attempts = target_attempts.entry(idx).or_insert(0);
                        if *attempts >= target.max_count {
                            return CallOutcome::Exhausted(last);
                        }
                        *attempts += 1;
                        debug!(
                            uri = %endpoint.uri,
                            status,
                            attempt = *attempts,
                            "retryable response; retrying"
                        );
                        if !sleep_or_cancel(target.interval, cancel).await {
                            return CallOutcome::Canceled;
                        }
                    }
                    None => return CallOutcome::Definite(last),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Polling loop
// ---------------------------------------------------------------------------

pub(crate) enum PollOutcome {
    Achieved(Exchange),
    /// Poll budget ran out without reaching the goal → suspend.
    Exhausted(Exchange),
    /// A response that is neither the goal, in-progress, nor skip-eligible.
    Definite(Exchange),
    Canceled,
}

/// Poll a GET endpoint until `achieved` returns true, the budget runs out,
/// or a definite error arrives.
pub(crate) async fn poll_until(
    http: &reqwest::Client,
    endpoint: &Endpoint,
    policy: &PollingPolicy,
    achieved: impl Fn(u16, Option<&Value>) -> bool,
    cancel: &CancellationToken,
) -> PollOutcome {
    let mut last = exchange(endpoint, None, None);

    for attempt in 0..policy.count {
        match send(http, endpoint).await {
            Attempt::Transport(message) => {
                // Counts against the budget like an in-progress response.
                debug!(uri = %endpoint.uri, attempt, error = %message, "poll transport failure");
                last = exchange(endpoint, None, None);
            }
            Attempt::Response { status, body } => {
                let code = error_code(body.as_ref()).map(str::to_string);
                if achieved(status, body.as_ref()) {
                    return PollOutcome::Achieved(exchange(endpoint, Some(status), body));
                }
                if matches_skip(&policy.skip, status, code.as_deref()) {
                    return PollOutcome::Achieved(exchange(endpoint, Some(status), body));
                }
                let in_progress = policy.is_in_progress(status) || (200..300).contains(&status);
                last = exchange(endpoint, Some(status), body);
                if !in_progress {
                    return PollOutcome::Definite(last);
                }
            }
        }
        if attempt + 1 < policy.count && !sleep_or_cancel(policy.interval, cancel).await {
            return PollOutcome::Canceled;
        }
    }

    PollOutcome::Exhausted(last)
}
