//! Per-operation result model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// DetailStatus
// ---------------------------------------------------------------------------

/// Outcome of one executed (or skipped) plan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailStatus {
    Completed,
    Failed,
    Skipped,
    Canceled,
}

impl DetailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailStatus::Completed => "COMPLETED",
            DetailStatus::Failed => "FAILED",
            DetailStatus::Skipped => "SKIPPED",
            DetailStatus::Canceled => "CANCELED",
        }
    }
}

// ---------------------------------------------------------------------------
// SubDetail
// ---------------------------------------------------------------------------

/// Evidence from a post-success polling exchange embedded in a [`Detail`]:
/// `isOSBoot` for boot, `getInformation` for shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubDetail {
    pub uri: String,
    pub method: String,
    #[serde(rename = "queryParameter", skip_serializing_if = "Option::is_none", default)]
    pub query_parameter: Option<Value>,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(rename = "responseBody", skip_serializing_if = "Option::is_none", default)]
    pub response_body: Option<Value>,
}

// ---------------------------------------------------------------------------
// Detail
// ---------------------------------------------------------------------------

/// Result of one plan node.
///
/// Execution evidence (uri, method, statusCode, timestamps, …) is present
/// only for statuses where a dispatch actually happened; `SKIPPED` and
/// `CANCELED` details carry the operationID and status alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    #[serde(rename = "operationID")]
    pub operation_id: i64,
    pub status: DetailStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub method: Option<String>,
    #[serde(rename = "queryParameter", skip_serializing_if = "Option::is_none", default)]
    pub query_parameter: Option<Value>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none", default)]
    pub request_body: Option<Value>,
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none", default)]
    pub status_code: Option<u16>,
    #[serde(rename = "responseBody", skip_serializing_if = "Option::is_none", default)]
    pub response_body: Option<Value>,
    #[serde(
        rename = "startedAt",
        with = "crate::ts",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "endedAt",
        with = "crate::ts",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub ended_at: Option<DateTime<Utc>>,
    /// Boot only: evidence from the os-boot polling exchange.
    #[serde(rename = "isOSBoot", skip_serializing_if = "Option::is_none", default)]
    pub is_os_boot: Option<SubDetail>,
    /// Shutdown only: evidence from the device-info polling exchange.
    #[serde(rename = "getInformation", skip_serializing_if = "Option::is_none", default)]
    pub get_information: Option<SubDetail>,
}

impl Detail {
    /// A detail with no execution evidence (`SKIPPED`/`CANCELED` entries).
    pub fn bare(operation_id: i64, status: DetailStatus) -> Self {
        Detail {
            operation_id,
            status,
            uri: None,
            method: None,
            query_parameter: None,
            request_body: None,
            status_code: None,
            response_body: None,
            started_at: None,
            ended_at: None,
            is_os_boot: None,
            get_information: None,
        }
    }
}
