//! Retry, skip, and polling policy tables.
//!
//! These are pure configuration data; the dispatcher interprets them. Which
//! status/error codes are retry-eligible, skip-eligible, or still-in-progress
//! is entirely decided here, never hard-coded in the client.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// One retryable response shape: a status code, optionally narrowed by the
/// error code carried in the response body, with its own schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryTarget {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_max_count")]
    pub max_count: u32,
}

/// Fallback schedule for retry-eligible infrastructure failures (request
/// timeout, connection error) that match no [`RetryTarget`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDefault {
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_max_count")]
    pub max_count: u32,
}

impl Default for RetryDefault {
    fn default() -> Self {
        RetryDefault {
            interval: default_interval(),
            max_count: default_max_count(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub targets: Vec<RetryTarget>,
    #[serde(default)]
    pub default: Option<RetryDefault>,
}

impl RetryTarget {
    pub fn matches(&self, status_code: u16, error_code: Option<&str>) -> bool {
        self.status_code == status_code
            && match (&self.code, error_code) {
                (None, _) => true,
                (Some(want), Some(got)) => want == got,
                (Some(_), None) => false,
            }
    }
}

impl RetryPolicy {
    /// Find the retry target matching a response, if any.
    pub fn target_for(&self, status_code: u16, error_code: Option<&str>) -> Option<&RetryTarget> {
        self.targets
            .iter()
            .find(|t| t.matches(status_code, error_code))
    }

    /// Index variant for callers tracking per-target attempt counts.
    pub fn target_index_for(&self, status_code: u16, error_code: Option<&str>) -> Option<usize> {
        self.targets
            .iter()
            .position(|t| t.matches(status_code, error_code))
    }

    /// The schedule for infrastructure failures; `None` means no retry.
    pub fn infra(&self) -> Option<&RetryDefault> {
        self.default.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Skip
// ---------------------------------------------------------------------------

/// A response treated as success-equivalent, used to bypass idempotent
/// pre-conditions (e.g. powering off a device that is already off).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipTarget {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,
}

pub fn matches_skip(skip: &[SkipTarget], status_code: u16, error_code: Option<&str>) -> bool {
    skip.iter().any(|s| {
        s.status_code == status_code
            && match (&s.code, error_code) {
                (None, _) => true,
                (Some(want), Some(got)) => want == got,
                (Some(_), None) => false,
            }
    })
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// A status code that means "still in progress" while polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingTarget {
    pub status_code: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingPolicy {
    #[serde(default = "default_poll_count")]
    pub count: u32,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    /// Status codes considered still-in-progress.
    #[serde(default)]
    pub targets: Vec<PollingTarget>,
    /// Error responses treated as already-achieved.
    #[serde(default)]
    pub skip: Vec<SkipTarget>,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        PollingPolicy {
            count: default_poll_count(),
            interval: default_poll_interval(),
            targets: Vec::new(),
            skip: Vec::new(),
        }
    }
}

impl PollingPolicy {
    pub fn is_in_progress(&self, status_code: u16) -> bool {
        self.targets.iter().any(|t| t.status_code == status_code)
    }
}

fn default_interval() -> u64 {
    5
}

fn default_max_count() -> u32 {
    5
}

fn default_poll_count() -> u32 {
    10
}

fn default_poll_interval() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_matches_status_and_code() {
        let policy = RetryPolicy {
            targets: vec![RetryTarget {
                status_code: 503,
                code: Some("ER005BAS001".into()),
                interval: 5,
                max_count: 3,
            }],
            default: None,
        };
        assert!(policy.target_for(503, Some("ER005BAS001")).is_some());
        assert!(policy.target_for(503, Some("OTHER")).is_none());
        assert!(policy.target_for(503, None).is_none());
        assert!(policy.target_for(500, Some("ER005BAS001")).is_none());
    }

    #[test]
    fn codeless_target_matches_any_body() {
        let policy = RetryPolicy {
            targets: vec![RetryTarget {
                status_code: 503,
                code: None,
                interval: 1,
                max_count: 1,
            }],
            default: None,
        };
        assert!(policy.target_for(503, None).is_some());
        assert!(policy.target_for(503, Some("ANY")).is_some());
    }

    #[test]
    fn skip_matching() {
        let skip = vec![SkipTarget {
            status_code: 400,
            code: Some("EF003BAS010".into()),
        }];
        assert!(matches_skip(&skip, 400, Some("EF003BAS010")));
        assert!(!matches_skip(&skip, 400, None));
        assert!(!matches_skip(&skip, 409, Some("EF003BAS010")));
    }

    #[test]
    fn polling_defaults_apply() {
        let p: PollingPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(p.count, 10);
        assert_eq!(p.interval, 1);
        assert!(p.targets.is_empty());
    }
}
