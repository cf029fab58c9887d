//! Runtime secret resolution.
//!
//! Config YAML may carry a development password, but deployments inject the
//! real one through the environment. This module is the single place that
//! reads secret env vars; nothing else in the workspace calls
//! `std::env::var` for credentials. Error/log paths reference variable
//! NAMES, never values.

use crate::sections::LayoutApplyConfig;

/// Env var holding the apply-state store password.
pub const ENV_DB_PASSWORD: &str = "LAP_DB_PASSWORD";

/// Overwrite secret-bearing fields from the environment when set.
pub fn apply_env_overrides(config: &mut LayoutApplyConfig) {
    if let Some(pw) = resolve_env(ENV_DB_PASSWORD) {
        config.db.password = pw;
    }
}

/// Resolve a named environment variable.
/// Returns `None` if the variable is unset or its value is blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}
