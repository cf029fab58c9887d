//! Shared daemon state.

use std::sync::Arc;

use lap_db::ApplyStore;
use lap_engine::Orchestrator;

/// Compile-time build identity, reported by the health endpoint.
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        BuildInfo {
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

pub struct AppState {
    pub store: Arc<ApplyStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(store: Arc<ApplyStore>, orchestrator: Arc<Orchestrator>) -> Self {
        AppState {
            store,
            orchestrator,
            build: BuildInfo::current(),
        }
    }
}
