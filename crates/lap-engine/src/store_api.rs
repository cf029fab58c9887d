//! The store surface the scheduler needs, as a seam.
//!
//! The production implementation is [`lap_db::ApplyStore`]; scenario tests
//! drive the scheduler against an in-memory stand-in.

use async_trait::async_trait;

use lap_db::{ApplyStore, CurrentStatus, FinalUpdate, ResultTrack};
use lap_schemas::{ApplyError, ApplyStatus, Detail, Procedure};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Lightweight cancel poll (status + executeRollback).
    async fn get_current(&self, apply_id: &str) -> Result<CurrentStatus, ApplyError>;

    /// End-of-run write of terminal status, results, and synthesized plans.
    async fn update(&self, update: &FinalUpdate) -> Result<(), ApplyError>;

    /// Mark the rollback track started and persist its plan.
    async fn update_rollback_status(
        &self,
        apply_id: &str,
        status: ApplyStatus,
        procedures: Option<&[Procedure]>,
    ) -> Result<(), ApplyError>;

    /// Incremental per-batch result write on the given track.
    async fn update_result(
        &self,
        apply_id: &str,
        details: &[Detail],
        track: ResultTrack,
    ) -> Result<(), ApplyError>;
}

#[async_trait]
impl StateStore for ApplyStore {
    async fn get_current(&self, apply_id: &str) -> Result<CurrentStatus, ApplyError> {
        ApplyStore::get_current(self, apply_id).await
    }

    async fn update(&self, update: &FinalUpdate) -> Result<(), ApplyError> {
        ApplyStore::update(self, update).await
    }

    async fn update_rollback_status(
        &self,
        apply_id: &str,
        status: ApplyStatus,
        procedures: Option<&[Procedure]>,
    ) -> Result<(), ApplyError> {
        ApplyStore::update_rollback_status(self, apply_id, status, procedures).await
    }

    async fn update_result(
        &self,
        apply_id: &str,
        details: &[Detail],
        track: ResultTrack,
    ) -> Result<(), ApplyError> {
        ApplyStore::update_result(self, apply_id, details, track).await
    }
}
