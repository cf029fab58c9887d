//! Subcommand implementations.
//!
//! The CLI drives applies synchronously: `start` and `resume` run the
//! scheduler inline and print the final record once the run terminates,
//! which makes them scriptable without polling.

use std::sync::Arc;

use anyhow::{Context, Result};

use lap_config::LayoutApplyConfig;
use lap_db::{ApplyStore, ListQuery, ResumeTrack, WorkerIdentity};
use lap_engine::{Action, Scheduler, StateStore};
use lap_hwctl::HttpDispatcher;
use lap_schemas::{validate_plan, ApplyStatus, Plan};

pub fn load_config(paths: &[String]) -> Result<LayoutApplyConfig> {
    if paths.is_empty() {
        return Ok(LayoutApplyConfig::default());
    }
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    lap_config::load(&refs)
}

async fn connect(config: &LayoutApplyConfig) -> Result<Arc<ApplyStore>> {
    Ok(Arc::new(ApplyStore::connect(&config.db).await?))
}

fn scheduler(
    config: &LayoutApplyConfig,
    store: &Arc<ApplyStore>,
    apply_id: &str,
) -> Scheduler {
    let state_store: Arc<dyn StateStore> = store.clone();
    let dispatcher = Arc::new(HttpDispatcher::new(Arc::new(config.clone())));
    Scheduler::new(
        state_store,
        dispatcher,
        apply_id,
        config.layout_apply.request.max_workers,
    )
}

async fn print_record(store: &ApplyStore, apply_id: &str) -> Result<()> {
    let record = store.get(apply_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn start(config: &LayoutApplyConfig, plan_path: &str) -> Result<()> {
    let raw = std::fs::read_to_string(plan_path)
        .with_context(|| format!("read plan file: {plan_path}"))?;
    let plan: Plan = serde_json::from_str(&raw).context("parse plan JSON")?;
    validate_plan(&plan)?;

    let store = connect(config).await?;
    let apply_id = store.register(&plan).await?;
    store
        .record_worker(&apply_id, &WorkerIdentity::current())
        .await?;
    eprintln!("applyID={apply_id}");

    scheduler(config, &store, &apply_id)
        .run(plan.procedures, Action::Request)
        .await;
    print_record(&store, &apply_id).await
}

pub async fn get(config: &LayoutApplyConfig, apply_id: &str) -> Result<()> {
    let store = connect(config).await?;
    print_record(&store, apply_id).await
}

pub async fn list(
    config: &LayoutApplyConfig,
    status: Option<String>,
    limit: Option<i64>,
    offset: i64,
    fields: Option<String>,
) -> Result<()> {
    let store = connect(config).await?;
    let mut query = ListQuery {
        limit,
        offset,
        ..Default::default()
    };
    if let Some(status) = status {
        query.status = Some(ApplyStatus::parse(&status)?);
    }
    if let Some(fields) = fields {
        for name in fields.split(',').filter(|s| !s.is_empty()) {
            query.fields.push(lap_db::Field::parse(name.trim())?);
        }
    }
    let result = store.list(&query).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn cancel(config: &LayoutApplyConfig, apply_id: &str, rollback: bool) -> Result<()> {
    let store = connect(config).await?;
    let outcome = store.request_cancel(apply_id, rollback).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": outcome.status.as_str(),
            "rollbackStatus": outcome.rollback_status.map(|s| s.as_str()),
        }))?
    );
    Ok(())
}

pub async fn resume(config: &LayoutApplyConfig, apply_id: &str) -> Result<()> {
    let store = connect(config).await?;
    let outcome = store.request_resume(apply_id).await?;

    // Already-resolved records echo their status pair; there is nothing to
    // re-run.
    let Some(track) = outcome.track else {
        eprintln!("nothing to resume; apply already resolved");
        return print_record(&store, apply_id).await;
    };

    store
        .record_worker(apply_id, &WorkerIdentity::current())
        .await?;

    let record = store.get(apply_id).await?;
    let plan = record.resume_procedures.unwrap_or_default();
    let action = match track {
        ResumeTrack::Apply => Action::Resume,
        ResumeTrack::Rollback => Action::RollbackResume,
    };

    scheduler(config, &store, apply_id).run(plan, action).await;
    print_record(&store, apply_id).await
}

pub async fn delete(config: &LayoutApplyConfig, apply_id: &str) -> Result<()> {
    let store = connect(config).await?;
    store.delete(apply_id).await?;
    println!("deleted={apply_id}");
    Ok(())
}

pub async fn migrate(config: &LayoutApplyConfig) -> Result<()> {
    let store = connect(config).await?;
    store.migrate().await?;
    println!("migrations_applied=true");
    Ok(())
}
