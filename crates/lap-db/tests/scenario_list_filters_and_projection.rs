//! Listing: status/time filters, ordering, pagination, and heavy-field
//! projection. `totalCount` is pre-limit; `count` is the returned page size.

use std::sync::Mutex;

use chrono::{Duration, Utc};
use lap_db::{ApplyStore, Field, ListQuery, SortKey, SortOrder};
use lap_schemas::ApplyStatus;

static DB_LOCK: Mutex<()> = Mutex::new(());

/// Insert a terminal row directly; listings must not depend on the
/// single-writer invariant.
async fn insert_row(
    store: &ApplyStore,
    apply_id: &str,
    status: ApplyStatus,
    started_offset_min: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO applystatus (applyid, status, procedures, applyresult, startedat, endedat)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(apply_id)
    .bind(status.as_str())
    .bind(serde_json::json!({"procedures": []}))
    .bind(serde_json::json!([{"operationID": 1, "status": "COMPLETED"}]))
    .bind(Utc::now() - Duration::minutes(started_offset_min))
    .bind(Utc::now())
    .execute(store.pool())
    .await?;
    Ok(())
}

fn test_id(n: u32) -> String {
    // Fixed prefix keeps cleanup targeted; suffix keeps rows unique.
    format!("feed00{n:04x}")
}

async fn cleanup(store: &ApplyStore) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM applystatus WHERE applyid LIKE 'feed00%'")
        .execute(store.pool())
        .await?;
    Ok(())
}

#[tokio::test]
async fn list_filters_orders_and_projects() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if std::env::var(lap_db::ENV_DB_URL).is_err() {
        eprintln!("SKIP: {} not set", lap_db::ENV_DB_URL);
        return Ok(());
    }

    let store = ApplyStore::connect_from_env().await?;
    store.migrate().await?;
    cleanup(&store).await?;

    insert_row(&store, &test_id(1), ApplyStatus::Completed, 30).await?;
    insert_row(&store, &test_id(2), ApplyStatus::Completed, 20).await?;
    insert_row(&store, &test_id(3), ApplyStatus::Failed, 10).await?;

    // Status filter with pre-limit totalCount.
    let result = store
        .list(&ListQuery {
            status: Some(ApplyStatus::Completed),
            started_at_since: Some(Utc::now() - Duration::hours(1)),
            sort_by: SortKey::StartedAt,
            order: SortOrder::Asc,
            limit: Some(1),
            ..Default::default()
        })
        .await?;
    assert_eq!(result.count, 1);
    assert_eq!(result.total_count, 2);
    assert_eq!(result.applies[0].apply_id, test_id(1), "ASC: oldest first");

    // Descending order flips the page.
    let result = store
        .list(&ListQuery {
            status: Some(ApplyStatus::Completed),
            started_at_since: Some(Utc::now() - Duration::hours(1)),
            sort_by: SortKey::StartedAt,
            order: SortOrder::Desc,
            limit: Some(1),
            ..Default::default()
        })
        .await?;
    assert_eq!(result.applies[0].apply_id, test_id(2));

    // Offset paginates past the first row.
    let result = store
        .list(&ListQuery {
            status: Some(ApplyStatus::Completed),
            started_at_since: Some(Utc::now() - Duration::hours(1)),
            sort_by: SortKey::StartedAt,
            order: SortOrder::Asc,
            limit: Some(5),
            offset: 1,
            ..Default::default()
        })
        .await?;
    assert_eq!(result.count, 1);
    assert_eq!(result.total_count, 2);
    assert_eq!(result.applies[0].apply_id, test_id(2));

    // Heavy fields stay out of the projection unless named.
    let slim = store
        .list(&ListQuery {
            status: Some(ApplyStatus::Failed),
            ..Default::default()
        })
        .await?;
    assert!(slim.applies[0].apply_result.is_none());
    assert!(slim.applies[0].procedures.is_none());

    let fat = store
        .list(&ListQuery {
            status: Some(ApplyStatus::Failed),
            fields: vec![Field::ApplyResult],
            ..Default::default()
        })
        .await?;
    assert_eq!(
        fat.applies[0]
            .apply_result
            .as_ref()
            .map(|details| details.len()),
        Some(1)
    );
    assert!(fat.applies[0].procedures.is_none(), "unrequested field");

    cleanup(&store).await?;
    Ok(())
}
