//! Listing with filters, ordering, pagination, and heavy-field projection.

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use sqlx::QueryBuilder;

use lap_schemas::{ApplyError, ApplyStatus};

use crate::record::{row_to_record, ApplyRecord};
use crate::{retrying, ApplyStore, TxError};

// ---------------------------------------------------------------------------
// Query model
// ---------------------------------------------------------------------------

/// Heavy JSON columns excluded from listings unless explicitly requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Procedures,
    ApplyResult,
    RollbackProcedures,
    RollbackResult,
    ResumeProcedures,
    ResumeResult,
}

impl Field {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Field::Procedures => "procedures",
            Field::ApplyResult => "applyresult",
            Field::RollbackProcedures => "rollbackprocedures",
            Field::RollbackResult => "rollbackresult",
            Field::ResumeProcedures => "resumeprocedures",
            Field::ResumeResult => "resumeresult",
        }
    }

    /// Parse the wire name used in the `fields` query parameter.
    pub fn parse(s: &str) -> Result<Self, ApplyError> {
        match s {
            "procedures" => Ok(Field::Procedures),
            "applyResult" => Ok(Field::ApplyResult),
            "rollbackProcedures" => Ok(Field::RollbackProcedures),
            "rollbackResult" => Ok(Field::RollbackResult),
            "resumeProcedures" => Ok(Field::ResumeProcedures),
            "resumeResult" => Ok(Field::ResumeResult),
            other => Err(ApplyError::Validation(format!("unknown field: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    StartedAt,
    EndedAt,
}

impl SortKey {
    fn column(&self) -> &'static str {
        match self {
            SortKey::StartedAt => "startedat",
            SortKey::EndedAt => "endedat",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ApplyError> {
        match s {
            "startedAt" => Ok(SortKey::StartedAt),
            "endedAt" => Ok(SortKey::EndedAt),
            other => Err(ApplyError::Validation(format!("unknown sort key: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ApplyError> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ApplyError::Validation(format!("unknown order: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub status: Option<ApplyStatus>,
    pub started_at_since: Option<DateTime<Utc>>,
    pub started_at_until: Option<DateTime<Utc>>,
    pub ended_at_since: Option<DateTime<Utc>>,
    pub ended_at_until: Option<DateTime<Utc>>,
    pub sort_by: SortKey,
    pub order: SortOrder,
    pub limit: Option<i64>,
    pub offset: i64,
    pub fields: Vec<Field>,
}

/// `count` is the page size actually returned; `total_count` ignores
/// limit/offset.
#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub count: usize,
    #[serde(rename = "totalCount")]
    pub total_count: i64,
    #[serde(rename = "applyResults")]
    pub applies: Vec<ApplyRecord>,
}

// ---------------------------------------------------------------------------
// Implementation
// ---------------------------------------------------------------------------

const PROJECTION: &str = "applyid, status, startedat, endedat, canceledat, executerollback, \
                          rollbackstatus, rollbackstartedat, rollbackendedat, suspendedat, resumedat";

fn push_filters(qb: &mut QueryBuilder<'_, sqlx::Postgres>, query: &ListQuery) {
    let mut first = true;
    let mut and = |qb: &mut QueryBuilder<'_, sqlx::Postgres>| {
        qb.push(if std::mem::take(&mut first) {
            " WHERE "
        } else {
            " AND "
        });
    };

    if let Some(status) = query.status {
        and(qb);
        qb.push("status = ").push_bind(status.as_str());
    }
    if let Some(since) = query.started_at_since {
        and(qb);
        qb.push("startedat >= ").push_bind(since);
    }
    if let Some(until) = query.started_at_until {
        and(qb);
        qb.push("startedat <= ").push_bind(until);
    }
    if let Some(since) = query.ended_at_since {
        and(qb);
        qb.push("endedat >= ").push_bind(since);
    }
    if let Some(until) = query.ended_at_until {
        and(qb);
        qb.push("endedat <= ").push_bind(until);
    }
}

impl ApplyStore {
    /// List apply records matching the filters.
    ///
    /// Heavy JSON columns are only selected when named in `fields`; on the
    /// returned records the unselected ones are `None`.
    pub async fn list(&self, query: &ListQuery) -> Result<ListResult, ApplyError> {
        retrying("list", || self.try_list(query).boxed()).await
    }

    async fn try_list(&self, query: &ListQuery) -> Result<ListResult, TxError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM applystatus");
        push_filters(&mut count_qb, query);
        let (total_count,): (i64,) = count_qb.build_query_as().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PROJECTION);
        for field in &query.fields {
            qb.push(", ");
            qb.push(field.column());
        }
        qb.push(" FROM applystatus");
        push_filters(&mut qb, query);
        qb.push(" ORDER BY ");
        qb.push(query.sort_by.column());
        qb.push(" ");
        qb.push(query.order.sql());
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if query.offset > 0 {
            qb.push(" OFFSET ").push_bind(query.offset);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut applies = Vec::with_capacity(rows.len());
        for row in &rows {
            applies.push(row_to_record(row)?);
        }

        Ok(ListResult {
            count: applies.len(),
            total_count,
            applies,
        })
    }
}
