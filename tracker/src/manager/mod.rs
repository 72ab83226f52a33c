//! Resource lifecycle managers. Each operation takes the store handle, the
//! capability proving the caller passed its gate, and typed input; it returns
//! a materialized view from [`crate::views`].

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
    Select, sea_query::Expr,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entity::{event, milestone, progress_report, user};
use crate::error::{AppError, Violations};
use crate::views::{EventRef, MilestoneRef, ProgressResponse, ProgressView, UserRef};

pub mod assignments;
pub mod dashboard;
pub mod events;
pub mod milestones;
pub mod progress;
pub mod users;

// ---------- pagination ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u64 = 10;
    pub const MAX_LIMIT: u64 = 100;

    /// 1-based page; limit clamped to `1..=MAX_LIMIT`.
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, req: PageRequest, total: u64) -> Self {
        Self {
            items,
            page: req.page,
            limit: req.limit,
            total,
            total_pages: total.div_ceil(req.limit),
        }
    }
}

/// Run `query` through SeaORM's paginator, returning one page and the total.
pub(crate) async fn fetch_page<E>(
    db: &DatabaseConnection,
    query: Select<E>,
    req: PageRequest,
) -> Result<(Vec<E::Model>, u64), AppError>
where
    E: EntityTrait,
    E::Model: Sync,
{
    let paginator = query.paginate(db, req.limit);
    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(req.page - 1).await?;
    Ok((rows, total))
}

// ---------- hydration ----------

fn unique(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    ids.into_iter().collect::<HashSet<_>>().into_iter().collect()
}

pub(crate) async fn users_by_id(
    db: &DatabaseConnection,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, user::Model>, AppError> {
    let ids = unique(ids);
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|u| (u.id, u)).collect())
}

pub(crate) async fn events_by_id(
    db: &DatabaseConnection,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, event::Model>, AppError> {
    let ids = unique(ids);
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = event::Entity::find()
        .filter(event::Column::Id.is_in(ids))
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|e| (e.id, e)).collect())
}

pub(crate) async fn milestones_by_id(
    db: &DatabaseConnection,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, milestone::Model>, AppError> {
    let ids = unique(ids);
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = milestone::Entity::find()
        .filter(milestone::Column::Id.is_in(ids))
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|m| (m.id, m)).collect())
}

/// Count active progress reports grouped by `group_col` for the given keys.
pub(crate) async fn active_report_counts(
    db: &DatabaseConnection,
    group_col: progress_report::Column,
    keys: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, u64>, AppError> {
    let keys = unique(keys);
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, i64)> = progress_report::Entity::find()
        .select_only()
        .column(group_col)
        .column_as(Expr::col(progress_report::Column::Id).count(), "count")
        .filter(progress_report::Column::IsActive.eq(true))
        .filter(group_col.is_in(keys))
        .group_by(group_col)
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(id, n)| (id, n.max(0) as u64))
        .collect())
}

/// Attach officer, milestone and event identities to a batch of reports,
/// preserving input order.
pub(crate) async fn progress_views(
    db: &DatabaseConnection,
    reports: Vec<progress_report::Model>,
) -> Result<Vec<ProgressView>, AppError> {
    let users = users_by_id(db, reports.iter().map(|r| r.officer_id)).await?;
    let milestones = milestones_by_id(db, reports.iter().filter_map(|r| r.milestone_id)).await?;
    let events = events_by_id(db, reports.iter().map(|r| r.event_id)).await?;

    reports
        .into_iter()
        .map(|r| {
            let officer = users.get(&r.officer_id).map(UserRef::from);
            let milestone = r
                .milestone_id
                .and_then(|id| milestones.get(&id))
                .map(MilestoneRef::from);
            let event = events.get(&r.event_id).map(EventRef::from);
            Ok(ProgressView {
                report: ProgressResponse::try_from(r)?,
                officer,
                milestone,
                event,
            })
        })
        .collect()
}

/// Load an active event or fail with NotFound.
pub(crate) async fn active_event(db: &DatabaseConnection, id: Uuid) -> Result<event::Model, AppError> {
    event::Entity::find_by_id(id)
        .filter(event::Column::IsActive.eq(true))
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Event not found"))
}

/// Trim a text input, mapping blank to `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn search_term(search: Option<&str>) -> Option<String> {
    search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Parse a calendar date given as `YYYY-MM-DD` or as an RFC 3339 timestamp,
/// recording a violation on failure.
pub(crate) fn parse_date(field: &'static str, raw: &str, v: &mut Violations) -> Option<NaiveDate> {
    let raw = raw.trim();
    let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).date_naive())
    });
    if parsed.is_none() {
        v.add(field, "date", format!("{field} must be a date (YYYY-MM-DD)"));
    }
    parsed
}

/// Parse an optional id sent as text. Blank means absent.
pub(crate) fn parse_id(field: &'static str, raw: Option<&str>, v: &mut Violations) -> Option<Uuid> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let parsed = Uuid::parse_str(raw).ok();
    if parsed.is_none() {
        v.add(field, "uuid", format!("{field} must be a valid UUID"));
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(0)), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::new(Some(3), Some(1000)).limit, 100);
    }

    #[test]
    fn total_pages_rounds_up() {
        let req = PageRequest::new(Some(1), Some(10));
        assert_eq!(Page::<u8>::new(vec![], req, 0).total_pages, 0);
        assert_eq!(Page::<u8>::new(vec![], req, 10).total_pages, 1);
        assert_eq!(Page::<u8>::new(vec![], req, 11).total_pages, 2);
    }

    #[test]
    fn parse_date_accepts_plain_and_rfc3339() {
        let mut v = Violations::default();
        assert_eq!(
            parse_date("report_date", "2026-03-01", &mut v),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(
            parse_date("report_date", "2026-03-01T10:00:00Z", &mut v),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert!(v.finish().is_ok());

        let mut v = Violations::default();
        assert_eq!(parse_date("deadline", "01/03/2026", &mut v), None);
        let err = v.finish().unwrap_err();
        assert_eq!(err.field_errors()[0].field, "deadline");
    }

    #[test]
    fn parse_id_blank_is_absent() {
        let mut v = Violations::default();
        assert_eq!(parse_id("milestone_id", Some("  "), &mut v), None);
        assert_eq!(parse_id("milestone_id", None, &mut v), None);
        assert!(v.finish().is_ok());

        let mut v = Violations::default();
        assert_eq!(parse_id("milestone_id", Some("nope"), &mut v), None);
        assert!(v.finish().is_err());
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" x ".into())), Some("x".into()));
    }
}
