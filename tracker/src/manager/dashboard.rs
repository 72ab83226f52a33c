//! Aggregates for the admin and supervisor dashboards.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use uuid::Uuid;

use crate::entity::{EventStatus, MilestoneStatus, Role, event, milestone, progress_report, user};
use crate::error::AppError;
use crate::policy::StaffOnly;
use crate::views::{
    Activity, DashboardStats, DeadlineDetails, DeadlineItem, EventProgressSummary,
    EventStatusCounts, EventRef, MilestoneRef, ProgressSummary, UserRef,
};

use super::{events::summaries, events_by_id, milestones_by_id, users_by_id};

const DEADLINE_WINDOW_DAYS: i64 = 7;
const MAX_LIMIT: u64 = 100;
pub const DEFAULT_SUMMARY_LIMIT: u64 = 10;
pub const DEFAULT_ACTIVITY_LIMIT: u64 = 20;

const STATUSES: [EventStatus; 4] = [
    EventStatus::Planning,
    EventStatus::OnProgress,
    EventStatus::Completed,
    EventStatus::Cancelled,
];

fn clamp_limit(limit: Option<u64>, default: u64) -> u64 {
    limit.unwrap_or(default).clamp(1, MAX_LIMIT)
}

async fn status_counts(db: &DatabaseConnection) -> Result<EventStatusCounts, AppError> {
    let mut counts = EventStatusCounts::default();
    for status in STATUSES {
        let n = event::Entity::find()
            .filter(event::Column::IsActive.eq(true))
            .filter(event::Column::Status.eq(status))
            .count(db)
            .await?;
        match status {
            EventStatus::Planning => counts.planning = n,
            EventStatus::OnProgress => counts.on_progress = n,
            EventStatus::Completed => counts.completed = n,
            EventStatus::Cancelled => counts.cancelled = n,
        }
        counts.total += n;
    }
    Ok(counts)
}

fn open_events() -> sea_orm::Select<event::Entity> {
    let open: Vec<EventStatus> = STATUSES.into_iter().filter(EventStatus::is_open).collect();
    event::Entity::find()
        .filter(event::Column::IsActive.eq(true))
        .filter(event::Column::Status.is_in(open))
}

/// Open events due within the next week (soonest first) and open events
/// already past their end date (most recent first), relative to `today`.
async fn deadlines(db: &DatabaseConnection, today: NaiveDate) -> Result<DeadlineDetails, AppError> {
    let horizon = today + Duration::days(DEADLINE_WINDOW_DAYS);
    let near = open_events()
        .filter(event::Column::EndDate.gte(today))
        .filter(event::Column::EndDate.lte(horizon))
        .order_by_asc(event::Column::EndDate)
        .all(db)
        .await?;
    let overdue = open_events()
        .filter(event::Column::EndDate.lt(today))
        .order_by_desc(event::Column::EndDate)
        .all(db)
        .await?;

    Ok(DeadlineDetails {
        events_near_deadline: near.into_iter().map(DeadlineItem::from).collect(),
        overdue_events: overdue.into_iter().map(DeadlineItem::from).collect(),
    })
}

pub async fn stats(db: &DatabaseConnection, _staff: &StaffOnly) -> Result<DashboardStats, AppError> {
    let events = status_counts(db).await?;
    let active_petugas = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Petugas))
        .filter(user::Column::IsActive.eq(true))
        .count(db)
        .await?;
    let total_progress_reports = progress_report::Entity::find()
        .filter(progress_report::Column::IsActive.eq(true))
        .count(db)
        .await?;
    let details = deadlines(db, Utc::now().date_naive()).await?;

    Ok(DashboardStats {
        events,
        active_petugas,
        total_progress_reports,
        events_near_deadline: details.events_near_deadline.len(),
        overdue_events: details.overdue_events.len(),
        details,
    })
}

/// Milestone completion is the share of completed active milestones. Overall
/// progress averages it with the latest report's percentage, or is just the
/// latest percentage when the event has no milestones.
pub(crate) fn progress_summary(statuses: &[MilestoneStatus], latest: Option<i32>) -> ProgressSummary {
    let total = statuses.len();
    let completed = statuses
        .iter()
        .filter(|s| **s == MilestoneStatus::Completed)
        .count();
    let latest = latest.unwrap_or(0);
    let milestone_pct = if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let overall = if total > 0 {
        ((milestone_pct + f64::from(latest)) / 2.0).round() as i64
    } else {
        i64::from(latest)
    };

    ProgressSummary {
        milestone_progress: milestone_pct.round() as i64,
        latest_progress_percentage: latest,
        overall_progress: overall,
        completed_milestones: completed,
        total_milestones: total,
    }
}

pub async fn events_summary(
    db: &DatabaseConnection,
    _staff: &StaffOnly,
    status: Option<&str>,
    limit: Option<u64>,
) -> Result<Vec<EventProgressSummary>, AppError> {
    let mut query = event::Entity::find().filter(event::Column::IsActive.eq(true));
    if let Some(raw) = status.map(str::trim).filter(|s| !s.is_empty()) {
        let status = EventStatus::parse(raw).ok_or_else(|| {
            AppError::invalid(
                "status",
                "Status must be one of planning, on_progress, completed, cancelled",
            )
        })?;
        query = query.filter(event::Column::Status.eq(status));
    }
    let rows = query
        .order_by_desc(event::Column::CreatedAt)
        .order_by_desc(event::Column::Id)
        .limit(clamp_limit(limit, DEFAULT_SUMMARY_LIMIT))
        .all(db)
        .await?;
    let ids: Vec<Uuid> = rows.iter().map(|e| e.id).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut statuses: HashMap<Uuid, Vec<MilestoneStatus>> = HashMap::new();
    for m in milestone::Entity::find()
        .filter(milestone::Column::EventId.is_in(ids.clone()))
        .filter(milestone::Column::IsActive.eq(true))
        .all(db)
        .await?
    {
        statuses.entry(m.event_id).or_default().push(m.status);
    }

    let mut latest: HashMap<Uuid, i32> = HashMap::new();
    for r in progress_report::Entity::find()
        .filter(progress_report::Column::EventId.is_in(ids))
        .filter(progress_report::Column::IsActive.eq(true))
        .order_by_desc(progress_report::Column::ReportDate)
        .order_by_desc(progress_report::Column::CreatedAt)
        .all(db)
        .await?
    {
        latest.entry(r.event_id).or_insert(r.progress_percentage);
    }

    Ok(summaries(db, rows)
        .await?
        .into_iter()
        .map(|s| {
            let id = s.event.id;
            let progress = progress_summary(
                statuses.get(&id).map(Vec::as_slice).unwrap_or_default(),
                latest.get(&id).copied(),
            );
            EventProgressSummary {
                event: s.event,
                creator: s.creator,
                officers: s.officers,
                report_count: s.report_count,
                progress,
            }
        })
        .collect())
}

/// Latest active progress reports, newest first, as activity feed items.
pub async fn recent_activities(
    db: &DatabaseConnection,
    _staff: &StaffOnly,
    limit: Option<u64>,
) -> Result<Vec<Activity>, AppError> {
    let reports = progress_report::Entity::find()
        .filter(progress_report::Column::IsActive.eq(true))
        .order_by_desc(progress_report::Column::CreatedAt)
        .order_by_desc(progress_report::Column::Id)
        .limit(clamp_limit(limit, DEFAULT_ACTIVITY_LIMIT))
        .all(db)
        .await?;

    let users = users_by_id(db, reports.iter().map(|r| r.officer_id)).await?;
    let events = events_by_id(db, reports.iter().map(|r| r.event_id)).await?;
    let milestones = milestones_by_id(db, reports.iter().filter_map(|r| r.milestone_id)).await?;

    Ok(reports
        .into_iter()
        .map(|r| {
            let event = events.get(&r.event_id);
            Activity {
                id: r.id,
                kind: "progress_report",
                title: format!(
                    "Progress report for {}",
                    event.map(|e| e.name.as_str()).unwrap_or("unknown event")
                ),
                description: r.description,
                user: users.get(&r.officer_id).map(UserRef::from),
                event: event.map(EventRef::from),
                milestone: r
                    .milestone_id
                    .and_then(|id| milestones.get(&id))
                    .map(MilestoneRef::from),
                progress_percentage: r.progress_percentage,
                report_date: r.report_date,
                created_at: r.created_at,
            }
        })
        .collect())
}
