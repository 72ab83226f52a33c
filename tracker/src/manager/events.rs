use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::entity::{EventStatus, event, event_assignment, milestone, progress_report};
use crate::error::{AppError, Violations};
use crate::policy::{self, AdminOnly, EventAccess, Identity};
use crate::views::{
    EventDetail, EventResponse, EventSummary, MilestoneResponse, MilestoneWithCount, UserRef,
};

use super::{
    Page, PageRequest, active_event, active_report_counts, assignments::assignment_views,
    fetch_page, non_blank, parse_date, progress_views, search_term, users_by_id,
};

const RECENT_REPORTS: u64 = 5;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEvent {
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub budget: Option<Decimal>,
    pub start_date: String,
    pub end_date: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEvent {
    pub name: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    /// Absent keeps the budget, `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub budget: Option<Option<Decimal>>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
}

/// Distinguishes an explicit `null` from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn parse_status(raw: &str, v: &mut Violations) -> Option<EventStatus> {
    let status = EventStatus::parse(raw);
    if status.is_none() {
        v.add(
            "status",
            "status",
            "Status must be one of planning, on_progress, completed, cancelled",
        );
    }
    status
}

fn check_dates(start: NaiveDate, end: NaiveDate, v: &mut Violations) {
    if end <= start {
        v.add("end_date", "range", "End date must be after the start date");
    }
}

fn check_budget(budget: Option<Decimal>, v: &mut Violations) {
    if budget.is_some_and(|b| b.is_sign_negative()) {
        v.add("budget", "range", "Budget must not be negative");
    }
}

/// Hydrate list items: creator, assigned officers, active milestones by
/// ordinal and active report count.
pub(crate) async fn summaries(
    db: &DatabaseConnection,
    events: Vec<event::Model>,
) -> Result<Vec<EventSummary>, AppError> {
    let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let assignments = event_assignment::Entity::find()
        .filter(event_assignment::Column::EventId.is_in(ids.clone()))
        .order_by_asc(event_assignment::Column::AssignedAt)
        .all(db)
        .await?;
    let users = users_by_id(
        db,
        events
            .iter()
            .map(|e| e.created_by)
            .chain(assignments.iter().map(|a| a.officer_id)),
    )
    .await?;

    let mut officers: HashMap<Uuid, Vec<UserRef>> = HashMap::new();
    for a in &assignments {
        if let Some(u) = users.get(&a.officer_id) {
            officers.entry(a.event_id).or_default().push(UserRef::from(u));
        }
    }

    let mut milestones: HashMap<Uuid, Vec<MilestoneResponse>> = HashMap::new();
    for m in milestone::Entity::find()
        .filter(milestone::Column::EventId.is_in(ids.clone()))
        .filter(milestone::Column::IsActive.eq(true))
        .order_by_asc(milestone::Column::Ordinal)
        .all(db)
        .await?
    {
        milestones.entry(m.event_id).or_default().push(MilestoneResponse::from(m));
    }

    let counts = active_report_counts(db, progress_report::Column::EventId, ids).await?;

    Ok(events
        .into_iter()
        .map(|e| EventSummary {
            creator: users.get(&e.created_by).map(UserRef::from),
            officers: officers.remove(&e.id).unwrap_or_default(),
            milestones: milestones.remove(&e.id).unwrap_or_default(),
            report_count: counts.get(&e.id).copied().unwrap_or(0),
            event: EventResponse::from(e),
        })
        .collect())
}

async fn summary(db: &DatabaseConnection, event: event::Model) -> Result<EventSummary, AppError> {
    summaries(db, vec![event])
        .await?
        .pop()
        .ok_or_else(|| AppError::internal("event summary missing"))
}

/// Active events visible to `viewer`, newest first. Officers only ever see
/// events they are assigned to, whatever the filters say.
pub async fn list(
    db: &DatabaseConnection,
    viewer: &Identity,
    filter: EventFilter,
    req: PageRequest,
) -> Result<Page<EventSummary>, AppError> {
    let mut query = event::Entity::find()
        .filter(event::Column::IsActive.eq(true))
        .filter(policy::event_visibility(viewer));

    if let Some(raw) = filter.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let mut v = Violations::default();
        let status = parse_status(raw, &mut v);
        v.finish()?;
        if let Some(status) = status {
            query = query.filter(event::Column::Status.eq(status));
        }
    }
    if let Some(term) = search_term(filter.search.as_deref()) {
        query = query.filter(
            Condition::any()
                .add(event::Column::Name.contains(&term))
                .add(event::Column::Location.contains(&term)),
        );
    }

    let query = query
        .order_by_desc(event::Column::CreatedAt)
        .order_by_desc(event::Column::Id);
    let (rows, total) = fetch_page(db, query, req).await?;
    Ok(Page::new(summaries(db, rows).await?, req, total))
}

/// Event detail: creator, assignments with assigners, active milestones with
/// report counts, and the latest reports the viewer may see.
pub async fn get(db: &DatabaseConnection, access: &EventAccess) -> Result<EventDetail, AppError> {
    let event = active_event(db, access.event_id()).await?;

    let creator = users_by_id(db, [event.created_by])
        .await?
        .get(&event.created_by)
        .map(UserRef::from);

    let assignment_rows = event_assignment::Entity::find()
        .filter(event_assignment::Column::EventId.eq(event.id))
        .order_by_desc(event_assignment::Column::AssignedAt)
        .all(db)
        .await?;
    let assignments = assignment_views(db, assignment_rows).await?;

    let milestone_rows = milestone::Entity::find()
        .filter(milestone::Column::EventId.eq(event.id))
        .filter(milestone::Column::IsActive.eq(true))
        .order_by_asc(milestone::Column::Ordinal)
        .all(db)
        .await?;
    let milestone_counts = active_report_counts(
        db,
        progress_report::Column::MilestoneId,
        milestone_rows.iter().map(|m| m.id),
    )
    .await?;
    let milestones = milestone_rows
        .into_iter()
        .map(|m| MilestoneWithCount {
            report_count: milestone_counts.get(&m.id).copied().unwrap_or(0),
            milestone: MilestoneResponse::from(m),
        })
        .collect();

    let reports = progress_report::Entity::find()
        .filter(progress_report::Column::EventId.eq(event.id))
        .filter(progress_report::Column::IsActive.eq(true))
        .filter(policy::report_visibility(access.viewer()));
    let report_count = reports.clone().count(db).await?;
    let recent = reports
        .order_by_desc(progress_report::Column::ReportDate)
        .order_by_desc(progress_report::Column::CreatedAt)
        .limit(RECENT_REPORTS)
        .all(db)
        .await?;

    Ok(EventDetail {
        creator,
        assignments,
        milestones,
        recent_reports: progress_views(db, recent).await?,
        report_count,
        event: EventResponse::from(event),
    })
}

pub async fn create(
    db: &DatabaseConnection,
    admin: &AdminOnly,
    input: CreateEvent,
) -> Result<EventSummary, AppError> {
    let mut v = Violations::default();
    let name = input.name.trim().to_string();
    let location = input.location.trim().to_string();
    if name.is_empty() {
        v.add("name", "required", "Name is required");
    }
    if location.is_empty() {
        v.add("location", "required", "Location is required");
    }
    let start = parse_date("start_date", &input.start_date, &mut v);
    let end = parse_date("end_date", &input.end_date, &mut v);
    if let (Some(start), Some(end)) = (start, end) {
        check_dates(start, end, &mut v);
    }
    check_budget(input.budget, &mut v);
    let status = match input.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_status(raw, &mut v),
        None => Some(EventStatus::Planning),
    };
    v.finish()?;

    let (Some(start), Some(end), Some(status)) = (start, end, status) else {
        return Err(AppError::invalid("start_date", "Dates are required"));
    };

    let now = Utc::now().naive_utc();
    let model = event::ActiveModel {
        id: Set(Uuid::now_v7()),
        name: Set(name),
        location: Set(location),
        description: Set(non_blank(input.description)),
        budget: Set(input.budget),
        start_date: Set(start),
        end_date: Set(end),
        status: Set(status),
        is_active: Set(true),
        created_by: Set(admin.identity().id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    tracing::info!(event_id = %model.id, name = %model.name, by = %admin.identity().id, "event created");
    summary(db, model).await
}

/// Partial update. The date-order invariant is checked against the merged
/// result, so changing only one date is still validated.
pub async fn update(
    db: &DatabaseConnection,
    _admin: &AdminOnly,
    id: Uuid,
    input: UpdateEvent,
) -> Result<EventSummary, AppError> {
    let mut v = Violations::default();
    let name = input.name.map(|s| s.trim().to_string());
    let location = input.location.map(|s| s.trim().to_string());
    if name.as_deref() == Some("") {
        v.add("name", "required", "Name is required");
    }
    if location.as_deref() == Some("") {
        v.add("location", "required", "Location is required");
    }
    let start = input
        .start_date
        .as_deref()
        .and_then(|raw| parse_date("start_date", raw, &mut v));
    let end = input
        .end_date
        .as_deref()
        .and_then(|raw| parse_date("end_date", raw, &mut v));
    check_budget(input.budget.flatten(), &mut v);
    let status = input
        .status
        .as_deref()
        .and_then(|raw| parse_status(raw, &mut v));
    v.finish()?;

    let current = active_event(db, id).await?;

    let mut v = Violations::default();
    check_dates(
        start.unwrap_or(current.start_date),
        end.unwrap_or(current.end_date),
        &mut v,
    );
    v.finish()?;

    let mut active: event::ActiveModel = current.into();
    if let Some(name) = name {
        active.name = Set(name);
    }
    if let Some(location) = location {
        active.location = Set(location);
    }
    if let Some(description) = input.description {
        active.description = Set(non_blank(Some(description)));
    }
    if let Some(budget) = input.budget {
        active.budget = Set(budget);
    }
    if let Some(start) = start {
        active.start_date = Set(start);
    }
    if let Some(end) = end {
        active.end_date = Set(end);
    }
    if let Some(status) = status {
        active.status = Set(status);
    }
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active.update(db).await?;
    summary(db, updated).await
}

/// Hide the event from every default read. Milestones, reports and
/// assignments stay in the store.
pub async fn soft_delete(db: &DatabaseConnection, admin: &AdminOnly, id: Uuid) -> Result<(), AppError> {
    let current = active_event(db, id).await?;
    let mut active: event::ActiveModel = current.into();
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now().naive_utc());
    active.update(db).await?;

    tracing::info!(event_id = %id, by = %admin.identity().id, "event deleted");
    Ok(())
}

pub async fn update_status(
    db: &DatabaseConnection,
    _admin: &AdminOnly,
    id: Uuid,
    raw_status: &str,
) -> Result<EventResponse, AppError> {
    let status = EventStatus::parse(raw_status).ok_or_else(|| {
        AppError::invalid(
            "status",
            "Status must be one of planning, on_progress, completed, cancelled",
        )
    })?;

    let current = active_event(db, id).await?;
    let mut active: event::ActiveModel = current.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now().naive_utc());
    Ok(EventResponse::from(active.update(db).await?))
}
