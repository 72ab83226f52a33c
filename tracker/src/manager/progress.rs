//! Progress reports: photographic field updates authored by officers.

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Select, Set,
    sea_query::Query,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entity::{event, milestone, progress_report};
use crate::error::{AppError, Violations};
use crate::photos::{self, PhotoHost, PhotoUpload, StoredPhoto, UploadLimits};
use crate::policy::{self, EventAccess, Identity, OfficerOnly, ReportOwnership};
use crate::views::{ProgressView, UploadedPhotos};

use super::{Page, PageRequest, active_event, fetch_page, parse_date, parse_id, progress_views};

const GENERAL_FOLDER: &str = "tender-photos/general";

fn event_folder(event_id: Uuid) -> String {
    format!("tender-photos/{event_id}")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressFilter {
    pub event_id: Option<String>,
    pub milestone_id: Option<String>,
    #[serde(alias = "petugas_id")]
    pub officer_id: Option<String>,
}

/// Fields of a create or update form. Text fields arrive unparsed so every
/// problem can be reported in one validation failure.
#[derive(Debug, Clone, Default)]
pub struct ProgressForm {
    pub description: Option<String>,
    pub report_date: Option<String>,
    pub progress_percentage: Option<String>,
    pub milestone_id: Option<String>,
    /// Photos already hosted through the standalone upload endpoint.
    pub photo_urls: Vec<String>,
    pub photos: Vec<PhotoUpload>,
}

struct Checked {
    description: Option<String>,
    report_date: Option<NaiveDate>,
    progress_percentage: Option<i32>,
    milestone: MilestoneChange,
    photo_urls: Vec<String>,
}

#[derive(Clone, Copy)]
enum MilestoneChange {
    Keep,
    Detach,
    Attach(Uuid),
}

/// Validate `form`. On create every text field is required and at least one
/// photo must be supplied; on update each field is checked only when present.
fn check_form(
    form: &ProgressForm,
    limits: &UploadLimits,
    host: &dyn PhotoHost,
    creating: bool,
) -> Result<Checked, AppError> {
    let mut v = Violations::default();

    let description = form.description.as_deref().map(str::trim);
    match description {
        Some("") => v.add("description", "required", "Description must not be empty"),
        None if creating => v.add("description", "required", "Description is required"),
        _ => {}
    }

    let report_date = match form.report_date.as_deref() {
        Some(raw) => parse_date("report_date", raw, &mut v),
        None => {
            if creating {
                v.add("report_date", "required", "Report date is required");
            }
            None
        }
    };
    if report_date.is_some_and(|d| d > Utc::now().date_naive()) {
        v.add("report_date", "range", "Report date cannot be in the future");
    }

    let progress_percentage = match form.progress_percentage.as_deref().map(str::trim) {
        Some(raw) => match raw.parse::<i32>() {
            Ok(p) if (0..=100).contains(&p) => Some(p),
            _ => {
                v.add(
                    "progress_percentage",
                    "range",
                    "Progress percentage must be an integer between 0 and 100",
                );
                None
            }
        },
        None => {
            if creating {
                v.add("progress_percentage", "required", "Progress percentage is required");
            }
            None
        }
    };

    let milestone = match form.milestone_id.as_deref().map(str::trim) {
        None => MilestoneChange::Keep,
        Some("") if creating => MilestoneChange::Keep,
        Some("") => MilestoneChange::Detach,
        Some(raw) => parse_id("milestone_id", Some(raw), &mut v)
            .map(MilestoneChange::Attach)
            .unwrap_or(MilestoneChange::Keep),
    };

    let photo_urls: Vec<String> = form
        .photo_urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(bad) = photo_urls.iter().find(|u| !photos::is_hosted_url(host, u)) {
        v.add(
            "photo_urls",
            "hosted",
            format!("{bad} is not a photo uploaded through this service"),
        );
    }
    if photo_urls.len() + form.photos.len() > limits.max_files {
        v.add(
            "photo_urls",
            "count",
            format!("At most {} photos per report request", limits.max_files),
        );
    }
    if let Err(e) = limits.check(&form.photos, false) {
        for fe in e.field_errors() {
            v.add("photos", "file", fe.message.clone());
        }
    }
    if creating && photo_urls.is_empty() && form.photos.is_empty() {
        v.add("photos", "required", "At least one photo must be uploaded");
    }

    v.finish()?;
    Ok(Checked {
        description: description.map(str::to_string),
        report_date,
        progress_percentage,
        milestone,
        photo_urls,
    })
}

/// A milestone may only be attached when it is active and belongs to the
/// report's event.
async fn ensure_milestone_in_event(
    db: &DatabaseConnection,
    event_id: Uuid,
    milestone_id: Uuid,
) -> Result<(), AppError> {
    milestone::Entity::find_by_id(milestone_id)
        .filter(milestone::Column::EventId.eq(event_id))
        .filter(milestone::Column::IsActive.eq(true))
        .one(db)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Milestone not found for this event"))
}

fn newest_first(query: Select<progress_report::Entity>) -> Select<progress_report::Entity> {
    query
        .order_by_desc(progress_report::Column::ReportDate)
        .order_by_desc(progress_report::Column::CreatedAt)
        .order_by_desc(progress_report::Column::Id)
}

fn active_events_only() -> Condition {
    Condition::all().add(
        progress_report::Column::EventId.in_subquery(
            Query::select()
                .column(event::Column::Id)
                .from(event::Entity)
                .and_where(event::Column::IsActive.eq(true))
                .to_owned(),
        ),
    )
}

fn filter_condition(filter: &ProgressFilter, v: &mut Violations) -> Condition {
    let mut cond = Condition::all();
    if let Some(id) = parse_id("event_id", filter.event_id.as_deref(), v) {
        cond = cond.add(progress_report::Column::EventId.eq(id));
    }
    if let Some(id) = parse_id("milestone_id", filter.milestone_id.as_deref(), v) {
        cond = cond.add(progress_report::Column::MilestoneId.eq(id));
    }
    if let Some(id) = parse_id("officer_id", filter.officer_id.as_deref(), v) {
        cond = cond.add(progress_report::Column::OfficerId.eq(id));
    }
    cond
}

/// Reports of one event, newest report date first. A petugas only ever sees
/// their own reports, whatever `officer_id` asks for.
pub async fn list_for_event(
    db: &DatabaseConnection,
    access: &EventAccess,
    filter: ProgressFilter,
    req: PageRequest,
) -> Result<Page<ProgressView>, AppError> {
    let mut v = Violations::default();
    let cond = filter_condition(
        &ProgressFilter {
            event_id: None,
            ..filter
        },
        &mut v,
    );
    v.finish()?;

    active_event(db, access.event_id()).await?;

    let query = progress_report::Entity::find()
        .filter(progress_report::Column::EventId.eq(access.event_id()))
        .filter(progress_report::Column::IsActive.eq(true))
        .filter(cond)
        .filter(policy::report_visibility(access.viewer()));

    let (rows, total) = fetch_page(db, newest_first(query), req).await?;
    Ok(Page::new(progress_views(db, rows).await?, req, total))
}

/// All reports the viewer may see, across active events.
pub async fn list(
    db: &DatabaseConnection,
    viewer: &Identity,
    filter: ProgressFilter,
    req: PageRequest,
) -> Result<Page<ProgressView>, AppError> {
    let mut v = Violations::default();
    let cond = filter_condition(&filter, &mut v);
    v.finish()?;

    let query = progress_report::Entity::find()
        .filter(progress_report::Column::IsActive.eq(true))
        .filter(active_events_only())
        .filter(cond)
        .filter(policy::report_visibility(viewer));

    let (rows, total) = fetch_page(db, newest_first(query), req).await?;
    Ok(Page::new(progress_views(db, rows).await?, req, total))
}

/// Single report. Reports outside the viewer's visibility are NotFound.
pub async fn get(db: &DatabaseConnection, viewer: &Identity, id: Uuid) -> Result<ProgressView, AppError> {
    let report = progress_report::Entity::find_by_id(id)
        .filter(progress_report::Column::IsActive.eq(true))
        .filter(policy::report_visibility(viewer))
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Progress report not found"))?;
    single_view(db, report).await
}

async fn single_view(db: &DatabaseConnection, report: progress_report::Model) -> Result<ProgressView, AppError> {
    progress_views(db, vec![report])
        .await?
        .pop()
        .ok_or_else(|| AppError::internal("progress view missing"))
}

/// File a report. Nothing is uploaded until every field has been validated
/// and the event and milestone resolved; if the insert fails afterwards the
/// fresh uploads are deleted again.
pub async fn create(
    db: &DatabaseConnection,
    host: &dyn PhotoHost,
    limits: &UploadLimits,
    officer: &OfficerOnly,
    access: &EventAccess,
    form: ProgressForm,
) -> Result<ProgressView, AppError> {
    let checked = check_form(&form, limits, host, true)?;
    let event_id = access.event_id();

    active_event(db, event_id).await?;
    let milestone_id = match checked.milestone {
        MilestoneChange::Attach(id) => {
            ensure_milestone_in_event(db, event_id, id).await?;
            Some(id)
        }
        MilestoneChange::Keep | MilestoneChange::Detach => None,
    };

    let uploaded = photos::upload_all(host, form.photos, &event_folder(event_id)).await?;
    let mut photo_urls = checked.photo_urls;
    photo_urls.extend(uploaded.iter().map(|p| p.url.clone()));

    let now = Utc::now().naive_utc();
    let insert = progress_report::ActiveModel {
        id: Set(Uuid::now_v7()),
        event_id: Set(event_id),
        milestone_id: Set(milestone_id),
        officer_id: Set(officer.identity().id),
        description: Set(checked.description.unwrap_or_default()),
        photo_urls: Set(serde_json::to_string(&photo_urls)?),
        report_date: Set(checked.report_date.unwrap_or(now.date())),
        progress_percentage: Set(checked.progress_percentage.unwrap_or_default()),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .map_err(AppError::from);
    let report = compensate(host, &uploaded, insert).await?;

    tracing::info!(
        report_id = %report.id,
        event_id = %event_id,
        officer_id = %report.officer_id,
        photos = photo_urls.len(),
        "progress report created"
    );
    single_view(db, report).await
}

/// Patch a report owned by the caller. New photos are appended after the
/// existing ones, pre-uploaded URLs before fresh uploads.
pub async fn update(
    db: &DatabaseConnection,
    host: &dyn PhotoHost,
    limits: &UploadLimits,
    ownership: ReportOwnership,
    form: ProgressForm,
) -> Result<ProgressView, AppError> {
    let checked = check_form(&form, limits, host, false)?;
    let current = ownership.into_report();

    if let MilestoneChange::Attach(id) = checked.milestone {
        ensure_milestone_in_event(db, current.event_id, id).await?;
    }

    let mut photo_urls = current.photos()?;
    let appending = !checked.photo_urls.is_empty() || !form.photos.is_empty();
    let uploaded = photos::upload_all(host, form.photos, &event_folder(current.event_id)).await?;
    photo_urls.extend(checked.photo_urls);
    photo_urls.extend(uploaded.iter().map(|p| p.url.clone()));

    let mut active: progress_report::ActiveModel = current.into();
    if let Some(description) = checked.description {
        active.description = Set(description);
    }
    if let Some(date) = checked.report_date {
        active.report_date = Set(date);
    }
    if let Some(p) = checked.progress_percentage {
        active.progress_percentage = Set(p);
    }
    match checked.milestone {
        MilestoneChange::Keep => {}
        MilestoneChange::Detach => active.milestone_id = Set(None),
        MilestoneChange::Attach(id) => active.milestone_id = Set(Some(id)),
    }
    if appending {
        active.photo_urls = Set(serde_json::to_string(&photo_urls)?);
    }
    active.updated_at = Set(Utc::now().naive_utc());

    let report = compensate(host, &uploaded, active.update(db).await.map_err(AppError::from)).await?;
    single_view(db, report).await
}

/// Soft delete. Hosted photos stay where they are.
pub async fn soft_delete(db: &DatabaseConnection, ownership: ReportOwnership) -> Result<(), AppError> {
    let report = ownership.into_report();
    let id = report.id;
    let mut active: progress_report::ActiveModel = report.into();
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now().naive_utc());
    active.update(db).await?;

    tracing::info!(report_id = %id, "progress report deleted");
    Ok(())
}

/// Pre-upload photos for a report that will be filed later.
pub async fn upload_photos(
    host: &dyn PhotoHost,
    limits: &UploadLimits,
    officer: &OfficerOnly,
    files: Vec<PhotoUpload>,
) -> Result<UploadedPhotos, AppError> {
    limits.check(&files, true)?;
    let stored = photos::upload_all(host, files, GENERAL_FOLDER).await?;
    tracing::info!(officer_id = %officer.identity().id, count = stored.len(), "photos pre-uploaded");

    let urls: Vec<String> = stored.into_iter().map(|p| p.url).collect();
    let count = urls.len();
    Ok(UploadedPhotos { urls, count })
}

async fn compensate<T>(
    host: &dyn PhotoHost,
    uploaded: &[StoredPhoto],
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    if result.is_err() && !uploaded.is_empty() {
        photos::delete_best_effort(host, uploaded).await;
    }
    result
}
