use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entity::{MilestoneStatus, milestone, progress_report};
use crate::error::{AppError, Violations};
use crate::policy::{self, AdminOnly, EventAccess, Identity};
use crate::views::{EventRef, MilestoneDetail, MilestoneResponse, MilestoneWithCount};

use super::{active_event, active_report_counts, non_blank, parse_date, progress_views};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMilestone {
    pub name: String,
    pub description: Option<String>,
    pub deadline: String,
    pub ordinal: i32,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMilestone {
    pub name: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<String>,
    pub ordinal: Option<i32>,
    pub status: Option<String>,
}

const STATUS_MESSAGE: &str = "Status must be one of pending, on_progress, completed";

fn parse_status(raw: &str, v: &mut Violations) -> Option<MilestoneStatus> {
    let status = MilestoneStatus::parse(raw);
    if status.is_none() {
        v.add("status", "status", STATUS_MESSAGE);
    }
    status
}

fn check_ordinal(ordinal: i32, v: &mut Violations) {
    if ordinal < 1 {
        v.add("ordinal", "range", "Ordinal must be a positive integer");
    }
}

async fn active_milestone(db: &DatabaseConnection, id: Uuid) -> Result<milestone::Model, AppError> {
    milestone::Entity::find_by_id(id)
        .filter(milestone::Column::IsActive.eq(true))
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Milestone not found"))
}

/// Ordinals are unique among the active milestones of one event. Soft-deleted
/// milestones release their ordinal.
async fn ensure_ordinal_free(
    db: &DatabaseConnection,
    event_id: Uuid,
    ordinal: i32,
    except: Option<Uuid>,
) -> Result<(), AppError> {
    let mut query = milestone::Entity::find()
        .filter(milestone::Column::EventId.eq(event_id))
        .filter(milestone::Column::Ordinal.eq(ordinal))
        .filter(milestone::Column::IsActive.eq(true));
    if let Some(id) = except {
        query = query.filter(milestone::Column::Id.ne(id));
    }
    if query.count(db).await? > 0 {
        return Err(AppError::conflict(format!(
            "Ordinal {ordinal} is already used in this event"
        )));
    }
    Ok(())
}

/// Active milestones of an event by ordinal, with active report counts.
pub async fn list_for_event(
    db: &DatabaseConnection,
    access: &EventAccess,
) -> Result<Vec<MilestoneWithCount>, AppError> {
    active_event(db, access.event_id()).await?;

    let rows = milestone::Entity::find()
        .filter(milestone::Column::EventId.eq(access.event_id()))
        .filter(milestone::Column::IsActive.eq(true))
        .order_by_asc(milestone::Column::Ordinal)
        .all(db)
        .await?;
    let counts = active_report_counts(
        db,
        progress_report::Column::MilestoneId,
        rows.iter().map(|m| m.id),
    )
    .await?;

    Ok(rows
        .into_iter()
        .map(|m| MilestoneWithCount {
            report_count: counts.get(&m.id).copied().unwrap_or(0),
            milestone: MilestoneResponse::from(m),
        })
        .collect())
}

/// A single milestone. The owning event is resolved first, then the viewer's
/// access to it is checked.
pub async fn get(db: &DatabaseConnection, viewer: &Identity, id: Uuid) -> Result<MilestoneDetail, AppError> {
    let milestone = active_milestone(db, id).await?;
    let access = policy::can_access_event(db, viewer, milestone.event_id).await?;
    let event = active_event(db, access.event_id()).await?;

    let reports = progress_report::Entity::find()
        .filter(progress_report::Column::MilestoneId.eq(milestone.id))
        .filter(progress_report::Column::IsActive.eq(true))
        .filter(policy::report_visibility(viewer))
        .order_by_desc(progress_report::Column::ReportDate)
        .order_by_desc(progress_report::Column::CreatedAt)
        .all(db)
        .await?;

    Ok(MilestoneDetail {
        milestone: MilestoneResponse::from(milestone),
        event: Some(EventRef::from(&event)),
        reports: progress_views(db, reports).await?,
    })
}

pub async fn create(
    db: &DatabaseConnection,
    admin: &AdminOnly,
    event_id: Uuid,
    input: CreateMilestone,
) -> Result<MilestoneResponse, AppError> {
    let mut v = Violations::default();
    let name = input.name.trim().to_string();
    if name.is_empty() {
        v.add("name", "required", "Milestone name is required");
    }
    let deadline = parse_date("deadline", &input.deadline, &mut v);
    check_ordinal(input.ordinal, &mut v);
    let status = match input.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_status(raw, &mut v),
        None => Some(MilestoneStatus::Pending),
    };
    v.finish()?;
    let (Some(deadline), Some(status)) = (deadline, status) else {
        return Err(AppError::invalid("deadline", "Deadline is required"));
    };

    active_event(db, event_id).await?;
    ensure_ordinal_free(db, event_id, input.ordinal, None).await?;

    let now = Utc::now().naive_utc();
    let model = milestone::ActiveModel {
        id: Set(Uuid::now_v7()),
        event_id: Set(event_id),
        name: Set(name),
        description: Set(non_blank(input.description)),
        deadline: Set(deadline),
        ordinal: Set(input.ordinal),
        status: Set(status),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    tracing::info!(milestone_id = %model.id, event_id = %event_id, ordinal = model.ordinal, by = %admin.identity().id, "milestone created");
    Ok(MilestoneResponse::from(model))
}

pub async fn update(
    db: &DatabaseConnection,
    _admin: &AdminOnly,
    id: Uuid,
    input: UpdateMilestone,
) -> Result<MilestoneResponse, AppError> {
    let mut v = Violations::default();
    let name = input.name.map(|s| s.trim().to_string());
    if name.as_deref() == Some("") {
        v.add("name", "required", "Milestone name is required");
    }
    let deadline = input
        .deadline
        .as_deref()
        .and_then(|raw| parse_date("deadline", raw, &mut v));
    if let Some(ordinal) = input.ordinal {
        check_ordinal(ordinal, &mut v);
    }
    let status = input
        .status
        .as_deref()
        .and_then(|raw| parse_status(raw, &mut v));
    v.finish()?;

    let current = active_milestone(db, id).await?;
    if let Some(ordinal) = input.ordinal
        && ordinal != current.ordinal
    {
        ensure_ordinal_free(db, current.event_id, ordinal, Some(current.id)).await?;
    }

    let mut active: milestone::ActiveModel = current.into();
    if let Some(name) = name {
        active.name = Set(name);
    }
    if let Some(description) = input.description {
        active.description = Set(non_blank(Some(description)));
    }
    if let Some(deadline) = deadline {
        active.deadline = Set(deadline);
    }
    if let Some(ordinal) = input.ordinal {
        active.ordinal = Set(ordinal);
    }
    if let Some(status) = status {
        active.status = Set(status);
    }
    active.updated_at = Set(Utc::now().naive_utc());

    Ok(MilestoneResponse::from(active.update(db).await?))
}

pub async fn soft_delete(db: &DatabaseConnection, admin: &AdminOnly, id: Uuid) -> Result<(), AppError> {
    let current = active_milestone(db, id).await?;
    let mut active: milestone::ActiveModel = current.into();
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now().naive_utc());
    active.update(db).await?;

    tracing::info!(milestone_id = %id, by = %admin.identity().id, "milestone deleted");
    Ok(())
}

pub async fn update_status(
    db: &DatabaseConnection,
    _admin: &AdminOnly,
    id: Uuid,
    raw_status: &str,
) -> Result<MilestoneResponse, AppError> {
    let status = MilestoneStatus::parse(raw_status)
        .ok_or_else(|| AppError::invalid("status", STATUS_MESSAGE))?;

    let current = active_milestone(db, id).await?;
    let mut active: milestone::ActiveModel = current.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now().naive_utc());
    Ok(MilestoneResponse::from(active.update(db).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Role;
    use crate::testing;

    fn step(ordinal: i32) -> CreateMilestone {
        CreateMilestone {
            name: format!("Step {ordinal}"),
            description: None,
            deadline: "2026-05-01".into(),
            ordinal,
            status: None,
        }
    }

    #[tokio::test]
    async fn ordinal_collision_conflicts_until_soft_deleted() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let ev = testing::insert_event(&db, admin.id, "Bridge").await;
        let cap = Identity::from(&admin).require_admin().unwrap();

        let first = create(&db, &cap, ev.id, step(1)).await.unwrap();
        assert_eq!(first.status, MilestoneStatus::Pending);

        let err = create(&db, &cap, ev.id, step(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        soft_delete(&db, &cap, first.id).await.unwrap();
        let reused = create(&db, &cap, ev.id, step(1)).await.unwrap();
        assert_eq!(reused.ordinal, 1);
    }

    #[tokio::test]
    async fn ordinal_is_scoped_per_event() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let e1 = testing::insert_event(&db, admin.id, "Bridge").await;
        let e2 = testing::insert_event(&db, admin.id, "Tunnel").await;
        let cap = Identity::from(&admin).require_admin().unwrap();

        create(&db, &cap, e1.id, step(1)).await.unwrap();
        create(&db, &cap, e2.id, step(1)).await.unwrap();
    }

    #[tokio::test]
    async fn update_ordinal_checks_other_milestones_only() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let ev = testing::insert_event(&db, admin.id, "Bridge").await;
        let cap = Identity::from(&admin).require_admin().unwrap();
        let one = create(&db, &cap, ev.id, step(1)).await.unwrap();
        create(&db, &cap, ev.id, step(2)).await.unwrap();

        let err = update(
            &db,
            &cap,
            one.id,
            UpdateMilestone {
                ordinal: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let same = update(
            &db,
            &cap,
            one.id,
            UpdateMilestone {
                ordinal: Some(1),
                name: Some("Foundations".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(same.name, "Foundations");
    }

    #[tokio::test]
    async fn invalid_fields_are_reported() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let ev = testing::insert_event(&db, admin.id, "Bridge").await;
        let cap = Identity::from(&admin).require_admin().unwrap();

        let err = create(
            &db,
            &cap,
            ev.id,
            CreateMilestone {
                name: " ".into(),
                description: None,
                deadline: "soon".into(),
                ordinal: 0,
                status: Some("done".into()),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.field_errors().len(), 4);

        let one = create(&db, &cap, ev.id, step(1)).await.unwrap();
        let err = update_status(&db, &cap, one.id, "done").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let ok = update_status(&db, &cap, one.id, "completed").await.unwrap();
        assert_eq!(ok.status, MilestoneStatus::Completed);
    }

    #[tokio::test]
    async fn get_checks_access_to_owning_event() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let officer = testing::insert_user(&db, "o1", Role::Petugas).await;
        let ev = testing::insert_event(&db, admin.id, "Bridge").await;
        let m = testing::insert_milestone(&db, ev.id, 1, MilestoneStatus::Pending).await;

        let err = get(&db, &Identity::from(&officer), m.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        testing::assign(&db, ev.id, officer.id, admin.id).await;
        let detail = get(&db, &Identity::from(&officer), m.id).await.unwrap();
        assert_eq!(detail.event.unwrap().id, ev.id);

        let err = get(&db, &Identity::from(&admin), Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
