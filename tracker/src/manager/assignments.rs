//! Assignment ledger: which officers work on which event.

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entity::{Role, event_assignment, user};
use crate::error::{AppError, Violations};
use crate::policy::{AdminOnly, EventAccess};
use crate::views::{AssignResult, AssignmentView, UserRef};

use super::{active_event, users_by_id};

#[derive(Debug, Clone, Deserialize)]
pub struct AssignOfficers {
    #[serde(alias = "petugas_ids")]
    pub officer_ids: Vec<String>,
}

pub(crate) async fn assignment_views(
    db: &DatabaseConnection,
    rows: Vec<event_assignment::Model>,
) -> Result<Vec<AssignmentView>, AppError> {
    let users = users_by_id(
        db,
        rows.iter().flat_map(|a| [a.officer_id, a.assigned_by]),
    )
    .await?;

    Ok(rows
        .into_iter()
        .map(|a| AssignmentView {
            id: a.id,
            event_id: a.event_id,
            officer: users.get(&a.officer_id).map(UserRef::from),
            assigned_by: users.get(&a.assigned_by).map(UserRef::from),
            assigned_at: a.assigned_at,
        })
        .collect())
}

/// Assign a batch of officers. Every id must name an active petugas or the
/// whole batch is rejected. Pairs that already exist are skipped; the result
/// lists only the new assignments.
pub async fn assign(
    db: &DatabaseConnection,
    admin: &AdminOnly,
    event_id: Uuid,
    input: AssignOfficers,
) -> Result<AssignResult, AppError> {
    let mut v = Violations::default();
    if input.officer_ids.is_empty() {
        v.add("officer_ids", "required", "officer_ids must be a non-empty array");
    }

    let mut seen = HashSet::new();
    let mut officer_ids = Vec::new();
    let mut malformed = Vec::new();
    for raw in &input.officer_ids {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => {
                if seen.insert(id) {
                    officer_ids.push(id);
                }
            }
            Err(_) => malformed.push(raw.clone()),
        }
    }
    if !malformed.is_empty() {
        v.add(
            "officer_ids",
            "uuid",
            format!("Invalid officer ids: {}", malformed.join(", ")),
        );
    }
    v.finish()?;

    active_event(db, event_id).await?;

    let valid: HashSet<Uuid> = user::Entity::find()
        .filter(user::Column::Id.is_in(officer_ids.clone()))
        .filter(user::Column::Role.eq(Role::Petugas))
        .filter(user::Column::IsActive.eq(true))
        .all(db)
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect();
    let invalid: Vec<String> = officer_ids
        .iter()
        .filter(|id| !valid.contains(*id))
        .map(Uuid::to_string)
        .collect();
    if !invalid.is_empty() {
        return Err(AppError::invalid(
            "officer_ids",
            format!(
                "Some officers are invalid or inactive: {}",
                invalid.join(", ")
            ),
        ));
    }

    let existing: HashSet<Uuid> = event_assignment::Entity::find()
        .filter(event_assignment::Column::EventId.eq(event_id))
        .filter(event_assignment::Column::OfficerId.is_in(officer_ids.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|a| a.officer_id)
        .collect();

    let mut created = Vec::new();
    for officer_id in officer_ids.into_iter().filter(|id| !existing.contains(id)) {
        let insert = event_assignment::ActiveModel {
            id: Set(Uuid::now_v7()),
            event_id: Set(event_id),
            officer_id: Set(officer_id),
            assigned_by: Set(admin.identity().id),
            assigned_at: Set(Utc::now().naive_utc()),
        }
        .insert(db)
        .await;

        match insert.map_err(AppError::from) {
            Ok(row) => created.push(row),
            // A concurrent request won the race for this pair.
            Err(AppError::Conflict(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        event_id = %event_id,
        assigned = created.len(),
        by = %admin.identity().id,
        "officers assigned"
    );

    let assigned = assignment_views(db, created).await?;
    let total = assigned.len();
    Ok(AssignResult { assigned, total })
}

pub async fn remove(
    db: &DatabaseConnection,
    admin: &AdminOnly,
    event_id: Uuid,
    officer_id: Uuid,
) -> Result<(), AppError> {
    let row = event_assignment::Entity::find()
        .filter(event_assignment::Column::EventId.eq(event_id))
        .filter(event_assignment::Column::OfficerId.eq(officer_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Assignment not found"))?;

    row.delete(db).await?;
    tracing::info!(event_id = %event_id, officer_id = %officer_id, by = %admin.identity().id, "officer removed");
    Ok(())
}

/// Assignments of an event, newest first.
pub async fn list(db: &DatabaseConnection, access: &EventAccess) -> Result<Vec<AssignmentView>, AppError> {
    active_event(db, access.event_id()).await?;
    let rows = event_assignment::Entity::find()
        .filter(event_assignment::Column::EventId.eq(access.event_id()))
        .order_by_desc(event_assignment::Column::AssignedAt)
        .order_by_desc(event_assignment::Column::Id)
        .all(db)
        .await?;
    assignment_views(db, rows).await
}
