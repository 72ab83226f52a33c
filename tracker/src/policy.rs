//! Access policy: identity resolution, role gates, event-scoped access and
//! report ownership.
//!
//! Every gate hands back a capability value. Manager operations that need a
//! gate take the capability as a parameter, so a handler cannot reach them
//! without having passed the check first.

use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    sea_query::Query,
};
use uuid::Uuid;

use crate::entity::{Role, event, event_assignment, progress_report, user};
use crate::error::AppError;

/// An authenticated, active user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl From<&user::Model> for Identity {
    fn from(m: &user::Model) -> Self {
        Self {
            id: m.id,
            username: m.username.clone(),
            role: m.role,
        }
    }
}

impl Identity {
    /// Admin or supervisor.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Supervisor)
    }

    pub fn require_admin(self) -> Result<AdminOnly, AppError> {
        match self.role {
            Role::Admin => Ok(AdminOnly(self)),
            _ => Err(AppError::forbidden("Access denied. Admin only")),
        }
    }

    pub fn require_staff(self) -> Result<StaffOnly, AppError> {
        if self.is_staff() {
            Ok(StaffOnly(self))
        } else {
            Err(AppError::forbidden(
                "Access denied. Admin or supervisor only",
            ))
        }
    }

    pub fn require_officer(self) -> Result<OfficerOnly, AppError> {
        match self.role {
            Role::Petugas => Ok(OfficerOnly(self)),
            _ => Err(AppError::forbidden("Access denied. Petugas only")),
        }
    }
}

/// Proof that the caller is an admin.
#[derive(Debug, Clone)]
pub struct AdminOnly(Identity);

impl AdminOnly {
    pub fn identity(&self) -> &Identity {
        &self.0
    }
}

/// Proof that the caller is an admin or a supervisor.
#[derive(Debug, Clone)]
pub struct StaffOnly(Identity);

impl StaffOnly {
    pub fn identity(&self) -> &Identity {
        &self.0
    }
}

/// Proof that the caller is a field officer.
#[derive(Debug, Clone)]
pub struct OfficerOnly(Identity);

impl OfficerOnly {
    pub fn identity(&self) -> &Identity {
        &self.0
    }
}

/// Proof that `viewer` may act within `event_id`.
#[derive(Debug, Clone)]
pub struct EventAccess {
    event_id: Uuid,
    viewer: Identity,
}

impl EventAccess {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn viewer(&self) -> &Identity {
        &self.viewer
    }
}

/// Proof that the caller authored an active progress report. Carries the row
/// so the mutation does not need to re-read it.
#[derive(Debug, Clone)]
pub struct ReportOwnership {
    report: progress_report::Model,
}

impl ReportOwnership {
    pub fn report(&self) -> &progress_report::Model {
        &self.report
    }

    pub fn into_report(self) -> progress_report::Model {
        self.report
    }
}

/// Resolve the subject of a verified token to an active user.
///
/// Unknown users are `Unauthorized`; deactivated users are `Forbidden` even
/// though their token is still cryptographically valid.
pub async fn resolve_identity(db: &DatabaseConnection, user_id: Uuid) -> Result<Identity, AppError> {
    let user = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;

    if !user.is_active {
        return Err(AppError::forbidden("Your account is inactive"));
    }

    Ok(Identity::from(&user))
}

/// `canAccessEvent`: staff pass unconditionally, a petugas passes only with an
/// assignment row for the event.
///
/// The assignment check runs before any existence check on the event itself,
/// so an officer learns nothing about events outside their assignments.
pub async fn can_access_event(
    db: &DatabaseConnection,
    viewer: &Identity,
    event_id: Uuid,
) -> Result<EventAccess, AppError> {
    if !viewer.is_staff() && !is_assigned(db, event_id, viewer.id).await? {
        return Err(AppError::forbidden(
            "You do not have access to this event",
        ));
    }

    Ok(EventAccess {
        event_id,
        viewer: viewer.clone(),
    })
}

/// `canModifyProgress`: only the authoring officer may mutate a report,
/// whatever their role.
pub async fn can_modify_progress(
    db: &DatabaseConnection,
    caller: &Identity,
    report_id: Uuid,
) -> Result<ReportOwnership, AppError> {
    let report = progress_report::Entity::find_by_id(report_id)
        .filter(progress_report::Column::IsActive.eq(true))
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Progress report not found"))?;

    if report.officer_id != caller.id {
        return Err(AppError::forbidden(
            "You can only modify your own progress reports",
        ));
    }

    Ok(ReportOwnership { report })
}

/// The sole authority for petugas event access.
pub async fn is_assigned(
    db: &DatabaseConnection,
    event_id: Uuid,
    officer_id: Uuid,
) -> Result<bool, AppError> {
    let count = event_assignment::Entity::find()
        .filter(event_assignment::Column::EventId.eq(event_id))
        .filter(event_assignment::Column::OfficerId.eq(officer_id))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// Row predicate restricting event queries to what `viewer` may see.
pub fn event_visibility(viewer: &Identity) -> Condition {
    match viewer.role {
        Role::Admin | Role::Supervisor => Condition::all(),
        Role::Petugas => Condition::all().add(
            event::Column::Id.in_subquery(
                Query::select()
                    .column(event_assignment::Column::EventId)
                    .from(event_assignment::Entity)
                    .and_where(event_assignment::Column::OfficerId.eq(viewer.id))
                    .to_owned(),
            ),
        ),
    }
}

/// Row predicate restricting progress report queries to what `viewer` may see.
pub fn report_visibility(viewer: &Identity) -> Condition {
    match viewer.role {
        Role::Admin | Role::Supervisor => Condition::all(),
        Role::Petugas => Condition::all().add(progress_report::Column::OfficerId.eq(viewer.id)),
    }
}
