use axum::{extract::State, http::StatusCode, response::Json};
use uuid::Uuid;

use crate::manager::milestones::{self, CreateMilestone, UpdateMilestone};
use crate::policy;
use crate::views::{MilestoneDetail, MilestoneResponse, MilestoneWithCount};

use super::{
    ApiErr, ApiJson, ApiPath, AppState,
    dto::{self, Envelope, StatusRequest},
    jwt::{AdminUser, CurrentUser},
};

pub async fn list_for_event(
    CurrentUser(viewer): CurrentUser,
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<Json<Envelope<Vec<MilestoneWithCount>>>, ApiErr> {
    let access = policy::can_access_event(&state.db, &viewer, event_id).await?;
    let rows = milestones::list_for_event(&state.db, &access).await?;
    Ok(dto::ok("Milestones retrieved", rows))
}

pub async fn get_milestone(
    CurrentUser(viewer): CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<MilestoneDetail>>, ApiErr> {
    let detail = milestones::get(&state.db, &viewer, id).await?;
    Ok(dto::ok("Milestone retrieved", detail))
}

pub async fn create_milestone(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<CreateMilestone>,
) -> Result<(StatusCode, Json<Envelope<MilestoneResponse>>), ApiErr> {
    let milestone = milestones::create(&state.db, &admin, event_id, body).await?;
    Ok(dto::created("Milestone created", milestone))
}

pub async fn update_milestone(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateMilestone>,
) -> Result<Json<Envelope<MilestoneResponse>>, ApiErr> {
    let milestone = milestones::update(&state.db, &admin, id, body).await?;
    Ok(dto::ok("Milestone updated", milestone))
}

pub async fn delete_milestone(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiErr> {
    milestones::soft_delete(&state.db, &admin, id).await?;
    Ok(dto::done("Milestone deleted"))
}

pub async fn update_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<Json<Envelope<MilestoneResponse>>, ApiErr> {
    let milestone = milestones::update_status(&state.db, &admin, id, &body.status).await?;
    Ok(dto::ok("Milestone status updated", milestone))
}
