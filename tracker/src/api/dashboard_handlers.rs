use axum::{extract::State, response::Json};

use crate::manager::dashboard;
use crate::views::{Activity, DashboardStats, EventProgressSummary};

use super::{
    ApiErr, ApiQuery, AppState,
    dto::{self, Envelope, LimitQuery, SummaryQuery},
    jwt::StaffUser,
};

pub async fn stats(
    StaffUser(staff): StaffUser,
    State(state): State<AppState>,
) -> Result<Json<Envelope<DashboardStats>>, ApiErr> {
    let stats = dashboard::stats(&state.db, &staff).await?;
    Ok(dto::ok("Dashboard statistics retrieved", stats))
}

pub async fn events_summary(
    StaffUser(staff): StaffUser,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SummaryQuery>,
) -> Result<Json<Envelope<Vec<EventProgressSummary>>>, ApiErr> {
    let summary =
        dashboard::events_summary(&state.db, &staff, params.status.as_deref(), params.limit).await?;
    Ok(dto::ok("Events summary retrieved", summary))
}

pub async fn recent_activities(
    StaffUser(staff): StaffUser,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LimitQuery>,
) -> Result<Json<Envelope<Vec<Activity>>>, ApiErr> {
    let activities = dashboard::recent_activities(&state.db, &staff, params.limit).await?;
    Ok(dto::ok("Recent activities retrieved", activities))
}
