//! Materialized views returned by the managers: each entity with the related
//! rows a client needs attached.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::entity::{EventStatus, MilestoneStatus, Role, event, milestone, progress_report, user};
use crate::error::AppError;

// ---------- users ----------

#[derive(Debug, Serialize, Clone)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub display_name: String,
    pub profile_photo: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<user::Model> for UserResponse {
    fn from(m: user::Model) -> Self {
        Self {
            id: m.id,
            username: m.username,
            email: m.email,
            role: m.role,
            display_name: m.display_name,
            profile_photo: m.profile_photo,
            is_active: m.is_active,
            last_login_at: m.last_login_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Compact user identity attached to other resources.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub profile_photo: Option<String>,
}

impl From<&user::Model> for UserRef {
    fn from(m: &user::Model) -> Self {
        Self {
            id: m.id,
            username: m.username.clone(),
            display_name: m.display_name.clone(),
            profile_photo: m.profile_photo.clone(),
        }
    }
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct UserCounts {
    pub created_events: u64,
    pub assignments: u64,
    pub progress_reports: u64,
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserResponse,
    pub counts: UserCounts,
}

// ---------- events ----------

#[derive(Debug, Serialize, Clone)]
pub struct EventResponse {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub budget: Option<Decimal>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: EventStatus,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<event::Model> for EventResponse {
    fn from(m: event::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            location: m.location,
            description: m.description,
            budget: m.budget,
            start_date: m.start_date,
            end_date: m.end_date,
            status: m.status,
            is_active: m.is_active,
            created_by: m.created_by,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct EventRef {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub status: EventStatus,
}

impl From<&event::Model> for EventRef {
    fn from(m: &event::Model) -> Self {
        Self {
            id: m.id,
            name: m.name.clone(),
            location: m.location.clone(),
            status: m.status,
        }
    }
}

/// List item: event with creator, assigned officers, active milestones and
/// report count.
#[derive(Debug, Serialize)]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: EventResponse,
    pub creator: Option<UserRef>,
    pub officers: Vec<UserRef>,
    pub milestones: Vec<MilestoneResponse>,
    pub report_count: u64,
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: EventResponse,
    pub creator: Option<UserRef>,
    pub assignments: Vec<AssignmentView>,
    pub milestones: Vec<MilestoneWithCount>,
    pub recent_reports: Vec<ProgressView>,
    pub report_count: u64,
}

// ---------- assignments ----------

#[derive(Debug, Serialize, Clone)]
pub struct AssignmentView {
    pub id: Uuid,
    pub event_id: Uuid,
    pub officer: Option<UserRef>,
    pub assigned_by: Option<UserRef>,
    pub assigned_at: NaiveDateTime,
}

/// Outcome of a batch assignment: only the pairs that were newly created.
#[derive(Debug, Serialize)]
pub struct AssignResult {
    pub assigned: Vec<AssignmentView>,
    pub total: usize,
}

// ---------- milestones ----------

#[derive(Debug, Serialize, Clone)]
pub struct MilestoneResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub deadline: NaiveDate,
    pub ordinal: i32,
    pub status: MilestoneStatus,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<milestone::Model> for MilestoneResponse {
    fn from(m: milestone::Model) -> Self {
        Self {
            id: m.id,
            event_id: m.event_id,
            name: m.name,
            description: m.description,
            deadline: m.deadline,
            ordinal: m.ordinal,
            status: m.status,
            is_active: m.is_active,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct MilestoneRef {
    pub id: Uuid,
    pub name: String,
    pub ordinal: i32,
}

impl From<&milestone::Model> for MilestoneRef {
    fn from(m: &milestone::Model) -> Self {
        Self {
            id: m.id,
            name: m.name.clone(),
            ordinal: m.ordinal,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MilestoneWithCount {
    #[serde(flatten)]
    pub milestone: MilestoneResponse,
    pub report_count: u64,
}

#[derive(Debug, Serialize)]
pub struct MilestoneDetail {
    #[serde(flatten)]
    pub milestone: MilestoneResponse,
    pub event: Option<EventRef>,
    pub reports: Vec<ProgressView>,
}

// ---------- progress reports ----------

#[derive(Debug, Serialize, Clone)]
pub struct ProgressResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub officer_id: Uuid,
    pub description: String,
    pub photo_urls: Vec<String>,
    pub report_date: NaiveDate,
    pub progress_percentage: i32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<progress_report::Model> for ProgressResponse {
    type Error = AppError;

    fn try_from(m: progress_report::Model) -> Result<Self, Self::Error> {
        let photo_urls = m.photos()?;
        Ok(Self {
            id: m.id,
            event_id: m.event_id,
            milestone_id: m.milestone_id,
            officer_id: m.officer_id,
            description: m.description,
            photo_urls,
            report_date: m.report_date,
            progress_percentage: m.progress_percentage,
            is_active: m.is_active,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ProgressView {
    #[serde(flatten)]
    pub report: ProgressResponse,
    pub officer: Option<UserRef>,
    pub milestone: Option<MilestoneRef>,
    pub event: Option<EventRef>,
}

/// Result of a standalone photo pre-upload.
#[derive(Debug, Serialize)]
pub struct UploadedPhotos {
    pub urls: Vec<String>,
    pub count: usize,
}

// ---------- dashboard ----------

#[derive(Debug, Serialize, Default, PartialEq, Eq)]
pub struct EventStatusCounts {
    pub planning: u64,
    pub on_progress: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub total: u64,
}

#[derive(Debug, Serialize, Clone)]
pub struct DeadlineItem {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub end_date: NaiveDate,
    pub status: EventStatus,
}

impl From<event::Model> for DeadlineItem {
    fn from(m: event::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            location: m.location,
            end_date: m.end_date,
            status: m.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeadlineDetails {
    pub events_near_deadline: Vec<DeadlineItem>,
    pub overdue_events: Vec<DeadlineItem>,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub events: EventStatusCounts,
    pub active_petugas: u64,
    pub total_progress_reports: u64,
    pub events_near_deadline: usize,
    pub overdue_events: usize,
    pub details: DeadlineDetails,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    pub milestone_progress: i64,
    pub latest_progress_percentage: i32,
    pub overall_progress: i64,
    pub completed_milestones: usize,
    pub total_milestones: usize,
}

#[derive(Debug, Serialize)]
pub struct EventProgressSummary {
    #[serde(flatten)]
    pub event: EventResponse,
    pub creator: Option<UserRef>,
    pub officers: Vec<UserRef>,
    pub report_count: u64,
    pub progress: ProgressSummary,
}

#[derive(Debug, Serialize)]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub description: String,
    pub user: Option<UserRef>,
    pub event: Option<EventRef>,
    pub milestone: Option<MilestoneRef>,
    pub progress_percentage: i32,
    pub report_date: NaiveDate,
    pub created_at: NaiveDateTime,
}
