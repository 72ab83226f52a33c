use axum::{http::StatusCode, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::manager::{Page, PageRequest};
use crate::views::UserResponse;

// ---------- envelopes ----------

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct PaginatedEnvelope<T> {
    pub success: bool,
    pub message: String,
    pub data: Vec<T>,
    pub pagination: Pagination,
}

pub fn ok<T: Serialize>(message: &str, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: message.to_string(),
        data: Some(data),
    })
}

pub fn created<T: Serialize>(message: &str, data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, ok(message, data))
}

/// Success without a payload.
pub fn done(message: &str) -> Json<Envelope<()>> {
    Json(Envelope {
        success: true,
        message: message.to_string(),
        data: None,
    })
}

pub fn paginated<T: Serialize>(message: &str, page: Page<T>) -> Json<PaginatedEnvelope<T>> {
    Json(PaginatedEnvelope {
        success: true,
        message: message.to_string(),
        pagination: Pagination {
            page: page.page,
            limit: page.limit,
            total: page.total,
            total_pages: page.total_pages,
        },
        data: page.items,
    })
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

// ---------- auth ----------

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Old password is required"))]
    pub old_password: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters"))]
    pub new_password: String,
}

// ---------- queries ----------

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListProgressQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub event_id: Option<String>,
    pub milestone_id: Option<String>,
    #[serde(alias = "petugas_id")]
    pub officer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub status: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}

/// Page parameters shared by every paginated list.
pub trait Paged {
    fn page_params(&self) -> (Option<u64>, Option<u64>);

    fn page_request(&self) -> PageRequest {
        let (page, limit) = self.page_params();
        PageRequest::new(page, limit)
    }
}

impl Paged for ListUsersQuery {
    fn page_params(&self) -> (Option<u64>, Option<u64>) {
        (self.page, self.limit)
    }
}

impl Paged for ListEventsQuery {
    fn page_params(&self) -> (Option<u64>, Option<u64>) {
        (self.page, self.limit)
    }
}

impl Paged for ListProgressQuery {
    fn page_params(&self) -> (Option<u64>, Option<u64>) {
        (self.page, self.limit)
    }
}

// ---------- bodies ----------

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}
