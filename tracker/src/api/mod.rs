use std::sync::Arc;

use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRequest, FromRequestParts, Request,
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::cors::CorsLayer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::set_header::response::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::auth::Auth;
use crate::error::{AppError, FieldError};
use crate::photos::{PhotoHost, UploadLimits};

pub mod auth_handlers;
pub mod dashboard_handlers;
pub mod dto;
pub mod event_handlers;
pub mod jwt;
pub mod milestone_handlers;
pub mod progress_handlers;
pub mod upload_handlers;
pub mod user_handlers;

// ---------- shared state ----------

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub auth: Arc<Auth>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub photos: Arc<dyn PhotoHost>,
    pub upload: UploadLimits,
}

// ---------- error type ----------

/// A JSON error envelope: `{"success": false, "message": "...", "errors": [...]}`.
#[derive(Debug)]
pub struct ApiErr {
    status: StatusCode,
    message: String,
    errors: Vec<FieldError>,
}

impl ApiErr {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            errors: Vec::new(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AppError> for ApiErr {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Unauthorized(msg) => Self::new(StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => Self::new(StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => Self::new(StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => Self::new(StatusCode::CONFLICT, msg),
            AppError::Validation(errors) => Self {
                status: StatusCode::BAD_REQUEST,
                message: "Validation failed".into(),
                errors,
            },
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl From<JsonRejection> for ApiErr {
    fn from(e: JsonRejection) -> Self {
        Self::new(e.status(), e.body_text())
    }
}

impl From<QueryRejection> for ApiErr {
    fn from(e: QueryRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}

impl From<PathRejection> for ApiErr {
    fn from(e: PathRejection) -> Self {
        Self::new(e.status(), e.body_text())
    }
}

impl From<MultipartRejection> for ApiErr {
    fn from(e: MultipartRejection) -> Self {
        Self::new(e.status(), e.body_text())
    }
}

impl From<MultipartError> for ApiErr {
    fn from(e: MultipartError) -> Self {
        Self::new(e.status(), e.body_text())
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({ "success": false, "message": self.message });
        if !self.errors.is_empty() {
            body["errors"] = serde_json::json!(self.errors);
        }
        (self.status, Json(body)).into_response()
    }
}

// ---------- extractors with envelope rejections ----------

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiErr))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiErr))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiErr))]
pub struct ApiPath<T>(pub T);

/// `Multipart` has no type parameter, so it cannot go through `via(...)`.
pub struct ApiMultipart(pub Multipart);

impl<S: Send + Sync> FromRequest<S> for ApiMultipart {
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(Multipart::from_request(req, state).await?))
    }
}

// ---------- router ----------

pub fn router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let allowed_origins: Vec<HeaderValue> = cors_allowed_origins
        .iter()
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = if allowed_origins.is_empty() {
        CorsLayer::new() // no origins allowed = same-origin only
    } else {
        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
    };

    let body_limit = state.upload.body_limit();

    Router::new()
        .route("/health", get(health))
        .nest("/api", api())
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(NormalizePathLayer::trim_trailing_slash())
        .with_state(state)
}

fn api() -> Router<AppState> {
    Router::new()
        // auth
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/logout", post(auth_handlers::logout))
        .route("/auth/me", get(auth_handlers::me))
        .route("/auth/change-password", put(auth_handlers::change_password))
        // users
        .route(
            "/users",
            get(user_handlers::list_users).post(user_handlers::create_user),
        )
        .route("/users/petugas", get(user_handlers::list_officers))
        .route(
            "/users/{id}",
            get(user_handlers::get_user)
                .put(user_handlers::update_user)
                .delete(user_handlers::delete_user),
        )
        .route("/users/{id}/status", patch(user_handlers::toggle_status))
        // events
        .route(
            "/events",
            get(event_handlers::list_events).post(event_handlers::create_event),
        )
        .route(
            "/events/{id}",
            get(event_handlers::get_event)
                .put(event_handlers::update_event)
                .delete(event_handlers::delete_event),
        )
        .route("/events/{id}/status", patch(event_handlers::update_status))
        // assignments
        .route(
            "/events/{id}/petugas",
            get(event_handlers::list_assignments).post(event_handlers::assign_officers),
        )
        .route(
            "/events/{id}/petugas/{officer_id}",
            axum::routing::delete(event_handlers::remove_officer),
        )
        // milestones
        .route(
            "/events/{id}/milestones",
            get(milestone_handlers::list_for_event).post(milestone_handlers::create_milestone),
        )
        .route(
            "/milestones/{id}",
            get(milestone_handlers::get_milestone)
                .put(milestone_handlers::update_milestone)
                .delete(milestone_handlers::delete_milestone),
        )
        .route(
            "/milestones/{id}/status",
            patch(milestone_handlers::update_status),
        )
        // progress reports
        .route(
            "/events/{id}/progress",
            get(progress_handlers::list_for_event).post(progress_handlers::create_progress),
        )
        .route("/progress", get(progress_handlers::list_progress))
        .route(
            "/progress/{id}",
            get(progress_handlers::get_progress)
                .put(progress_handlers::update_progress)
                .delete(progress_handlers::delete_progress),
        )
        // dashboard
        .route("/dashboard/stats", get(dashboard_handlers::stats))
        .route(
            "/dashboard/events-summary",
            get(dashboard_handlers::events_summary),
        )
        .route(
            "/dashboard/recent-activities",
            get(dashboard_handlers::recent_activities),
        )
        // uploads
        .route(
            "/upload/progress-photos",
            post(upload_handlers::upload_progress_photos),
        )
}

/// Serve `app` until `shutdown` resolves, then close the store.
pub async fn run(
    listener: tokio::net::TcpListener,
    app: Router,
    db: DatabaseConnection,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(AppError::internal)?;
    db.close().await?;
    tracing::info!("server stopped, store closed");
    Ok(())
}

async fn health() -> Json<dto::Envelope<dto::Health>> {
    dto::ok(
        "Tender tracker is running",
        dto::Health {
            status: "ok",
            timestamp: chrono::Utc::now(),
        },
    )
}

async fn route_not_found() -> ApiErr {
    AppError::not_found("Route not found").into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::photos::MemoryHost;
    use crate::testing;

    async fn app() -> Router {
        let db = testing::setup_db().await;
        let state = AppState {
            auth: Arc::new(Auth::new(db.clone())),
            db,
            jwt_secret: "test-jwt-secret-key-32-chars-pad".into(),
            jwt_expiry_hours: 1,
            photos: Arc::new(MemoryHost::new()),
            upload: UploadLimits::default(),
        };
        router(state, &[])
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn validation_errors_keep_field_list() {
        let resp = ApiErr::from(AppError::invalid("name", "Name is required"));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.errors.len(), 1);
    }

    #[test]
    fn internal_detail_is_hidden() {
        let err = ApiErr::from(AppError::internal("connection refused to 10.0.0.5"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }

    #[tokio::test]
    async fn health_and_unknown_route() {
        let app = app().await;

        let resp = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
        assert_eq!(json_body(resp).await["data"]["status"], "ok");

        let resp = app
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Route not found");
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized_envelope() {
        let resp = app()
            .await
            .oneshot(Request::get("/api/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["success"], false);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request_envelope() {
        let resp = app()
            .await
            .oneshot(
                Request::post("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["success"], false);
    }

    #[tokio::test]
    async fn non_multipart_upload_is_bad_request_envelope() {
        let db = testing::setup_db().await;
        let officer = testing::insert_user(&db, "o1", crate::entity::Role::Petugas).await;
        let token = jwt::encode_jwt(
            &jwt::Claims::for_user(&officer, 1),
            "test-jwt-secret-key-32-chars-pad",
        )
        .unwrap();
        let state = AppState {
            auth: Arc::new(Auth::new(db.clone())),
            db,
            jwt_secret: "test-jwt-secret-key-32-chars-pad".into(),
            jwt_expiry_hours: 1,
            photos: Arc::new(MemoryHost::new()),
            upload: UploadLimits::default(),
        };

        let resp = router(state, &[])
            .oneshot(
                Request::post("/api/upload/progress-photos")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["success"], false);
    }

    #[tokio::test]
    async fn run_closes_the_store_on_shutdown() {
        use sea_orm::{EntityTrait, PaginatorTrait};

        let db = testing::setup_db().await;
        let reader = db.clone();
        let state = AppState {
            auth: Arc::new(Auth::new(db.clone())),
            db: db.clone(),
            jwt_secret: "test-jwt-secret-key-32-chars-pad".into(),
            jwt_expiry_hours: 1,
            photos: Arc::new(MemoryHost::new()),
            upload: UploadLimits::default(),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

        run(listener, router(state, &[]), db, async {}).await.unwrap();

        assert!(crate::entity::user::Entity::find().count(&reader).await.is_err());
    }
}
