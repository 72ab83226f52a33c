use axum::{extract::State, http::StatusCode, response::Json};
use uuid::Uuid;

use crate::manager::assignments::{self, AssignOfficers};
use crate::manager::events::{self, CreateEvent, EventFilter, UpdateEvent};
use crate::policy;
use crate::views::{AssignResult, AssignmentView, EventDetail, EventResponse, EventSummary};

use super::{
    ApiErr, ApiJson, ApiPath, ApiQuery, AppState,
    dto::{self, Envelope, ListEventsQuery, PaginatedEnvelope, Paged, StatusRequest},
    jwt::{AdminUser, CurrentUser},
};

pub async fn list_events(
    CurrentUser(viewer): CurrentUser,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListEventsQuery>,
) -> Result<Json<PaginatedEnvelope<EventSummary>>, ApiErr> {
    let req = params.page_request();
    let filter = EventFilter {
        status: params.status,
        search: params.search,
    };
    let page = events::list(&state.db, &viewer, filter, req).await?;
    Ok(dto::paginated("Events retrieved", page))
}

pub async fn get_event(
    CurrentUser(viewer): CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<EventDetail>>, ApiErr> {
    let access = policy::can_access_event(&state.db, &viewer, id).await?;
    let detail = events::get(&state.db, &access).await?;
    Ok(dto::ok("Event retrieved", detail))
}

pub async fn create_event(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateEvent>,
) -> Result<(StatusCode, Json<Envelope<EventSummary>>), ApiErr> {
    let event = events::create(&state.db, &admin, body).await?;
    Ok(dto::created("Event created", event))
}

pub async fn update_event(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateEvent>,
) -> Result<Json<Envelope<EventSummary>>, ApiErr> {
    let event = events::update(&state.db, &admin, id, body).await?;
    Ok(dto::ok("Event updated", event))
}

pub async fn delete_event(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiErr> {
    events::soft_delete(&state.db, &admin, id).await?;
    Ok(dto::done("Event deleted"))
}

pub async fn update_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<Json<Envelope<EventResponse>>, ApiErr> {
    let event = events::update_status(&state.db, &admin, id, &body.status).await?;
    Ok(dto::ok("Event status updated", event))
}

// ---------- assignments ----------

pub async fn list_assignments(
    CurrentUser(viewer): CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<Vec<AssignmentView>>>, ApiErr> {
    let access = policy::can_access_event(&state.db, &viewer, id).await?;
    let rows = assignments::list(&state.db, &access).await?;
    Ok(dto::ok("Assigned officers retrieved", rows))
}

pub async fn assign_officers(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<AssignOfficers>,
) -> Result<(StatusCode, Json<Envelope<AssignResult>>), ApiErr> {
    let result = assignments::assign(&state.db, &admin, id, body).await?;
    let message = format!("{} officer(s) assigned", result.total);
    Ok(dto::created(&message, result))
}

pub async fn remove_officer(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath((id, officer_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Envelope<()>>, ApiErr> {
    assignments::remove(&state.db, &admin, id, officer_id).await?;
    Ok(dto::done("Officer removed from event"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{
            jwt::{self, Claims},
            router,
        },
        auth::Auth,
        entity::{Role, user},
        photos::{MemoryHost, UploadLimits},
        testing,
    };
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, header},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    const JWT_SECRET: &str = "test-jwt-secret-key-32-chars-pad";

    async fn setup() -> (AppState, Router) {
        let db = testing::setup_db().await;
        let state = AppState {
            auth: Arc::new(Auth::new(db.clone())),
            db,
            jwt_secret: JWT_SECRET.to_string(),
            jwt_expiry_hours: 1,
            photos: Arc::new(MemoryHost::new()),
            upload: UploadLimits::default(),
        };
        (state.clone(), router(state, &[]))
    }

    fn request(method: Method, uri: &str, who: &user::Model, body: Option<serde_json::Value>) -> Request<Body> {
        let token = jwt::encode_jwt(&Claims::for_user(who, 1), JWT_SECRET).unwrap();
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_rejects_inverted_dates() {
        let (state, app) = setup().await;
        let admin = testing::insert_user(&state.db, "root", Role::Admin).await;
        let body = serde_json::json!({
            "name": "Gedung A",
            "location": "Bandung",
            "start_date": "2026-06-01",
            "end_date": "2026-05-01"
        });

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/events", &admin, Some(body)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["errors"][0]["field"], "end_date");

        let body = serde_json::json!({
            "name": "Gedung A",
            "location": "Bandung",
            "budget": "1500000.50",
            "start_date": "2026-05-01",
            "end_date": "2026-06-01"
        });
        let resp = app
            .oneshot(request(Method::POST, "/api/events", &admin, Some(body)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["status"], "planning");
        assert_eq!(body["data"]["creator"]["id"], admin.id.to_string());
    }

    #[tokio::test]
    async fn officer_access_follows_assignment() {
        let (state, app) = setup().await;
        let admin = testing::insert_user(&state.db, "root", Role::Admin).await;
        let officer = testing::insert_user(&state.db, "o1", Role::Petugas).await;
        let ev = testing::insert_event(&state.db, admin.id, "Bridge").await;
        let uri = format!("/api/events/{}", ev.id);

        let resp = app
            .clone()
            .oneshot(request(Method::GET, &uri, &officer, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // Unknown events look the same as unassigned ones to an officer.
        let resp = app
            .clone()
            .oneshot(request(
                Method::GET,
                &format!("/api/events/{}", Uuid::now_v7()),
                &officer,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let assign = serde_json::json!({ "petugas_ids": [officer.id] });
        let resp = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/api/events/{}/petugas", ev.id),
                &admin,
                Some(assign),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json_body(resp).await["data"]["total"], 1);

        let resp = app
            .clone()
            .oneshot(request(Method::GET, &uri, &officer, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(request(
                Method::DELETE,
                &format!("/api/events/{}/petugas/{}", ev.id, officer.id),
                &admin,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(request(Method::GET, &uri, &officer, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn soft_deleted_event_is_not_found_for_staff() {
        let (state, app) = setup().await;
        let admin = testing::insert_user(&state.db, "root", Role::Admin).await;
        let sup = testing::insert_user(&state.db, "sup", Role::Supervisor).await;
        let ev = testing::insert_event(&state.db, admin.id, "Bridge").await;
        let uri = format!("/api/events/{}", ev.id);

        let resp = app
            .clone()
            .oneshot(request(Method::DELETE, &uri, &sup, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .clone()
            .oneshot(request(Method::DELETE, &uri, &admin, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(request(Method::GET, &uri, &sup, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_transition_rejects_unknown() {
        let (state, app) = setup().await;
        let admin = testing::insert_user(&state.db, "root", Role::Admin).await;
        let ev = testing::insert_event(&state.db, admin.id, "Bridge").await;
        let uri = format!("/api/events/{}/status", ev.id);

        let resp = app
            .clone()
            .oneshot(request(
                Method::PATCH,
                &uri,
                &admin,
                Some(serde_json::json!({ "status": "archived" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(request(
                Method::PATCH,
                &uri,
                &admin,
                Some(serde_json::json!({ "status": "on_progress" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["data"]["status"], "on_progress");
    }
}
