use axum::{extract::State, http::StatusCode, response::Json};
use uuid::Uuid;

use crate::manager::users::{self, CreateUser, UpdateUser, UserFilter};
use crate::views::{UserDetail, UserResponse};

use super::{
    ApiErr, ApiJson, ApiPath, ApiQuery, AppState,
    dto::{self, Envelope, ListUsersQuery, PaginatedEnvelope, Paged},
    jwt::AdminUser,
};

pub async fn list_users(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListUsersQuery>,
) -> Result<Json<PaginatedEnvelope<UserResponse>>, ApiErr> {
    let req = params.page_request();
    let filter = UserFilter {
        role: params.role,
        is_active: params.is_active,
        search: params.search,
    };
    let page = users::list(&state.db, &admin, filter, req).await?;
    Ok(dto::paginated("Users retrieved", page))
}

pub async fn list_officers(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<UserResponse>>>, ApiErr> {
    let officers = users::list_officers(&state.db, &admin).await?;
    Ok(dto::ok("Officers retrieved", officers))
}

pub async fn get_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<UserDetail>>, ApiErr> {
    let user = users::get(&state.db, &admin, id).await?;
    Ok(dto::ok("User retrieved", user))
}

pub async fn create_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateUser>,
) -> Result<(StatusCode, Json<Envelope<UserResponse>>), ApiErr> {
    let user = users::create(&state.db, &admin, body).await?;
    Ok(dto::created("User created", user))
}

pub async fn update_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateUser>,
) -> Result<Json<Envelope<UserResponse>>, ApiErr> {
    let user = users::update(&state.db, &admin, id, body).await?;
    Ok(dto::ok("User updated", user))
}

pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiErr> {
    users::deactivate(&state.db, &admin, id).await?;
    Ok(dto::done("User deactivated"))
}

pub async fn toggle_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<UserResponse>>, ApiErr> {
    let user = users::toggle_status(&state.db, &admin, id).await?;
    let message = if user.is_active {
        "User activated"
    } else {
        "User deactivated"
    };
    Ok(dto::ok(message, user))
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

    fn token(user: &user::Model) -> String {
        jwt::encode_jwt(&Claims::for_user(user, 1), JWT_SECRET).unwrap()
    }

    fn request(method: Method, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
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
    async fn non_admin_is_forbidden() {
        let (state, app) = setup().await;
        let sup = testing::insert_user(&state.db, "sup", Role::Supervisor).await;

        let resp = app
            .oneshot(request(Method::GET, "/api/users", &token(&sup), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(resp).await["message"], "Access denied. Admin only");
    }

    #[tokio::test]
    async fn create_then_duplicate_conflicts() {
        let (state, app) = setup().await;
        let admin = testing::insert_user(&state.db, "root", Role::Admin).await;
        let body = serde_json::json!({
            "username": "petugas9",
            "email": "p9@example.com",
            "password": "secret1",
            "role": "petugas",
            "display_name": "Petugas Sembilan"
        });

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/users", &token(&admin), Some(body.clone())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json_body(resp).await["data"]["role"], "petugas");

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/users", &token(&admin), Some(body)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = app
            .oneshot(request(Method::GET, "/api/users?role=petugas&limit=5", &token(&admin), None))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["pagination"]["limit"], 5);
    }

    #[tokio::test]
    async fn bad_input_lists_every_field() {
        let (state, app) = setup().await;
        let admin = testing::insert_user(&state.db, "root", Role::Admin).await;
        let body = serde_json::json!({
            "username": "ab",
            "email": "not-an-email",
            "password": "123",
            "role": "boss",
            "display_name": ""
        });

        let resp = app
            .oneshot(request(Method::POST, "/api/users", &token(&admin), Some(body)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["errors"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn cannot_deactivate_self_and_toggle_others() {
        let (state, app) = setup().await;
        let admin = testing::insert_user(&state.db, "root", Role::Admin).await;
        let officer = testing::insert_user(&state.db, "o1", Role::Petugas).await;

        let resp = app
            .clone()
            .oneshot(request(
                Method::DELETE,
                &format!("/api/users/{}", admin.id),
                &token(&admin),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(request(
                Method::PATCH,
                &format!("/api/users/{}/status", officer.id),
                &token(&admin),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["data"]["is_active"], false);

        let resp = app
            .oneshot(request(Method::GET, "/api/users/not-a-uuid", &token(&admin), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
