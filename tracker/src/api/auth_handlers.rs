use axum::{extract::State, response::Json};
use sea_orm::EntityTrait;
use validator::Validate;

use crate::entity::user;
use crate::error::AppError;
use crate::views::UserResponse;

use super::{
    ApiErr, ApiJson, AppState,
    dto::{self, ChangePasswordRequest, Envelope, LoginRequest, LoginResponse},
    jwt::{Claims, CurrentUser, encode_jwt},
};

pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<Envelope<LoginResponse>>, ApiErr> {
    body.validate().map_err(AppError::from)?;

    let user = state.auth.authenticate(&body.username, &body.password).await?;
    let claims = Claims::for_user(&user, state.jwt_expiry_hours);
    let token = encode_jwt(&claims, &state.jwt_secret).map_err(AppError::internal)?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "login");
    Ok(dto::ok(
        "Login successful",
        LoginResponse {
            token,
            user: UserResponse::from(user),
        },
    ))
}

/// Tokens are stateless; logging out is the client discarding its token.
pub async fn logout(CurrentUser(_): CurrentUser) -> Json<Envelope<()>> {
    dto::done("Logout successful")
}

pub async fn me(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Envelope<UserResponse>>, ApiErr> {
    let user = user::Entity::find_by_id(identity.id)
        .one(&state.db)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(dto::ok("Profile retrieved", UserResponse::from(user)))
}

pub async fn change_password(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> Result<Json<Envelope<()>>, ApiErr> {
    body.validate().map_err(AppError::from)?;

    state
        .auth
        .change_password(identity.id, &body.old_password, &body.new_password)
        .await?;

    tracing::info!(user_id = %identity.id, "password changed");
    Ok(dto::done("Password changed successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{jwt, router},
        auth::{Auth, NewUser},
        entity::Role,
        photos::{MemoryHost, UploadLimits},
        testing,
    };
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, StatusCode, header},
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
        let app = router(state.clone(), &[]);
        (state, app)
    }

    async fn create_user(state: &AppState, username: &str, role: Role) -> user::Model {
        state
            .auth
            .create_user(NewUser {
                username: username.into(),
                email: format!("{username}@example.com"),
                password: "password123".into(),
                role,
                display_name: username.into(),
                profile_photo: None,
            })
            .await
            .unwrap()
    }

    fn login_request(username: &str, password: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "username": username, "password": password }).to_string(),
            ))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn login_returns_token_for_role() {
        let (state, app) = setup().await;
        create_user(&state, "supervisor", Role::Supervisor).await;

        let resp = app.oneshot(login_request("supervisor", "password123")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["user"]["role"], "supervisor");
        assert!(body["data"]["user"].get("password_hash").is_none());

        let token = body["data"]["token"].as_str().unwrap();
        let claims = jwt::decode_jwt(token, JWT_SECRET).unwrap();
        assert_eq!(claims.role, Role::Supervisor);
    }

    #[tokio::test]
    async fn login_failures() {
        let (state, app) = setup().await;
        let user = create_user(&state, "petugas1", Role::Petugas).await;

        let resp = app
            .clone()
            .oneshot(login_request("petugas1", "wrong"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.clone().oneshot(login_request("", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["errors"].as_array().unwrap().len(), 2);

        testing::deactivate(&state.db, user.id).await;
        let resp = app.oneshot(login_request("petugas1", "password123")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn inactive_user_with_valid_token_is_forbidden() {
        let (state, app) = setup().await;
        let user = create_user(&state, "petugas1", Role::Petugas).await;
        let token = encode_jwt(&Claims::for_user(&user, 1), JWT_SECRET).unwrap();

        let me = |token: &str| {
            Request::get("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };

        let resp = app.clone().oneshot(me(&token)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["data"]["username"], "petugas1");

        testing::deactivate(&state.db, user.id).await;
        let resp = app.oneshot(me(&token)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn change_password_checks_old() {
        let (state, app) = setup().await;
        let user = create_user(&state, "admin", Role::Admin).await;
        let token = encode_jwt(&Claims::for_user(&user, 1), JWT_SECRET).unwrap();

        let change = |old: &str, new: &str| {
            Request::builder()
                .method(Method::PUT)
                .uri("/api/auth/change-password")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "old_password": old, "new_password": new }).to_string(),
                ))
                .unwrap()
        };

        let resp = app.clone().oneshot(change("nope", "newpass1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.clone().oneshot(change("password123", "123")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.clone().oneshot(change("password123", "newpass1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.oneshot(login_request("admin", "newpass1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
