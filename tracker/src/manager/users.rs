use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{Auth, NewUser};
use crate::entity::{Role, event, event_assignment, progress_report, user};
use crate::error::{AppError, Violations};
use crate::policy::AdminOnly;
use crate::views::{UserCounts, UserDetail, UserResponse};

use super::{Page, PageRequest, fetch_page, non_blank, search_term};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    pub username: String,
    #[validate(email(message = "Email is not valid"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub role: String,
    pub display_name: String,
    pub profile_photo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Email is not valid"))]
    pub email: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
    pub role: Option<String>,
    pub display_name: Option<String>,
    pub profile_photo: Option<String>,
}

fn parse_role(raw: &str, v: &mut Violations) -> Option<Role> {
    let role = Role::parse(raw);
    if role.is_none() {
        v.add("role", "role", "Role must be one of admin, supervisor, petugas");
    }
    role
}

async fn find_user(db: &DatabaseConnection, id: Uuid) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

async fn ensure_unique(
    db: &DatabaseConnection,
    username: Option<&str>,
    email: Option<&str>,
    except: Option<Uuid>,
) -> Result<(), AppError> {
    let scope = |cond: Condition| match except {
        Some(id) => cond.add(user::Column::Id.ne(id)),
        None => cond,
    };
    if let Some(username) = username {
        let taken = user::Entity::find()
            .filter(scope(Condition::all().add(user::Column::Username.eq(username))))
            .count(db)
            .await?;
        if taken > 0 {
            return Err(AppError::conflict("Username is already taken"));
        }
    }
    if let Some(email) = email {
        let taken = user::Entity::find()
            .filter(scope(Condition::all().add(user::Column::Email.eq(email))))
            .count(db)
            .await?;
        if taken > 0 {
            return Err(AppError::conflict("Email is already in use"));
        }
    }
    Ok(())
}

/// Paginated user list, newest first. `search` matches username, email or
/// display name.
pub async fn list(
    db: &DatabaseConnection,
    _admin: &AdminOnly,
    filter: UserFilter,
    req: PageRequest,
) -> Result<Page<UserResponse>, AppError> {
    let mut query = user::Entity::find();

    if let Some(raw) = filter.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        let role = Role::parse(raw).ok_or_else(|| {
            AppError::invalid("role", "Role must be one of admin, supervisor, petugas")
        })?;
        query = query.filter(user::Column::Role.eq(role));
    }
    if let Some(is_active) = filter.is_active {
        query = query.filter(user::Column::IsActive.eq(is_active));
    }
    if let Some(term) = search_term(filter.search.as_deref()) {
        query = query.filter(
            Condition::any()
                .add(user::Column::Username.contains(&term))
                .add(user::Column::Email.contains(&term))
                .add(user::Column::DisplayName.contains(&term)),
        );
    }

    let (rows, total) = fetch_page(db, query.order_by_desc(user::Column::CreatedAt), req).await?;
    Ok(Page::new(
        rows.into_iter().map(UserResponse::from).collect(),
        req,
        total,
    ))
}

/// Active officers ordered by display name, for the assignment picker.
pub async fn list_officers(
    db: &DatabaseConnection,
    _admin: &AdminOnly,
) -> Result<Vec<UserResponse>, AppError> {
    let rows = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Petugas))
        .filter(user::Column::IsActive.eq(true))
        .order_by_asc(user::Column::DisplayName)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(UserResponse::from).collect())
}

pub async fn get(db: &DatabaseConnection, _admin: &AdminOnly, id: Uuid) -> Result<UserDetail, AppError> {
    let user = find_user(db, id).await?;

    let counts = UserCounts {
        created_events: event::Entity::find()
            .filter(event::Column::CreatedBy.eq(id))
            .count(db)
            .await?,
        assignments: event_assignment::Entity::find()
            .filter(event_assignment::Column::OfficerId.eq(id))
            .count(db)
            .await?,
        progress_reports: progress_report::Entity::find()
            .filter(progress_report::Column::OfficerId.eq(id))
            .count(db)
            .await?,
    };

    Ok(UserDetail {
        user: UserResponse::from(user),
        counts,
    })
}

pub async fn create(
    db: &DatabaseConnection,
    _admin: &AdminOnly,
    mut input: CreateUser,
) -> Result<UserResponse, AppError> {
    input.username = input.username.trim().to_string();
    input.email = input.email.trim().to_string();
    input.display_name = input.display_name.trim().to_string();

    let mut v = Violations::from_result(input.validate());
    let role = parse_role(&input.role, &mut v);
    if input.display_name.is_empty() {
        v.add("display_name", "required", "Display name is required");
    }
    v.finish()?;
    let role = role.ok_or_else(|| AppError::invalid("role", "Role is required"))?;

    ensure_unique(db, Some(&input.username), Some(&input.email), None).await?;

    let created = Auth::new(db.clone())
        .create_user(NewUser {
            username: input.username,
            email: input.email,
            password: input.password,
            role,
            display_name: input.display_name,
            profile_photo: non_blank(input.profile_photo),
        })
        .await?;

    tracing::info!(user_id = %created.id, username = %created.username, role = created.role.as_str(), "user created");
    Ok(UserResponse::from(created))
}

pub async fn update(
    db: &DatabaseConnection,
    _admin: &AdminOnly,
    id: Uuid,
    mut input: UpdateUser,
) -> Result<UserResponse, AppError> {
    input.username = input.username.map(|s| s.trim().to_string());
    input.email = input.email.map(|s| s.trim().to_string());

    let mut v = Violations::from_result(input.validate());
    let role = input.role.as_deref().and_then(|r| parse_role(r, &mut v));
    if let Some(name) = &input.display_name
        && name.trim().is_empty()
    {
        v.add("display_name", "required", "Display name is required");
    }
    v.finish()?;

    let user = find_user(db, id).await?;

    let new_username = input.username.filter(|u| *u != user.username);
    let new_email = input.email.filter(|e| *e != user.email);
    ensure_unique(db, new_username.as_deref(), new_email.as_deref(), Some(id)).await?;

    let mut active: user::ActiveModel = user.into();
    if let Some(username) = new_username {
        active.username = Set(username);
    }
    if let Some(email) = new_email {
        active.email = Set(email);
    }
    if let Some(role) = role {
        active.role = Set(role);
    }
    if let Some(display_name) = input.display_name {
        active.display_name = Set(display_name.trim().to_string());
    }
    if let Some(photo) = input.profile_photo {
        active.profile_photo = Set(non_blank(Some(photo)));
    }
    if let Some(password) = input.password {
        active.password_hash = Set(Auth::hash_password(&password)?);
    }
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active.update(db).await?;
    Ok(UserResponse::from(updated))
}

/// Soft delete. Admins cannot deactivate themselves.
pub async fn deactivate(db: &DatabaseConnection, admin: &AdminOnly, id: Uuid) -> Result<(), AppError> {
    let user = find_user(db, id).await?;
    if admin.identity().id == id {
        return Err(AppError::invalid("id", "You cannot deactivate your own account"));
    }

    let mut active: user::ActiveModel = user.into();
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now().naive_utc());
    active.update(db).await?;

    tracing::info!(user_id = %id, by = %admin.identity().id, "user deactivated");
    Ok(())
}

pub async fn toggle_status(
    db: &DatabaseConnection,
    admin: &AdminOnly,
    id: Uuid,
) -> Result<UserResponse, AppError> {
    let user = find_user(db, id).await?;
    if admin.identity().id == id {
        return Err(AppError::invalid("id", "You cannot change the status of your own account"));
    }

    let next = !user.is_active;
    let mut active: user::ActiveModel = user.into();
    active.is_active = Set(next);
    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active.update(db).await?;
    Ok(UserResponse::from(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Identity;
    use crate::testing;

    fn as_admin(m: &user::Model) -> AdminOnly {
        Identity::from(m).require_admin().unwrap()
    }

    fn create_input(username: &str) -> CreateUser {
        CreateUser {
            username: username.into(),
            email: format!("{username}@example.com"),
            password: "secret1".into(),
            role: "petugas".into(),
            display_name: "Field Officer".into(),
            profile_photo: None,
        }
    }

    #[tokio::test]
    async fn create_validates_every_field() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;

        let err = create(
            &db,
            &as_admin(&admin),
            CreateUser {
                username: "ab".into(),
                email: "bad".into(),
                password: "123".into(),
                role: "janitor".into(),
                display_name: "  ".into(),
                profile_photo: None,
            },
        )
        .await
        .unwrap_err();

        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["display_name", "email", "password", "role", "username"]);
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let cap = as_admin(&admin);

        create(&db, &cap, create_input("budi")).await.unwrap();
        let err = create(&db, &cap, create_input("budi")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let mut same_email = create_input("budi2");
        same_email.email = "budi@example.com".into();
        let err = create(&db, &cap, same_email).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_filters_role_and_search() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        testing::insert_user(&db, "andi", Role::Petugas).await;
        testing::insert_user(&db, "sari", Role::Petugas).await;
        testing::insert_user(&db, "boss", Role::Supervisor).await;
        let cap = as_admin(&admin);

        let officers = list(
            &db,
            &cap,
            UserFilter {
                role: Some("petugas".into()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
        assert_eq!(officers.total, 2);

        let found = list(
            &db,
            &cap,
            UserFilter {
                search: Some("sar".into()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].username, "sari");

        let err = list(
            &db,
            &cap,
            UserFilter {
                role: Some("king".into()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn list_officers_skips_inactive() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        testing::insert_user(&db, "andi", Role::Petugas).await;
        let gone = testing::insert_user(&db, "gone", Role::Petugas).await;
        testing::deactivate(&db, gone.id).await;

        let officers = list_officers(&db, &as_admin(&admin)).await.unwrap();
        assert_eq!(officers.len(), 1);
        assert_eq!(officers[0].username, "andi");
    }

    #[tokio::test]
    async fn update_rechecks_uniqueness_and_rehashes_password() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let target = testing::insert_user(&db, "andi", Role::Petugas).await;
        testing::insert_user(&db, "sari", Role::Petugas).await;
        let cap = as_admin(&admin);

        let err = update(
            &db,
            &cap,
            target.id,
            UpdateUser {
                username: Some("sari".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Keeping one's own username is not a conflict.
        let updated = update(
            &db,
            &cap,
            target.id,
            UpdateUser {
                username: Some("andi".into()),
                role: Some("supervisor".into()),
                password: Some("brand-new".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.role, Role::Supervisor);

        let row = find_user(&db, target.id).await.unwrap();
        assert!(Auth::verify_password(&row.password_hash, "brand-new").unwrap());
    }

    #[tokio::test]
    async fn cannot_deactivate_or_toggle_self() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let cap = as_admin(&admin);

        let err = deactivate(&db, &cap, admin.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = toggle_status(&db, &cap, admin.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn deactivate_and_toggle_other_user() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let target = testing::insert_user(&db, "andi", Role::Petugas).await;
        let cap = as_admin(&admin);

        deactivate(&db, &cap, target.id).await.unwrap();
        assert!(!find_user(&db, target.id).await.unwrap().is_active);

        let toggled = toggle_status(&db, &cap, target.id).await.unwrap();
        assert!(toggled.is_active);

        let err = deactivate(&db, &cap, Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_counts_related_rows() {
        let db = testing::setup_db().await;
        let admin = testing::insert_user(&db, "root", Role::Admin).await;
        let officer = testing::insert_user(&db, "andi", Role::Petugas).await;
        let ev = testing::insert_event(&db, admin.id, "Bridge").await;
        testing::assign(&db, ev.id, officer.id, admin.id).await;
        testing::insert_report(&db, ev.id, officer.id, &["u1"]).await;
        let cap = as_admin(&admin);

        let detail = get(&db, &cap, officer.id).await.unwrap();
        assert_eq!(detail.counts.assignments, 1);
        assert_eq!(detail.counts.progress_reports, 1);
        assert_eq!(get(&db, &cap, admin.id).await.unwrap().counts.created_events, 1);
    }
}
