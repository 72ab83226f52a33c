use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use password_hash::SaltString;
use rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use uuid::Uuid;

use crate::entity::{Role, user};
use crate::error::AppError;

/// Fields for a new account. Callers are responsible for validating them.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub display_name: String,
    pub profile_photo: Option<String>,
}

pub struct Auth {
    db: DatabaseConnection,
}

impl Auth {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Expose the underlying DB connection for direct SeaORM queries.
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Verify username/password and stamp `last_login_at`.
    ///
    /// The active flag is checked before the password, so a deactivated
    /// account is reported as such rather than as a bad password.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<user::Model, AppError> {
        let user = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::unauthorized("Invalid username or password"))?;

        if !user.is_active {
            return Err(AppError::forbidden(
                "Your account is inactive. Contact an administrator",
            ));
        }

        if !Self::verify_password(&user.password_hash, password)? {
            return Err(AppError::unauthorized("Invalid username or password"));
        }

        let mut active: user::ActiveModel = user.into();
        active.last_login_at = Set(Some(Utc::now().naive_utc()));
        Ok(active.update(&self.db).await?)
    }

    /// Insert a new user with an Argon2-hashed password.
    pub async fn create_user(&self, new: NewUser) -> Result<user::Model, AppError> {
        let password_hash = Self::hash_password(&new.password)?;
        let now = Utc::now().naive_utc();
        let model = user::ActiveModel {
            id: Set(Uuid::now_v7()),
            username: Set(new.username),
            email: Set(new.email),
            password_hash: Set(password_hash),
            role: Set(new.role),
            display_name: Set(new.display_name),
            is_active: Set(true),
            profile_photo: Set(new.profile_photo),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;
        Ok(model)
    }

    /// Replace the caller's password after checking the old one.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = user::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if !Self::verify_password(&user.password_hash, old_password)? {
            return Err(AppError::unauthorized("Old password does not match"));
        }

        let hash = Self::hash_password(new_password)?;
        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(hash);
        active.updated_at = Set(Utc::now().naive_utc());
        active.update(&self.db).await?;
        Ok(())
    }

    /// Return the total number of users in the store.
    pub async fn count_users(&self) -> Result<u64, AppError> {
        Ok(user::Entity::find().count(&self.db).await?)
    }

    /// Hash a plaintext password with Argon2id + a random salt.
    pub fn hash_password(password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(AppError::internal)?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
    pub fn verify_password(stored_hash: &str, password: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(stored_hash).map_err(AppError::internal)?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}
