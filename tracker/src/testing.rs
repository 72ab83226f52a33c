//! Fixtures shared by the unit tests.

use chrono::{Duration, NaiveDate, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use crate::entity::{
    EventStatus, MilestoneStatus, Role, event, event_assignment, milestone, progress_report, user,
};

pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub async fn insert_user(db: &DatabaseConnection, username: &str, role: Role) -> user::Model {
    let now = Utc::now().naive_utc();
    user::ActiveModel {
        id: Set(Uuid::now_v7()),
        username: Set(username.to_string()),
        email: Set(format!("{username}@example.com")),
        password_hash: Set("hash".to_string()),
        role: Set(role),
        display_name: Set(format!("{username} display")),
        is_active: Set(true),
        profile_photo: Set(None),
        last_login_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn deactivate(db: &DatabaseConnection, user_id: Uuid) {
    let row = user::Entity::find_by_id(user_id).one(db).await.unwrap().unwrap();
    let mut active: user::ActiveModel = row.into();
    active.is_active = Set(false);
    active.update(db).await.unwrap();
}

pub async fn insert_event(db: &DatabaseConnection, creator: Uuid, name: &str) -> event::Model {
    let now = Utc::now().naive_utc();
    event::ActiveModel {
        id: Set(Uuid::now_v7()),
        name: Set(name.to_string()),
        location: Set("Jakarta".to_string()),
        description: Set(None),
        budget: Set(None),
        start_date: Set(today()),
        end_date: Set(today() + Duration::days(30)),
        status: Set(EventStatus::Planning),
        is_active: Set(true),
        created_by: Set(creator),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn assign(db: &DatabaseConnection, event_id: Uuid, officer_id: Uuid, by: Uuid) {
    event_assignment::ActiveModel {
        id: Set(Uuid::now_v7()),
        event_id: Set(event_id),
        officer_id: Set(officer_id),
        assigned_by: Set(by),
        assigned_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .unwrap();
}

pub async fn insert_milestone(
    db: &DatabaseConnection,
    event_id: Uuid,
    ordinal: i32,
    status: MilestoneStatus,
) -> milestone::Model {
    let now = Utc::now().naive_utc();
    milestone::ActiveModel {
        id: Set(Uuid::now_v7()),
        event_id: Set(event_id),
        name: Set(format!("Step {ordinal}")),
        description: Set(None),
        deadline: Set(today() + Duration::days(ordinal as i64 * 7)),
        ordinal: Set(ordinal),
        status: Set(status),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_report(
    db: &DatabaseConnection,
    event_id: Uuid,
    officer_id: Uuid,
    photos: &[&str],
) -> progress_report::Model {
    let now = Utc::now().naive_utc();
    progress_report::ActiveModel {
        id: Set(Uuid::now_v7()),
        event_id: Set(event_id),
        milestone_id: Set(None),
        officer_id: Set(officer_id),
        description: Set("Foundation poured".to_string()),
        photo_urls: Set(serde_json::to_string(photos).unwrap()),
        report_date: Set(today()),
        progress_percentage: Set(40),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}
