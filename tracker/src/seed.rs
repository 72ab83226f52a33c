//! Demo data for a fresh store: one admin, one supervisor, three officers,
//! three tenders with assignments, milestones and two progress reports.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

use crate::auth::{Auth, NewUser};
use crate::entity::{
    EventStatus, MilestoneStatus, Role, event, event_assignment, milestone, progress_report, user,
};
use crate::error::AppError;

pub const DEMO_PASSWORD: &str = "password123";

#[derive(Debug, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded,
    /// The store already had users; nothing was written.
    Skipped,
}

fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate, AppError> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| AppError::internal(format!("bad seed date {y}-{m}-{d}")))
}

async fn demo_user(
    auth: &Auth,
    username: &str,
    role: Role,
    display_name: &str,
) -> Result<user::Model, AppError> {
    auth.create_user(NewUser {
        username: username.to_string(),
        email: format!("{username}@tender.com"),
        password: DEMO_PASSWORD.to_string(),
        role,
        display_name: display_name.to_string(),
        profile_photo: None,
    })
    .await
}

struct EventSeed<'a> {
    name: &'a str,
    location: &'a str,
    description: &'a str,
    budget: i64,
    start: NaiveDate,
    end: NaiveDate,
    status: EventStatus,
}

async fn demo_event(
    db: &DatabaseConnection,
    creator: Uuid,
    seed: EventSeed<'_>,
) -> Result<event::Model, AppError> {
    let now = Utc::now().naive_utc();
    Ok(event::ActiveModel {
        id: Set(Uuid::now_v7()),
        name: Set(seed.name.to_string()),
        location: Set(seed.location.to_string()),
        description: Set(Some(seed.description.to_string())),
        budget: Set(Some(Decimal::from(seed.budget))),
        start_date: Set(seed.start),
        end_date: Set(seed.end),
        status: Set(seed.status),
        is_active: Set(true),
        created_by: Set(creator),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?)
}

async fn demo_assignment(
    db: &DatabaseConnection,
    event_id: Uuid,
    officer_id: Uuid,
    by: Uuid,
) -> Result<(), AppError> {
    event_assignment::ActiveModel {
        id: Set(Uuid::now_v7()),
        event_id: Set(event_id),
        officer_id: Set(officer_id),
        assigned_by: Set(by),
        assigned_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await?;
    Ok(())
}

async fn demo_milestones(
    db: &DatabaseConnection,
    event_id: Uuid,
    steps: &[(&str, &str, NaiveDate, MilestoneStatus)],
) -> Result<Vec<milestone::Model>, AppError> {
    let mut out = Vec::with_capacity(steps.len());
    for (ordinal, (name, description, deadline, status)) in (1..).zip(steps) {
        let now = Utc::now().naive_utc();
        let row = milestone::ActiveModel {
            id: Set(Uuid::now_v7()),
            event_id: Set(event_id),
            name: Set(name.to_string()),
            description: Set(Some(description.to_string())),
            deadline: Set(*deadline),
            ordinal: Set(ordinal),
            status: Set(*status),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
        out.push(row);
    }
    Ok(out)
}

async fn demo_report(
    db: &DatabaseConnection,
    milestone: &milestone::Model,
    officer_id: Uuid,
    description: &str,
    photos: &[&str],
    report_date: NaiveDate,
    percentage: i32,
) -> Result<(), AppError> {
    let now = Utc::now().naive_utc();
    progress_report::ActiveModel {
        id: Set(Uuid::now_v7()),
        event_id: Set(milestone.event_id),
        milestone_id: Set(Some(milestone.id)),
        officer_id: Set(officer_id),
        description: Set(description.to_string()),
        photo_urls: Set(serde_json::to_string(photos)?),
        report_date: Set(report_date),
        progress_percentage: Set(percentage),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Populate an empty store with demo data. Does nothing when any user exists.
pub async fn seed_demo(db: &DatabaseConnection) -> Result<SeedOutcome, AppError> {
    let auth = Auth::new(db.clone());
    if auth.count_users().await? > 0 {
        tracing::info!("users already present, skipping demo seed");
        return Ok(SeedOutcome::Skipped);
    }

    let admin = demo_user(&auth, "admin", Role::Admin, "Administrator").await?;
    demo_user(&auth, "supervisor", Role::Supervisor, "Supervisor Utama").await?;
    let p1 = demo_user(&auth, "petugas1", Role::Petugas, "Petugas Lapangan 1").await?;
    let p2 = demo_user(&auth, "petugas2", Role::Petugas, "Petugas Lapangan 2").await?;
    let p3 = demo_user(&auth, "petugas3", Role::Petugas, "Petugas Lapangan 3").await?;

    let bridge = demo_event(
        db,
        admin.id,
        EventSeed {
            name: "Pembangunan Jembatan Sungai Ciliwung",
            location: "Jakarta Timur",
            description: "Bridge construction, 500 m span",
            budget: 15_000_000_000,
            start: date(2025, 1, 15)?,
            end: date(2025, 12, 31)?,
            status: EventStatus::OnProgress,
        },
    )
    .await?;
    let office = demo_event(
        db,
        admin.id,
        EventSeed {
            name: "Renovasi Gedung Perkantoran",
            location: "Jakarta Pusat",
            description: "Renovation of a 10-storey office building",
            budget: 8_000_000_000,
            start: date(2025, 2, 1)?,
            end: date(2025, 8, 31)?,
            status: EventStatus::Planning,
        },
    )
    .await?;
    let road = demo_event(
        db,
        admin.id,
        EventSeed {
            name: "Pengaspalan Jalan Raya",
            location: "Bogor",
            description: "Resurfacing 10 km of road",
            budget: 5_000_000_000,
            start: date(2024, 10, 1)?,
            end: date(2024, 12, 31)?,
            status: EventStatus::Completed,
        },
    )
    .await?;

    for (ev, officer) in [
        (bridge.id, p1.id),
        (bridge.id, p2.id),
        (office.id, p2.id),
        (office.id, p3.id),
        (road.id, p1.id),
    ] {
        demo_assignment(db, ev, officer, admin.id).await?;
    }

    let bridge_steps = demo_milestones(
        db,
        bridge.id,
        &[
            ("Persiapan Lahan", "Site clearing and preparation", date(2025, 2, 28)?, MilestoneStatus::Completed),
            ("Pembuatan Pondasi", "Foundation works", date(2025, 5, 31)?, MilestoneStatus::OnProgress),
            ("Pembangunan Struktur Utama", "Main structure", date(2025, 9, 30)?, MilestoneStatus::Pending),
            ("Finishing dan Pengecatan", "Finishing and painting", date(2025, 12, 15)?, MilestoneStatus::Pending),
        ],
    )
    .await?;
    demo_milestones(
        db,
        office.id,
        &[
            ("Survey dan Perencanaan", "Building survey and planning", date(2025, 3, 1)?, MilestoneStatus::Pending),
            ("Demolisi Interior", "Strip out the old interior", date(2025, 4, 30)?, MilestoneStatus::Pending),
            ("Renovasi Struktur", "Structural renovation", date(2025, 7, 31)?, MilestoneStatus::Pending),
        ],
    )
    .await?;

    if let [clearing, foundation, ..] = bridge_steps.as_slice() {
        demo_report(
            db,
            clearing,
            p1.id,
            "Site clearing finished. Area ready for the next stage.",
            &["https://example.com/photo1.jpg", "https://example.com/photo2.jpg"],
            date(2025, 2, 25)?,
            100,
        )
        .await?;
        demo_report(
            db,
            foundation,
            p2.id,
            "Foundation at 60%, on schedule.",
            &[
                "https://example.com/photo3.jpg",
                "https://example.com/photo4.jpg",
                "https://example.com/photo5.jpg",
            ],
            date(2025, 5, 15)?,
            60,
        )
        .await?;
    }

    tracing::info!(password = DEMO_PASSWORD, "demo data seeded (admin, supervisor, petugas1-3)");
    Ok(SeedOutcome::Seeded)
}

#[cfg(test)]
mod tests {
    use sea_orm::{EntityTrait, PaginatorTrait};

    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn seeds_once() {
        let db = testing::setup_db().await;
        assert_eq!(seed_demo(&db).await.unwrap(), SeedOutcome::Seeded);

        assert_eq!(user::Entity::find().count(&db).await.unwrap(), 5);
        assert_eq!(event::Entity::find().count(&db).await.unwrap(), 3);
        assert_eq!(event_assignment::Entity::find().count(&db).await.unwrap(), 5);
        assert_eq!(milestone::Entity::find().count(&db).await.unwrap(), 7);
        assert_eq!(progress_report::Entity::find().count(&db).await.unwrap(), 2);

        let auth = Auth::new(db.clone());
        let officer = auth.authenticate("petugas1", DEMO_PASSWORD).await.unwrap();
        assert_eq!(officer.role, Role::Petugas);

        assert_eq!(seed_demo(&db).await.unwrap(), SeedOutcome::Skipped);
        assert_eq!(user::Entity::find().count(&db).await.unwrap(), 5);
    }
}
