pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_users;
mod m20261001_000002_create_events;
mod m20261001_000003_create_event_assignments;
mod m20261001_000004_create_milestones;
mod m20261001_000005_create_progress_reports;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_users::Migration),
            Box::new(m20261001_000002_create_events::Migration),
            Box::new(m20261001_000003_create_event_assignments::Migration),
            Box::new(m20261001_000004_create_milestones::Migration),
            Box::new(m20261001_000005_create_progress_reports::Migration),
        ]
    }
}
