use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProgressReports::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProgressReports::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProgressReports::EventId).uuid().not_null())
                    .col(ColumnDef::new(ProgressReports::MilestoneId).uuid().null())
                    .col(ColumnDef::new(ProgressReports::OfficerId).uuid().not_null())
                    .col(ColumnDef::new(ProgressReports::Description).text().not_null())
                    .col(ColumnDef::new(ProgressReports::PhotoUrls).text().not_null())
                    .col(ColumnDef::new(ProgressReports::ReportDate).date().not_null())
                    .col(
                        ColumnDef::new(ProgressReports::ProgressPercentage)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProgressReports::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ProgressReports::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProgressReports::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_report_event")
                            .from(ProgressReports::Table, ProgressReports::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_report_milestone")
                            .from(ProgressReports::Table, ProgressReports::MilestoneId)
                            .to(Milestones::Table, Milestones::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_report_officer")
                            .from(ProgressReports::Table, ProgressReports::OfficerId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_report_event_officer")
                    .table(ProgressReports::Table)
                    .col(ProgressReports::EventId)
                    .col(ProgressReports::OfficerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProgressReports::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ProgressReports {
    Table,
    Id,
    EventId,
    MilestoneId,
    OfficerId,
    Description,
    PhotoUrls,
    ReportDate,
    ProgressPercentage,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Events {
    Table,
    Id,
}

#[derive(Iden)]
enum Milestones {
    Table,
    Id,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
