use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EventAssignments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventAssignments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EventAssignments::EventId).uuid().not_null())
                    .col(
                        ColumnDef::new(EventAssignments::OfficerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EventAssignments::AssignedBy)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EventAssignments::AssignedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignment_event")
                            .from(EventAssignments::Table, EventAssignments::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignment_officer")
                            .from(EventAssignments::Table, EventAssignments::OfficerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignment_assigner")
                            .from(EventAssignments::Table, EventAssignments::AssignedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_assignment_unique")
                    .table(EventAssignments::Table)
                    .col(EventAssignments::EventId)
                    .col(EventAssignments::OfficerId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventAssignments::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum EventAssignments {
    Table,
    Id,
    EventId,
    OfficerId,
    AssignedBy,
    AssignedAt,
}

#[derive(Iden)]
enum Events {
    Table,
    Id,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
