use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Observation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Observation::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Observation::Date).date().not_null())
                    .col(ColumnDef::new(Observation::Track).string().not_null())
                    .col(ColumnDef::new(Observation::Album).string().null())
                    .col(ColumnDef::new(Observation::Spi).integer().not_null())
                    .col(ColumnDef::new(Observation::Uri).string().null())
                    .col(ColumnDef::new(Observation::ReleaseDate).date().null())
                    .col(ColumnDef::new(Observation::Duration).string().null())
                    .to_owned(),
            )
            .await?;

        // Last-observation lookups filter on uri and sort by date.
        manager
            .create_index(
                Index::create()
                    .name("idx_observation_uri_date")
                    .table(Observation::Table)
                    .col(Observation::Uri)
                    .col(Observation::Date)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Observation::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Observation {
    Table,
    Id,
    Date,
    Track,
    Album,
    Spi,
    Uri,
    ReleaseDate,
    Duration,
}
