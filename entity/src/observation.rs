use sea_orm::entity::prelude::*;

/// One stored popularity observation. Rows are append-only; `id` reflects
/// insertion order and is the tie-break within a day.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "observation")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub date: Date,
    pub track: String,
    pub album: Option<String>,
    pub spi: i32,
    pub uri: Option<String>,
    pub release_date: Option<Date>,
    pub duration: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
