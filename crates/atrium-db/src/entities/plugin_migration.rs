use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One applied schema migration for one plugin.
///
/// Unique on `(plugin_id, version_number)`; rows are only ever inserted,
/// in the same transaction as the schema operation they record.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_migrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub plugin_id: String,
    pub version_number: i64,
    pub applied_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
