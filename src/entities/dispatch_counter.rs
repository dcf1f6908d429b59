use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Single-row counter backing dispatch-number generation. Lazily created on
/// first draw; `count` resets whenever `last_reset_year` falls behind the
/// current year.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dispatch_counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub count: i64,
    pub last_reset_year: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
