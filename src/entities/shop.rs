//! Shop entity - A named role shop of a guild.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Shop database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shops")]
pub struct Model {
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Shop name, unique within the guild
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    /// Manual open flag
    pub is_open: bool,
    /// When set, the shop closes on its own at this instant
    pub expires_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
