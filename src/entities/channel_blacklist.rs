//! Channel blacklist entity - Channels excluded from one activity scope.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Activity a channel can be excluded from.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum BlacklistScope {
    /// Prefix commands are ignored
    #[sea_orm(string_value = "COMMAND")]
    Command,
    /// Messages are not counted in statistics
    #[sea_orm(string_value = "MESSAGE")]
    Message,
    /// Messages earn no coins
    #[sea_orm(string_value = "ECONOMY")]
    Economy,
    /// Messages earn no XP
    #[sea_orm(string_value = "LEVEL")]
    Level,
    /// Messages do not advance daily quests
    #[sea_orm(string_value = "QUEST")]
    Quest,
}

/// Channel blacklist database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channel_blacklists")]
pub struct Model {
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Discord channel ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub channel_id: String,
    /// Blacklisted activity
    #[sea_orm(primary_key, auto_increment = false)]
    pub scope: BlacklistScope,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
