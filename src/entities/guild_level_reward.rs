//! Guild level reward entity - Role and coin rewards unlocked at a level.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Guild level reward database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "guild_level_rewards")]
pub struct Model {
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Level at which the reward unlocks
    #[sea_orm(primary_key, auto_increment = false)]
    pub at_level: i64,
    /// Role granted at this level
    pub role_id: Option<String>,
    /// Coins granted along with the role
    pub coins_reward: i64,
    /// Whether the role is kept once a higher reward role is earned
    pub is_stackable: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
