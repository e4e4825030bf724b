//! Member daily quest entity - one row per member, regenerated each guild day.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Member daily quest database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "member_daily_quests")]
pub struct Model {
    /// Discord user ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Voice minutes to reach, `None` when the quest has no voice objective
    pub voice_minutes_target: Option<i64>,
    /// Voice minutes recorded so far
    pub voice_minutes_progress: i64,
    /// Messages to send, `None` when the quest has no message objective
    pub messages_sent_target: Option<i64>,
    /// Messages recorded so far
    pub messages_sent_progress: i64,
    /// When the quest was generated
    pub started_at: DateTimeUtc,
    /// Whether the rewards were already paid
    pub is_claimed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
