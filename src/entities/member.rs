//! Member entity - Per-guild state of a participant.
//!
//! A member is keyed by `(user_id, guild_id)` and is created lazily the first
//! time any service touches it. It holds the wallet, activity XP, message and
//! voice statistics, cooldown timestamps, the daily streak and the supporter
//! date of the guild's support role.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Member database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "members")]
pub struct Model {
    /// Discord user ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Coins held outside the vault
    pub wallet_coins: i64,
    /// Accumulated activity XP, the level is derived from it
    pub activity_xp: i64,
    /// Messages counted towards statistics
    pub message_count: i64,
    /// Minutes in voice while neither muted nor deafened
    pub call_active_minutes: i64,
    /// Minutes in voice while muted
    pub call_muted_minutes: i64,
    /// Minutes in voice while deafened
    pub call_deaf_minutes: i64,
    /// Minutes in voice channels hidden from @everyone
    pub call_private_minutes: i64,
    /// Minutes in voice channels visible to @everyone
    pub call_public_minutes: i64,
    /// Minutes spent streaming
    pub call_streaming_minutes: i64,
    /// Minutes spent with the camera on
    pub call_camera_minutes: i64,
    /// Consecutive guild days with a presence claim
    pub daily_streak: i64,
    /// Last presence (daily) claim
    pub last_attended_at: Option<DateTimeUtc>,
    /// Last successful `work`
    pub last_worked_at: Option<DateTimeUtc>,
    /// Last rob attempt made by this member
    pub last_rob_at: Option<DateTimeUtc>,
    /// Last time this member was targeted by a rob
    pub last_robbed_at: Option<DateTimeUtc>,
    /// Since when the member holds the guild's support role
    pub supporter_since: Option<DateTimeUtc>,
}

/// Defines relationships between Member and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One member has one vault
    #[sea_orm(has_one = "super::member_vault::Entity")]
    Vault,
}

impl Related<super::member_vault::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vault.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
