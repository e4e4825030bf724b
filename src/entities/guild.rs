//! Guild entity - Guild wide configuration and bookkeeping.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Guild database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "guilds")]
pub struct Model {
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Locale Discord reports for the guild, picks the default time zone
    pub preferred_locale: Option<String>,
    /// IANA time zone chosen by a manager, overrides the locale
    pub timezone: Option<String>,
    /// Last random event spawned in this guild
    pub last_event_at: Option<DateTimeUtc>,
    /// Channel receiving deleted message logs
    pub message_deleted_audit_channel_id: Option<String>,
    /// Channel receiving edited message logs
    pub message_edited_audit_channel_id: Option<String>,
    /// Role granted to supporters, its holders accrue the supporter bonus
    pub support_role_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
