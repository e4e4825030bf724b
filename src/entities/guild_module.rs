//! Guild module entity - Toggle and JSON settings of one feature module per guild.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Feature modules a guild can switch on and tune.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ModuleName {
    /// Coins, vault, work, rob, presence
    #[sea_orm(string_value = "eco")]
    Eco,
    /// Activity XP and levels
    #[sea_orm(string_value = "level")]
    Level,
    /// Daily quests
    #[sea_orm(string_value = "quest")]
    Quest,
    /// Random chat events
    #[sea_orm(string_value = "event")]
    Event,
}

impl ModuleName {
    /// Every module, in display order.
    pub const ALL: [Self; 4] = [Self::Eco, Self::Level, Self::Quest, Self::Event];

    /// Name used in commands and in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eco => "eco",
            Self::Level => "level",
            Self::Quest => "quest",
            Self::Event => "event",
        }
    }

    /// Parses a module name typed by a user.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|module| module.as_str().eq_ignore_ascii_case(name))
    }
}

/// Guild module database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "guild_modules")]
pub struct Model {
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Which module this row configures
    #[sea_orm(primary_key, auto_increment = false)]
    pub module: ModuleName,
    /// Whether the module is enabled
    pub is_active: bool,
    /// Module specific settings as JSON
    pub settings: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
