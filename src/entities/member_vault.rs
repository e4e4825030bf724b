//! Member vault entity - Protected coin storage bounded by a capacity tier.
//!
//! The vault shares the member key. Its capacity and the price of the next tier
//! come from the static tables in [`crate::core::economy`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Capacity tier of a vault, ordered from smallest to largest.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
pub enum CapacityTier {
    /// Starting tier
    #[sea_orm(string_value = "TIER_0")]
    Tier0,
    #[sea_orm(string_value = "TIER_1")]
    Tier1,
    #[sea_orm(string_value = "TIER_2")]
    Tier2,
    #[sea_orm(string_value = "TIER_3")]
    Tier3,
    #[sea_orm(string_value = "TIER_4")]
    Tier4,
    #[sea_orm(string_value = "TIER_5")]
    Tier5,
    #[sea_orm(string_value = "TIER_6")]
    Tier6,
    #[sea_orm(string_value = "TIER_7")]
    Tier7,
    /// Last tier, cannot be upgraded further
    #[sea_orm(string_value = "TIER_8")]
    Tier8,
}

impl CapacityTier {
    /// All tiers in ordinal order.
    pub const ALL: [Self; 9] = [
        Self::Tier0,
        Self::Tier1,
        Self::Tier2,
        Self::Tier3,
        Self::Tier4,
        Self::Tier5,
        Self::Tier6,
        Self::Tier7,
        Self::Tier8,
    ];

    /// Position of the tier in [`Self::ALL`].
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// The tier right after this one, `None` at the last tier.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }
}

/// Member vault database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "member_vaults")]
pub struct Model {
    /// Discord user ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Coins stored in the vault
    pub vault_coins: i64,
    /// Current capacity tier
    pub capacity_tier: CapacityTier,
}

/// Defines relationships between `MemberVault` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each vault belongs to one member
    #[sea_orm(
        belongs_to = "super::member::Entity",
        from = "(Column::UserId, Column::GuildId)",
        to = "(super::member::Column::UserId, super::member::Column::GuildId)"
    )]
    Member,
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Member.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
