//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod channel_blacklist;
pub mod guild;
pub mod guild_level_reward;
pub mod guild_module;
pub mod member;
pub mod member_daily_quest;
pub mod member_vault;
pub mod shop;
pub mod shop_item;
pub mod user;

// Re-export specific types to avoid conflicts
pub use channel_blacklist::{
    BlacklistScope, Column as ChannelBlacklistColumn, Entity as ChannelBlacklist,
    Model as ChannelBlacklistModel,
};
pub use guild::{Column as GuildColumn, Entity as Guild, Model as GuildModel};
pub use guild_level_reward::{
    Column as GuildLevelRewardColumn, Entity as GuildLevelReward, Model as GuildLevelRewardModel,
};
pub use guild_module::{
    Column as GuildModuleColumn, Entity as GuildModule, Model as GuildModuleModel, ModuleName,
};
pub use member::{Column as MemberColumn, Entity as Member, Model as MemberModel};
pub use member_daily_quest::{
    Column as MemberDailyQuestColumn, Entity as MemberDailyQuest, Model as MemberDailyQuestModel,
};
pub use member_vault::{
    CapacityTier, Column as MemberVaultColumn, Entity as MemberVault, Model as MemberVaultModel,
};
pub use shop::{Column as ShopColumn, Entity as Shop, Model as ShopModel};
pub use shop_item::{Column as ShopItemColumn, Entity as ShopItem, Model as ShopItemModel};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
