//! Shop item entity - A role sold in one of the guild shops.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Shop item database model. A role is sold by at most one shop per guild.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shop_items")]
pub struct Model {
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Role granted on purchase
    #[sea_orm(primary_key, auto_increment = false)]
    pub role_id: String,
    /// Shop selling the role
    pub shop_name: String,
    /// Price in coins
    pub cost: i64,
    /// Units left, `None` for unlimited
    pub stock: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
