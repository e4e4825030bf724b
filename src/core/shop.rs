//! Role shops.
//!
//! A guild runs any number of named shops, each selling roles for coins.
//! A role is listed in at most one shop. Items either have unlimited supply
//! or a stock that purchases count down.

use crate::{
    core::{
        guild::find_or_create_guild,
        ledger::{Ledger, MemberKey},
    },
    entities::{Shop, ShopItem, shop, shop_item},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    QueryOrder, Set, TransactionTrait, prelude::*,
    sea_query::{Expr, OnConflict},
};
use std::collections::HashSet;
use tracing::{info, instrument};

/// Longest accepted shop name.
pub const MAX_SHOP_NAME_LEN: usize = 32;

/// Trims and lowercases a shop name typed by a user.
pub fn normalize_shop_name(name: &str) -> Result<String> {
    let name = name.trim().to_lowercase();
    if name.is_empty() || name.chars().count() > MAX_SHOP_NAME_LEN {
        return Err(Error::Command {
            message: format!("A shop name has 1 to {MAX_SHOP_NAME_LEN} characters"),
        });
    }
    Ok(name)
}

/// Whether the shop sells right now. An expired shop is closed even if its
/// flag is still set.
#[must_use]
pub fn is_open(shop: &shop::Model, now: DateTime<Utc>) -> bool {
    shop.is_open && shop.expires_at.is_none_or(|expires_at| now < expires_at)
}

/// Shop fields to change. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShopUpdate {
    pub is_open: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// Every shop of a guild, by name.
pub async fn list_shops<C>(db: &C, guild_id: &str) -> Result<Vec<shop::Model>>
where
    C: ConnectionTrait,
{
    Shop::find()
        .filter(shop::Column::GuildId.eq(guild_id))
        .order_by_asc(shop::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

pub async fn find_shop<C>(db: &C, guild_id: &str, name: &str) -> Result<Option<shop::Model>>
where
    C: ConnectionTrait,
{
    Shop::find_by_id((guild_id.to_string(), name.to_string()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Creates the shop (open, without expiry) or applies `update` to it.
pub async fn upsert_shop<C>(
    db: &C,
    guild_id: &str,
    name: &str,
    update: ShopUpdate,
) -> Result<shop::Model>
where
    C: ConnectionTrait,
{
    let name = normalize_shop_name(name)?;
    find_or_create_guild(db, guild_id).await?;

    let current = find_shop(db, guild_id, &name).await?;
    let (is_open, expires_at) = current
        .as_ref()
        .map_or((true, None), |shop| (shop.is_open, shop.expires_at));

    let row = shop::ActiveModel {
        guild_id: Set(guild_id.to_string()),
        name: Set(name.clone()),
        is_open: Set(update.is_open.unwrap_or(is_open)),
        expires_at: Set(update.expires_at.unwrap_or(expires_at)),
    };
    Shop::insert(row)
        .on_conflict(
            OnConflict::columns([shop::Column::GuildId, shop::Column::Name])
                .update_columns([shop::Column::IsOpen, shop::Column::ExpiresAt])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    find_shop(db, guild_id, &name)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("shop {guild_id}/{name}")).into())
}

/// Deletes a shop and the items it sells; returns whether it existed.
pub async fn remove_shop<C>(db: &C, guild_id: &str, name: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let name = normalize_shop_name(name)?;
    ShopItem::delete_many()
        .filter(shop_item::Column::GuildId.eq(guild_id))
        .filter(shop_item::Column::ShopName.eq(name.as_str()))
        .exec(db)
        .await?;
    let result = Shop::delete_by_id((guild_id.to_string(), name))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Deletes every shop and item of a guild; returns the number of shops.
pub async fn clear_shops<C>(db: &C, guild_id: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    ShopItem::delete_many()
        .filter(shop_item::Column::GuildId.eq(guild_id))
        .exec(db)
        .await?;
    let result = Shop::delete_many()
        .filter(shop::Column::GuildId.eq(guild_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Items of one shop, cheapest first.
pub async fn list_items<C>(db: &C, guild_id: &str, shop_name: &str) -> Result<Vec<shop_item::Model>>
where
    C: ConnectionTrait,
{
    ShopItem::find()
        .filter(shop_item::Column::GuildId.eq(guild_id))
        .filter(shop_item::Column::ShopName.eq(shop_name))
        .order_by_asc(shop_item::Column::Cost)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Items of every shop of a guild, cheapest first.
pub async fn all_items<C>(db: &C, guild_id: &str) -> Result<Vec<shop_item::Model>>
where
    C: ConnectionTrait,
{
    ShopItem::find()
        .filter(shop_item::Column::GuildId.eq(guild_id))
        .order_by_asc(shop_item::Column::Cost)
        .all(db)
        .await
        .map_err(Into::into)
}

pub async fn find_item<C>(db: &C, guild_id: &str, role_id: &str) -> Result<Option<shop_item::Model>>
where
    C: ConnectionTrait,
{
    ShopItem::find_by_id((guild_id.to_string(), role_id.to_string()))
        .one(db)
        .await
        .map_err(Into::into)
}

fn item_missing(role_id: &str) -> Error {
    Error::Command {
        message: format!("<@&{role_id}> is not sold in any shop"),
    }
}

/// Lists `role_id` in `shop_name` at `cost`, creating the shop when needed.
/// A role already listed elsewhere moves to this shop.
pub async fn upsert_item<C>(
    db: &C,
    guild_id: &str,
    shop_name: &str,
    role_id: &str,
    cost: i64,
    stock: Option<i64>,
) -> Result<shop_item::Model>
where
    C: ConnectionTrait,
{
    if cost < 0 {
        return Err(Error::InvalidAmount { amount: cost });
    }
    if let Some(stock) = stock.filter(|stock| *stock < 0) {
        return Err(Error::InvalidAmount { amount: stock });
    }

    let shop_name = normalize_shop_name(shop_name)?;
    if find_shop(db, guild_id, &shop_name).await?.is_none() {
        upsert_shop(db, guild_id, &shop_name, ShopUpdate::default()).await?;
    }

    let row = shop_item::ActiveModel {
        guild_id: Set(guild_id.to_string()),
        role_id: Set(role_id.to_string()),
        shop_name: Set(shop_name),
        cost: Set(cost),
        stock: Set(stock),
    };
    ShopItem::insert(row)
        .on_conflict(
            OnConflict::columns([shop_item::Column::GuildId, shop_item::Column::RoleId])
                .update_columns([
                    shop_item::Column::ShopName,
                    shop_item::Column::Cost,
                    shop_item::Column::Stock,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    find_item(db, guild_id, role_id)
        .await?
        .ok_or_else(|| item_missing(role_id))
}

/// Unlists a role; returns whether it was listed.
pub async fn remove_item<C>(db: &C, guild_id: &str, role_id: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = ShopItem::delete_by_id((guild_id.to_string(), role_id.to_string()))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Adds `amount` units to a stocked item.
pub async fn restock<C>(db: &C, guild_id: &str, role_id: &str, amount: i64) -> Result<shop_item::Model>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }
    let item = find_item(db, guild_id, role_id)
        .await?
        .ok_or_else(|| item_missing(role_id))?;
    if item.stock.is_none() {
        return Err(Error::Command {
            message: format!("<@&{role_id}> has unlimited stock"),
        });
    }

    ShopItem::update_many()
        .col_expr(
            shop_item::Column::Stock,
            Expr::col(shop_item::Column::Stock).add(amount),
        )
        .filter(shop_item::Column::GuildId.eq(guild_id))
        .filter(shop_item::Column::RoleId.eq(role_id))
        .exec(db)
        .await?;

    find_item(db, guild_id, role_id)
        .await?
        .ok_or_else(|| item_missing(role_id))
}

/// Takes `amount` units out of a stocked item, or fails without touching it
/// when fewer are left.
pub async fn decrement_stock<C>(
    db: &C,
    guild_id: &str,
    role_id: &str,
    amount: i64,
) -> Result<shop_item::Model>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }
    let item = find_item(db, guild_id, role_id)
        .await?
        .ok_or_else(|| item_missing(role_id))?;
    let Some(left) = item.stock else {
        return Err(Error::Command {
            message: format!("<@&{role_id}> has unlimited stock"),
        });
    };

    let result = ShopItem::update_many()
        .col_expr(
            shop_item::Column::Stock,
            Expr::col(shop_item::Column::Stock).sub(amount),
        )
        .filter(shop_item::Column::GuildId.eq(guild_id))
        .filter(shop_item::Column::RoleId.eq(role_id))
        .filter(shop_item::Column::Stock.gte(amount))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::Command {
            message: format!("Only {left} left in stock"),
        });
    }

    find_item(db, guild_id, role_id)
        .await?
        .ok_or_else(|| item_missing(role_id))
}

/// Result of a purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Bought { item: shop_item::Model },
    NotForSale,
    ShopClosed,
    SoldOut,
}

/// Charges the item price (vault first) and takes one unit of stock, in one
/// transaction. Granting the role is left to the caller, which calls
/// [`refund_purchase`] when that fails.
#[instrument(skip(db))]
pub async fn buy_item<C>(
    db: &C,
    key: &MemberKey,
    role_id: &str,
    now: DateTime<Utc>,
) -> Result<PurchaseOutcome>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let Some(item) = find_item(&txn, &key.guild_id, role_id).await? else {
        return Ok(PurchaseOutcome::NotForSale);
    };
    let open = find_shop(&txn, &key.guild_id, &item.shop_name)
        .await?
        .is_some_and(|shop| is_open(&shop, now));
    if !open {
        return Ok(PurchaseOutcome::ShopClosed);
    }

    if item.stock.is_some() {
        match decrement_stock(&txn, &key.guild_id, role_id, 1).await {
            Ok(_) => {}
            Err(Error::Command { .. }) => return Ok(PurchaseOutcome::SoldOut),
            Err(error) => return Err(error),
        }
    }
    Ledger::new(&txn)
        .drain_vault_then_wallet(key, item.cost)
        .await?;
    txn.commit().await?;

    info!("{:?} bought role {} for {} coins", key, role_id, item.cost);
    Ok(PurchaseOutcome::Bought { item })
}

/// Gives back the price of `item` to the wallet and returns its unit to stock.
pub async fn refund_purchase<C>(db: &C, key: &MemberKey, item: &shop_item::Model) -> Result<()>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    Ledger::new(&txn).credit_wallet(key, item.cost).await?;
    if item.stock.is_some() {
        restock(&txn, &item.guild_id, &item.role_id, 1).await?;
    }
    txn.commit().await?;
    Ok(())
}

/// Shop items among the roles a member holds.
#[must_use]
pub fn equipped_items<'a>(
    items: &'a [shop_item::Model],
    member_roles: &HashSet<String>,
) -> Vec<&'a shop_item::Model> {
    items
        .iter()
        .filter(|item| member_roles.contains(&item.role_id))
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_expired_shop_is_closed() {
        let mut shop = shop::Model {
            guild_id: "g".to_string(),
            name: "colors".to_string(),
            is_open: true,
            expires_at: None,
        };
        assert!(is_open(&shop, now()));

        shop.expires_at = Some(now() + TimeDelta::hours(1));
        assert!(is_open(&shop, now()));
        assert!(!is_open(&shop, now() + TimeDelta::hours(1)));

        shop.expires_at = None;
        shop.is_open = false;
        assert!(!is_open(&shop, now()));
    }

    #[test]
    fn test_normalize_shop_name() {
        assert_eq!(normalize_shop_name("  Colors ").unwrap(), "colors");
        assert!(normalize_shop_name("   ").is_err());
        assert!(normalize_shop_name(&"x".repeat(MAX_SHOP_NAME_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn test_shop_and_item_crud() -> Result<()> {
        let db = setup_test_db().await?;

        let item = upsert_item(&db, "g", "Colors", "r2", 500, None).await?;
        assert_eq!(item.shop_name, "colors");
        let shop = find_shop(&db, "g", "colors").await?.unwrap();
        assert!(shop.is_open);

        upsert_item(&db, "g", "colors", "r1", 200, Some(3)).await?;
        let names: Vec<_> = list_items(&db, "g", "colors")
            .await?
            .into_iter()
            .map(|item| item.role_id)
            .collect();
        assert_eq!(names, ["r1", "r2"]);

        // moving a role to another shop keeps one listing
        upsert_item(&db, "g", "badges", "r2", 900, None).await?;
        assert_eq!(list_items(&db, "g", "colors").await?.len(), 1);
        assert_eq!(all_items(&db, "g").await?.len(), 2);

        let closed = upsert_shop(
            &db,
            "g",
            "colors",
            ShopUpdate {
                is_open: Some(false),
                ..ShopUpdate::default()
            },
        )
        .await?;
        assert!(!closed.is_open);
        assert_eq!(list_shops(&db, "g").await?.len(), 2);

        assert!(remove_shop(&db, "g", "colors").await?);
        assert!(!remove_shop(&db, "g", "colors").await?);
        assert!(find_item(&db, "g", "r1").await?.is_none());

        assert!(remove_item(&db, "g", "r2").await?);
        assert_eq!(clear_shops(&db, "g").await?, 1);
        assert!(list_shops(&db, "g").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_stock_moves() -> Result<()> {
        let db = setup_test_db().await?;
        upsert_item(&db, "g", "colors", "red", 100, Some(2)).await?;
        upsert_item(&db, "g", "colors", "blue", 100, None).await?;

        assert_eq!(decrement_stock(&db, "g", "red", 2).await?.stock, Some(0));
        assert!(decrement_stock(&db, "g", "red", 1).await.is_err());
        assert_eq!(restock(&db, "g", "red", 5).await?.stock, Some(5));

        assert!(restock(&db, "g", "blue", 1).await.is_err());
        assert!(decrement_stock(&db, "g", "blue", 1).await.is_err());
        assert!(restock(&db, "g", "missing", 1).await.is_err());
        assert!(upsert_item(&db, "g", "colors", "green", -1, None).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_buy_item_charges_and_counts_stock() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        create_test_member(&db, &alice, 150).await?;
        upsert_item(&db, "test_guild", "colors", "red", 100, Some(1)).await?;

        let outcome = buy_item(&db, &alice, "red", now()).await?;
        assert!(matches!(outcome, PurchaseOutcome::Bought { .. }));
        assert_eq!(balances(&db, &alice).await?, (50, 0));

        create_test_member(&db, &alice, 500).await?;
        assert_eq!(buy_item(&db, &alice, "red", now()).await?, PurchaseOutcome::SoldOut);
        assert_eq!(buy_item(&db, &alice, "pink", now()).await?, PurchaseOutcome::NotForSale);
        assert_eq!(balances(&db, &alice).await?, (500, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_payment_keeps_stock() -> Result<()> {
        let db = setup_test_db().await?;
        let bob = key("bob");
        create_test_member(&db, &bob, 10).await?;
        upsert_item(&db, "test_guild", "colors", "red", 100, Some(1)).await?;

        let result = buy_item(&db, &bob, "red", now()).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(find_item(&db, "test_guild", "red").await?.unwrap().stock, Some(1));
        assert_eq!(balances(&db, &bob).await?, (10, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_shop_does_not_sell() -> Result<()> {
        let db = setup_test_db().await?;
        let carol = key("carol");
        create_test_member(&db, &carol, 1_000).await?;
        upsert_item(&db, "test_guild", "event", "gold", 100, None).await?;
        upsert_shop(
            &db,
            "test_guild",
            "event",
            ShopUpdate {
                expires_at: Some(Some(now())),
                ..ShopUpdate::default()
            },
        )
        .await?;

        assert_eq!(buy_item(&db, &carol, "gold", now()).await?, PurchaseOutcome::ShopClosed);
        assert_eq!(balances(&db, &carol).await?, (1_000, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_refund_restores_coins_and_stock() -> Result<()> {
        let db = setup_test_db().await?;
        let dave = key("dave");
        create_test_member(&db, &dave, 100).await?;
        upsert_item(&db, "test_guild", "colors", "red", 100, Some(1)).await?;

        let PurchaseOutcome::Bought { item } = buy_item(&db, &dave, "red", now()).await? else {
            panic!("purchase should succeed");
        };
        refund_purchase(&db, &dave, &item).await?;
        assert_eq!(balances(&db, &dave).await?, (100, 0));
        assert_eq!(find_item(&db, "test_guild", "red").await?.unwrap().stock, Some(1));
        Ok(())
    }

    #[test]
    fn test_equipped_items() {
        let item = |role: &str| shop_item::Model {
            guild_id: "g".to_string(),
            role_id: role.to_string(),
            shop_name: "colors".to_string(),
            cost: 10,
            stock: None,
        };
        let items = vec![item("red"), item("blue")];
        let roles: HashSet<String> = ["blue", "admin"].into_iter().map(String::from).collect();

        let equipped = equipped_items(&items, &roles);
        assert_eq!(equipped.len(), 1);
        assert_eq!(equipped[0].role_id, "blue");
    }
}
