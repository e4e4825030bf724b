//! Shop commands - browse the role shops, buy and unequip roles.

use super::{parse_role, usage};
use crate::{
    bot::respond::{CommandContext, Reply, colors},
    core::shop::{
        PurchaseOutcome, all_items, buy_item, equipped_items, find_shop, is_open, list_items,
        list_shops, normalize_shop_name, refund_purchase,
    },
    entities::{shop, shop_item},
    errors::Result,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{collections::HashSet, time::Duration};
use tracing::{info, warn};

/// How long the unequip request waits for a click.
const UNEQUIP_TIMEOUT: Duration = Duration::from_secs(60);

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, respond::CommandContext},
        errors::Result,
    };
    use poise::serenity_prelude as serenity;

    /// Role shop commands.
    #[poise::command(
        slash_command,
        guild_only,
        subcommands("shop_view", "shop_buy"),
        subcommand_required
    )]
    pub async fn shop(_ctx: Context<'_>) -> Result<()> {
        Ok(())
    }

    /// Lists the shops, or the roles one shop sells.
    #[poise::command(slash_command, guild_only, rename = "view")]
    pub async fn shop_view(
        ctx: Context<'_>,
        #[description = "Shop to look into"] name: Option<String>,
    ) -> Result<()> {
        super::run_shop(&CommandContext::slash(ctx), name.as_deref()).await
    }

    /// Buys a role from a shop.
    #[poise::command(slash_command, guild_only, rename = "buy")]
    pub async fn shop_buy(
        ctx: Context<'_>,
        #[description = "Role to buy"] role: serenity::Role,
    ) -> Result<()> {
        super::run_buy(&CommandContext::slash(ctx), role.id).await
    }

    /// Removes the shop roles you wear. Coins are not refunded.
    #[poise::command(slash_command, guild_only)]
    pub async fn unequip(ctx: Context<'_>) -> Result<()> {
        super::run_unequip(&CommandContext::slash(ctx)).await
    }
}

pub use inner::*;

fn stock_text(stock: Option<i64>) -> String {
    match stock {
        None => "unlimited".to_string(),
        Some(0) => "sold out".to_string(),
        Some(left) => format!("{left} left"),
    }
}

fn shop_line(shop: &shop::Model, items: usize, now: DateTime<Utc>) -> String {
    let state = if !is_open(shop, now) {
        "closed".to_string()
    } else if let Some(expires_at) = shop.expires_at {
        format!("open, closes <t:{}:R>", expires_at.timestamp())
    } else {
        "open".to_string()
    };
    format!("**{}** ({state}): {items} roles", shop.name)
}

fn item_line(item: &shop_item::Model) -> String {
    format!(
        "<@&{}> for **{}** coins ({})",
        item.role_id,
        item.cost,
        stock_text(item.stock)
    )
}

async fn run_shop(cmd: &CommandContext<'_>, name: Option<&str>) -> Result<()> {
    let guild_id = cmd.guild()?.to_string();
    let db = &*cmd.data.database;
    let now = Utc::now();

    let Some(name) = name else {
        let shops = list_shops(db, &guild_id).await?;
        if shops.is_empty() {
            return cmd.say(Reply::denial("This server has no shop yet.")).await;
        }
        let items = all_items(db, &guild_id).await?;
        let lines: Vec<String> = shops
            .iter()
            .map(|shop| {
                let count = items.iter().filter(|item| item.shop_name == shop.name).count();
                shop_line(shop, count, now)
            })
            .collect();
        let embed = serenity::CreateEmbed::default()
            .title("Shops")
            .description(lines.join("\n"))
            .footer(serenity::CreateEmbedFooter::new("Open one with `shop <name>`"))
            .color(colors::BLUE);
        return cmd.say(Reply::embed(embed)).await;
    };

    let name = normalize_shop_name(name)?;
    let Some(shop) = find_shop(db, &guild_id, &name).await? else {
        return cmd.say(Reply::denial(format!("There is no shop named `{name}`."))).await;
    };
    let items = list_items(db, &guild_id, &shop.name).await?;
    let description = if items.is_empty() {
        "Nothing for sale yet.".to_string()
    } else {
        items.iter().map(item_line).collect::<Vec<_>>().join("\n")
    };
    let embed = serenity::CreateEmbed::default()
        .title(format!("Shop {}", shop.name))
        .description(description)
        .footer(serenity::CreateEmbedFooter::new(shop_line(&shop, items.len(), now)))
        .color(if is_open(&shop, now) { colors::GOLD } else { colors::RED });
    cmd.say(Reply::embed(embed)).await
}

async fn run_buy(cmd: &CommandContext<'_>, role_id: serenity::RoleId) -> Result<()> {
    let key = cmd.author_key()?;
    let guild_id = cmd.guild()?;
    let member = guild_id.member(cmd.serenity, cmd.author.id).await?;
    if member.roles.contains(&role_id) {
        return cmd.say(Reply::denial("You already have this role.")).await;
    }

    let db = &*cmd.data.database;
    let outcome = buy_item(db, &key, &role_id.to_string(), Utc::now()).await?;
    let reply = match outcome {
        PurchaseOutcome::NotForSale => Reply::denial(format!("<@&{role_id}> is not for sale.")),
        PurchaseOutcome::ShopClosed => Reply::denial("This shop is closed."),
        PurchaseOutcome::SoldOut => Reply::denial(format!("<@&{role_id}> is sold out.")),
        PurchaseOutcome::Bought { item } => {
            if let Err(e) = member.add_role(&cmd.serenity.http, role_id).await {
                warn!("Failed to grant shop role {} to {:?}: {}", role_id, key, e);
                refund_purchase(db, &key, &item).await?;
                Reply::denial("The role could not be given to you. You were refunded.")
            } else {
                Reply::embed(
                    serenity::CreateEmbed::default()
                        .title("Purchase")
                        .description(format!("You bought <@&{role_id}> for **{}** coins.", item.cost))
                        .color(colors::GREEN),
                )
            }
        }
    };
    cmd.say(reply).await
}

fn unequip_buttons(confirm_id: &str, cancel_id: &str) -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(confirm_id)
            .label("Confirm")
            .style(serenity::ButtonStyle::Success),
        serenity::CreateButton::new(cancel_id)
            .label("Cancel")
            .style(serenity::ButtonStyle::Danger),
    ])]
}

fn unequip_result(text: impl Into<String>, color: u32) -> Reply {
    Reply::embed(
        serenity::CreateEmbed::default()
            .title("Unequip")
            .description(text.into())
            .color(color),
    )
}

async fn run_unequip(cmd: &CommandContext<'_>) -> Result<()> {
    let guild_id = cmd.guild()?;
    let member = guild_id.member(cmd.serenity, cmd.author.id).await?;
    let items = all_items(&*cmd.data.database, &guild_id.to_string()).await?;
    let member_roles: HashSet<String> = member.roles.iter().map(ToString::to_string).collect();
    let equipped: Vec<serenity::RoleId> = equipped_items(&items, &member_roles)
        .into_iter()
        .filter_map(|item| parse_role(&item.role_id))
        .collect();

    if equipped.is_empty() {
        return cmd.say(Reply::denial("You have no shop role equipped.")).await;
    }

    let nonce: u64 = StdRng::from_os_rng().random();
    let confirm_id = format!("unequip_confirm:{}:{nonce}", cmd.author.id);
    let cancel_id = format!("unequip_cancel:{}:{nonce}", cmd.author.id);
    let roles = equipped
        .iter()
        .map(|role| format!("<@&{role}>"))
        .collect::<Vec<_>>()
        .join(", ");
    let offer = format!("Remove {roles}?\nYou will not be refunded.");
    let mut message = cmd
        .send(unequip_result(offer, colors::ORANGE).components(unequip_buttons(&confirm_id, &cancel_id)))
        .await?;

    let interaction = message
        .await_component_interaction(cmd.serenity)
        .author_id(cmd.author.id)
        .timeout(UNEQUIP_TIMEOUT)
        .await;

    let Some(interaction) = interaction else {
        let expired = serenity::EditMessage::new()
            .embed(
                serenity::CreateEmbed::default()
                    .title("Unequip")
                    .description("The request expired. Your roles were kept.")
                    .color(colors::RED),
            )
            .components(Vec::new());
        message.edit(&cmd.serenity.http, expired).await?;
        return Ok(());
    };

    let reply = if interaction.data.custom_id == confirm_id {
        let mut removed = 0;
        for role in &equipped {
            match member.remove_role(&cmd.serenity.http, *role).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove shop role {} from {}: {}", role, cmd.author.id, e),
            }
        }
        info!("{} unequipped {} shop roles in {}", cmd.author.id, removed, guild_id);
        if removed == equipped.len() {
            unequip_result("Your shop roles were removed.", colors::GREEN)
        } else {
            unequip_result("Some roles could not be removed.", colors::RED)
        }
    } else {
        unequip_result("Cancelled.", colors::ORANGE)
    };
    interaction
        .create_response(&cmd.serenity.http, reply.into_update())
        .await?;
    Ok(())
}

pub fn shop_message<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let name = (!args.is_empty()).then(|| args.join(" "));
        run_shop(cmd, name.as_deref()).await
    })
}

pub fn buy_message<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let role = args
            .first()
            .and_then(|raw| parse_role(raw))
            .ok_or_else(|| usage("shop buy <role>"))?;
        run_buy(cmd, role).await
    })
}

pub fn unequip_message<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_unequip(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn shop(is_open: bool, expires_at: Option<DateTime<Utc>>) -> shop::Model {
        shop::Model {
            guild_id: "g".to_string(),
            name: "colors".to_string(),
            is_open,
            expires_at,
        }
    }

    #[test]
    fn test_shop_line_shows_state() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default();
        assert_eq!(shop_line(&shop(true, None), 3, now), "**colors** (open): 3 roles");
        assert_eq!(shop_line(&shop(false, None), 0, now), "**colors** (closed): 0 roles");

        let closes = now + TimeDelta::hours(2);
        assert_eq!(
            shop_line(&shop(true, Some(closes)), 1, now),
            format!("**colors** (open, closes <t:{}:R>): 1 roles", closes.timestamp())
        );
        assert_eq!(shop_line(&shop(true, Some(now)), 1, now), "**colors** (closed): 1 roles");
    }

    #[test]
    fn test_item_line_shows_stock() {
        let mut item = shop_item::Model {
            guild_id: "g".to_string(),
            role_id: "42".to_string(),
            shop_name: "colors".to_string(),
            cost: 250,
            stock: None,
        };
        assert_eq!(item_line(&item), "<@&42> for **250** coins (unlimited)");
        item.stock = Some(0);
        assert_eq!(item_line(&item), "<@&42> for **250** coins (sold out)");
        item.stock = Some(4);
        assert_eq!(item_line(&item), "<@&42> for **250** coins (4 left)");
    }
}
