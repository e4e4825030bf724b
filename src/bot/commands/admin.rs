//! Guild configuration commands for members with Manage Server.
//!
//! These are prefix commands only: `module`, `guild`, `blacklist`, `reward`
//! and the shop management commands, each with its own subcommands.

use super::{parse_channel, parse_role, usage};
use crate::{
    bot::respond::{CommandContext, Reply, colors},
    core::{
        blacklist::{add_channel, list_guild, remove_channel},
        guild::{GuildSettingsUpdate, guild_timezone as resolve_guild_timezone, parse_timezone, update_guild},
        leveling::{list_rewards, remove_reward, set_reward},
        modules::{find_module, guild_modules, parse_setting_value, set_module_active, update_setting},
        shop::{
            ShopUpdate, clear_shops, find_shop, normalize_shop_name, remove_item, remove_shop,
            restock, upsert_item, upsert_shop,
        },
    },
    entities::{BlacklistScope, ModuleName},
    errors::{Error, Result},
};
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use std::fmt::Write as _;
use tracing::info;

fn arg<'a>(args: &'a [String], index: usize, text: &str) -> Result<&'a str> {
    args.get(index).map(String::as_str).ok_or_else(|| usage(text))
}

fn module_arg(args: &[String], text: &str) -> Result<ModuleName> {
    let raw = arg(args, 0, text)?;
    ModuleName::parse(raw).ok_or_else(|| Error::Command {
        message: format!(
            "Unknown module `{raw}`. Modules: {}",
            ModuleName::ALL.map(ModuleName::as_str).join(", ")
        ),
    })
}

fn done(text: impl Into<String>) -> Reply {
    Reply::embed(
        serenity::CreateEmbed::default()
            .description(text.into())
            .color(colors::GREEN),
    )
}

/// `none`, `off` and `clear` unset an optional value.
fn is_clear(raw: &str) -> bool {
    ["none", "off", "clear"]
        .iter()
        .any(|word| raw.eq_ignore_ascii_case(word))
}

/// Parses a zone name, `auto` (or a clear word) follows the guild locale.
fn timezone_arg(raw: &str) -> Result<Option<String>> {
    if raw.eq_ignore_ascii_case("auto") || is_clear(raw) {
        return Ok(None);
    }
    Ok(Some(parse_timezone(raw)?.name().to_string()))
}

/// Reads an optional opening length in hours; `None` keeps the shop open
/// until closed by hand.
fn closes_at(raw: Option<&String>, now: DateTime<Utc>, text: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let hours: i64 = raw.parse().map_err(|_| usage(text))?;
    if hours <= 0 {
        return Err(usage(text));
    }
    Ok(Some(now + TimeDelta::hours(hours)))
}

pub fn module_status<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let guild_id = cmd.guild()?.to_string();
        let db = &*cmd.data.database;

        if let Some(module) = args.first().and_then(|raw| ModuleName::parse(raw)) {
            let settings = match find_module(db, &guild_id, module).await? {
                Some(row) => row.settings,
                None => cmd.data.module_defaults.settings_for(module)?,
            };
            let embed = serenity::CreateEmbed::default()
                .title(format!("Module {}", module.as_str()))
                .description(format!(
                    "```json\n{}\n```",
                    serde_json::to_string_pretty(&settings)?
                ))
                .color(colors::BLUE);
            return cmd.say(Reply::embed(embed)).await;
        }

        let modules = guild_modules(db, &guild_id).await?;
        let mut description = String::new();
        for module in ModuleName::ALL {
            let active = modules.get(&module).is_some_and(|state| state.is_active);
            writeln!(
                description,
                "`{}`: {}",
                module.as_str(),
                if active { "on" } else { "off" }
            )?;
        }
        cmd.say(Reply::embed(
            serenity::CreateEmbed::default()
                .title("Modules")
                .description(description)
                .color(colors::BLUE),
        ))
        .await
    })
}

async fn toggle(cmd: &CommandContext<'_>, args: &[String], is_active: bool) -> Result<()> {
    let guild_id = cmd.guild()?.to_string();
    let module = module_arg(args, if is_active { "module enable <module>" } else { "module disable <module>" })?;
    set_module_active(
        &*cmd.data.database,
        &guild_id,
        module,
        is_active,
        &cmd.data.module_defaults,
    )
    .await?;
    info!(
        "Module {} set to {} in guild {} by {}",
        module.as_str(),
        is_active,
        guild_id,
        cmd.author.id
    );
    cmd.say(done(format!(
        "Module `{}` is now {}.",
        module.as_str(),
        if is_active { "on" } else { "off" }
    )))
    .await
}

pub fn module_enable<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(toggle(cmd, args, true))
}

pub fn module_disable<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(toggle(cmd, args, false))
}

pub fn module_set<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "module set <module> <setting> <value>";
        let guild_id = cmd.guild()?.to_string();
        let module = module_arg(args, USAGE)?;
        let key = arg(args, 1, USAGE)?;
        if args.len() < 3 {
            return Err(usage(USAGE));
        }
        let value = parse_setting_value(&args[2..].join(" "));

        update_setting(
            &*cmd.data.database,
            &guild_id,
            module,
            key,
            value.clone(),
            &cmd.data.module_defaults,
        )
        .await?;
        cmd.say(done(format!("`{}.{key}` is now `{value}`.", module.as_str())))
            .await
    })
}

pub fn guild_timezone<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "guild timezone <zone, e.g. Europe/Paris|auto>";
        let guild_id = cmd.guild()?.to_string();
        let timezone = timezone_arg(arg(args, 0, USAGE)?)?;
        let guild = update_guild(
            &*cmd.data.database,
            &guild_id,
            GuildSettingsUpdate {
                timezone: Some(timezone.clone()),
                ..GuildSettingsUpdate::default()
            },
        )
        .await?;

        let zone = resolve_guild_timezone(&guild).name();
        let text = match timezone {
            Some(_) => format!("The guild day now starts at midnight in `{zone}`."),
            None => format!("The guild day follows the server locale again (`{zone}`)."),
        };
        cmd.say(done(text)).await
    })
}

pub fn guild_audit<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "guild audit <deleted|edited> <channel|none>";
        let guild_id = cmd.guild()?.to_string();
        let kind = arg(args, 0, USAGE)?.to_ascii_lowercase();
        let raw = arg(args, 1, USAGE)?;
        let channel = if is_clear(raw) {
            None
        } else {
            Some(parse_channel(raw).ok_or_else(|| usage(USAGE))?.to_string())
        };

        let mut update = GuildSettingsUpdate::default();
        match kind.as_str() {
            "deleted" | "delete" => update.message_deleted_audit_channel_id = Some(channel.clone()),
            "edited" | "edit" => update.message_edited_audit_channel_id = Some(channel.clone()),
            _ => return Err(usage(USAGE)),
        }
        update_guild(&*cmd.data.database, &guild_id, update).await?;

        let text = match channel {
            Some(channel) => format!("Message {kind} logs now go to <#{channel}>."),
            None => format!("Message {kind} logs are off."),
        };
        cmd.say(done(text)).await
    })
}

pub fn guild_support_role<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "guild support-role <role|none>";
        let guild_id = cmd.guild()?.to_string();
        let raw = arg(args, 0, USAGE)?;
        let role = if is_clear(raw) {
            None
        } else {
            Some(parse_role(raw).ok_or_else(|| usage(USAGE))?.to_string())
        };
        update_guild(
            &*cmd.data.database,
            &guild_id,
            GuildSettingsUpdate {
                support_role_id: Some(role.clone()),
                ..GuildSettingsUpdate::default()
            },
        )
        .await?;

        let text = match role {
            Some(role) => format!("Members with <@&{role}> now count as supporters."),
            None => "The supporter role is cleared.".to_string(),
        };
        cmd.say(done(text)).await
    })
}

fn blacklist_target(
    cmd: &CommandContext<'_>,
    args: &[String],
    text: &str,
) -> Result<(BlacklistScope, serenity::ChannelId)> {
    let raw = arg(args, 0, text)?;
    let scope = BlacklistScope::parse(raw).ok_or_else(|| Error::Command {
        message: format!(
            "Unknown scope `{raw}`. Scopes: {}",
            BlacklistScope::ALL.map(BlacklistScope::as_str).join(", ")
        ),
    })?;
    let channel = match args.get(1) {
        Some(raw) => parse_channel(raw).ok_or_else(|| usage(text))?,
        None => cmd.channel_id,
    };
    Ok((scope, channel))
}

pub fn blacklist_add<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let guild_id = cmd.guild()?.to_string();
        let (scope, channel) = blacklist_target(cmd, args, "blacklist add <scope> [channel]")?;
        add_channel(&*cmd.data.database, &guild_id, &channel.to_string(), scope).await?;
        cmd.say(done(format!(
            "<#{channel}> is excluded from `{}`.",
            scope.as_str()
        )))
        .await
    })
}

pub fn blacklist_remove<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let guild_id = cmd.guild()?.to_string();
        let (scope, channel) = blacklist_target(cmd, args, "blacklist remove <scope> [channel]")?;
        let removed =
            remove_channel(&*cmd.data.database, &guild_id, &channel.to_string(), scope).await?;
        let reply = if removed {
            done(format!("<#{channel}> counts for `{}` again.", scope.as_str()))
        } else {
            Reply::denial(format!(
                "<#{channel}> was not excluded from `{}`.",
                scope.as_str()
            ))
        };
        cmd.say(reply).await
    })
}

pub fn blacklist_list<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let guild_id = cmd.guild()?.to_string();
        let rows = list_guild(&*cmd.data.database, &guild_id).await?;
        let description = if rows.is_empty() {
            "No channel is excluded.".to_string()
        } else {
            rows.iter()
                .map(|row| format!("<#{}>: `{}`", row.channel_id, row.scope.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        };
        cmd.say(Reply::embed(
            serenity::CreateEmbed::default()
                .title("Excluded channels")
                .description(description)
                .color(colors::BLUE),
        ))
        .await
    })
}

pub fn reward_set<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "reward set <level> <role|none> <coins> [stackable]";
        let guild_id = cmd.guild()?.to_string();
        let at_level: i64 = arg(args, 0, USAGE)?.parse().map_err(|_| usage(USAGE))?;
        let raw_role = arg(args, 1, USAGE)?;
        let role = if is_clear(raw_role) {
            None
        } else {
            Some(parse_role(raw_role).ok_or_else(|| usage(USAGE))?.to_string())
        };
        let coins: i64 = arg(args, 2, USAGE)?.parse().map_err(|_| usage(USAGE))?;
        let is_stackable = args
            .get(3)
            .is_some_and(|raw| ["stackable", "yes", "true"].iter().any(|word| raw.eq_ignore_ascii_case(word)));

        set_reward(
            &*cmd.data.database,
            &guild_id,
            at_level,
            role.clone(),
            coins,
            is_stackable,
        )
        .await?;

        let role_text = role.map_or_else(|| "no role".to_string(), |role| format!("<@&{role}>"));
        cmd.say(done(format!(
            "Level {at_level} now gives {role_text} and {coins} coins{}.",
            if is_stackable { " (stackable)" } else { "" }
        )))
        .await
    })
}

pub fn reward_remove<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "reward remove <level>";
        let guild_id = cmd.guild()?.to_string();
        let at_level: i64 = arg(args, 0, USAGE)?.parse().map_err(|_| usage(USAGE))?;
        let reply = if remove_reward(&*cmd.data.database, &guild_id, at_level).await? {
            done(format!("Level {at_level} no longer has a reward."))
        } else {
            Reply::denial(format!("Level {at_level} has no reward."))
        };
        cmd.say(reply).await
    })
}

pub fn reward_list<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let guild_id = cmd.guild()?.to_string();
        let rewards = list_rewards(&*cmd.data.database, &guild_id).await?;
        let description = if rewards.is_empty() {
            "No level rewards yet.".to_string()
        } else {
            rewards
                .iter()
                .map(|reward| {
                    let role = reward
                        .role_id
                        .as_ref()
                        .map_or_else(|| "no role".to_string(), |role| format!("<@&{role}>"));
                    format!(
                        "Level {}: {role}, {} coins{}",
                        reward.at_level,
                        reward.coins_reward,
                        if reward.is_stackable { ", stackable" } else { "" }
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        cmd.say(Reply::embed(
            serenity::CreateEmbed::default()
                .title("Level rewards")
                .description(description)
                .color(colors::BLUE),
        ))
        .await
    })
}

pub fn shop_open<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "shop open <name> [hours]";
        let guild_id = cmd.guild()?.to_string();
        let name = arg(args, 0, USAGE)?;
        let expires_at = closes_at(args.get(1), Utc::now(), USAGE)?;
        let shop = upsert_shop(
            &*cmd.data.database,
            &guild_id,
            name,
            ShopUpdate {
                is_open: Some(true),
                expires_at: Some(expires_at),
            },
        )
        .await?;
        info!("Shop {} opened in {}", shop.name, guild_id);
        let until = expires_at.map_or_else(String::new, |at| format!(" until <t:{}:f>", at.timestamp()));
        cmd.say(done(format!("Shop `{}` is open{until}.", shop.name))).await
    })
}

pub fn shop_close<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "shop close <name>";
        let guild_id = cmd.guild()?.to_string();
        let name = normalize_shop_name(arg(args, 0, USAGE)?)?;
        let db = &*cmd.data.database;
        if find_shop(db, &guild_id, &name).await?.is_none() {
            return cmd.say(Reply::denial(format!("There is no shop named `{name}`."))).await;
        }
        let update = ShopUpdate {
            is_open: Some(false),
            expires_at: Some(None),
        };
        upsert_shop(db, &guild_id, &name, update).await?;
        cmd.say(done(format!("Shop `{name}` is closed."))).await
    })
}

pub fn shop_remove<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "shop remove <name>";
        let guild_id = cmd.guild()?.to_string();
        let name = arg(args, 0, USAGE)?;
        let reply = if remove_shop(&*cmd.data.database, &guild_id, name).await? {
            done(format!("Shop `{name}` and its roles were removed."))
        } else {
            Reply::denial(format!("There is no shop named `{name}`."))
        };
        cmd.say(reply).await
    })
}

pub fn shop_clear<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let guild_id = cmd.guild()?.to_string();
        let removed = clear_shops(&*cmd.data.database, &guild_id).await?;
        info!("Cleared {} shops in {}", removed, guild_id);
        cmd.say(done(format!("Removed {removed} shops."))).await
    })
}

pub fn shop_item<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "shop item <shop> <role> <cost> [stock]";
        let guild_id = cmd.guild()?.to_string();
        let shop_name = arg(args, 0, USAGE)?;
        let role = parse_role(arg(args, 1, USAGE)?).ok_or_else(|| usage(USAGE))?;
        let cost: i64 = arg(args, 2, USAGE)?.parse().map_err(|_| usage(USAGE))?;
        let stock = match args.get(3) {
            Some(raw) if !is_clear(raw) => Some(raw.parse::<i64>().map_err(|_| usage(USAGE))?),
            _ => None,
        };

        let item = upsert_item(
            &*cmd.data.database,
            &guild_id,
            shop_name,
            &role.to_string(),
            cost,
            stock,
        )
        .await?;
        let stock_text = item.stock.map_or_else(|| "unlimited stock".to_string(), |left| format!("{left} in stock"));
        cmd.say(done(format!(
            "<@&{role}> is sold in `{}` for {} coins, {stock_text}.",
            item.shop_name, item.cost
        )))
        .await
    })
}

pub fn shop_unlist<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "shop unlist <role>";
        let guild_id = cmd.guild()?.to_string();
        let role = parse_role(arg(args, 0, USAGE)?).ok_or_else(|| usage(USAGE))?;
        let reply = if remove_item(&*cmd.data.database, &guild_id, &role.to_string()).await? {
            done(format!("<@&{role}> is no longer sold."))
        } else {
            Reply::denial(format!("<@&{role}> is not sold in any shop."))
        };
        cmd.say(reply).await
    })
}

pub fn shop_restock<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "shop restock <role> <amount>";
        let guild_id = cmd.guild()?.to_string();
        let role = parse_role(arg(args, 0, USAGE)?).ok_or_else(|| usage(USAGE))?;
        let amount: i64 = arg(args, 1, USAGE)?.parse().map_err(|_| usage(USAGE))?;
        let item = restock(&*cmd.data.database, &guild_id, &role.to_string(), amount).await?;
        cmd.say(done(format!(
            "<@&{role}> now has {} in stock.",
            item.stock.unwrap_or_default()
        )))
        .await
    })
}
