//! Discord command implementations organized by category.
//!
//! Every command body takes a [`CommandContext`] so the slash entry point and
//! the prefix handler share it. [`registry`] lists each command once, with its
//! routes, access policy and the handlers it supports.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Guild configuration commands for managers
pub mod admin;

/// Developer-only authority and debug commands
pub mod debug;

/// Wallet, vault, work and rob commands
pub mod economy;

/// Help and ping
pub mod general;

/// Stats, level and quest commands
pub mod member;

/// Role shops and unequip
pub mod shop;

use crate::{
    bot::{MessageHandler, Registry, SlashCommand, respond::{CommandContext, Reply}},
    core::{access::AccessPolicy, commands::CommandDefinition},
    entities::ModuleName,
    errors::{Error, Result},
};
use poise::serenity_prelude as serenity;

type Definition = CommandDefinition<SlashCommand, MessageHandler>;

fn manager() -> AccessPolicy {
    AccessPolicy::default().require_permissions(serenity::Permissions::MANAGE_GUILD.bits())
}

fn developer() -> AccessPolicy {
    AccessPolicy::default().developer_only()
}

fn module(module: ModuleName) -> AccessPolicy {
    AccessPolicy::default().require_module(module)
}

/// Builds the registry of every command.
///
/// Fails when two commands claim the same route.
pub fn registry() -> Result<Registry> {
    let definitions: Vec<Definition> = vec![
        Definition::new("help", "List the available commands")
            .interaction(general::help)
            .message(general::help_message),
        Definition::new("ping", "Check that the bot responds")
            .interaction(general::ping)
            .message(general::ping_message),
        Definition::new("guild info", "Show information about this server")
            .interaction(general::guild)
            .message(general::guild_info_message),
        // Economy
        Definition::new("work", "Work a shift for coins")
            .access(AccessPolicy::default().require_setting(ModuleName::Eco, "is_work_enabled"))
            .interaction(economy::work)
            .message(economy::work_message),
        Definition::new("presence", "Claim the daily presence reward")
            .alias("daily")
            .access(module(ModuleName::Eco))
            .interaction(economy::presence)
            .message(economy::presence_message),
        Definition::new("rob", "Try to steal coins from a member")
            .access(AccessPolicy::default().require_setting(ModuleName::Eco, "is_rob_enabled"))
            .interaction(economy::rob)
            .message(economy::rob_message),
        Definition::new("deposit", "Move wallet coins into the vault")
            .alias("dep")
            .access(module(ModuleName::Eco))
            .interaction(economy::deposit)
            .message(economy::deposit_message),
        Definition::new("withdraw", "Move vault coins into the wallet")
            .alias("with")
            .access(module(ModuleName::Eco))
            .interaction(economy::withdraw)
            .message(economy::withdraw_message),
        Definition::new("currencies", "Show wallet and vault balances")
            .alias("balance")
            .alias("bal")
            .access(module(ModuleName::Eco))
            .interaction(economy::currencies)
            .message(economy::currencies_message),
        Definition::new("upgrade", "Buy the next vault tier")
            .access(module(ModuleName::Eco))
            .interaction(economy::upgrade)
            .message(economy::upgrade_message),
        // Shops
        Definition::new("shop", "Browse the role shops")
            .access(module(ModuleName::Eco))
            .interaction(shop::shop)
            .message(shop::shop_message),
        Definition::new("shop buy", "Buy a role from a shop")
            .access(module(ModuleName::Eco))
            .message(shop::buy_message),
        Definition::new("unequip", "Remove your shop roles")
            .access(module(ModuleName::Eco))
            .interaction(shop::unequip)
            .message(shop::unequip_message),
        // Member
        Definition::new("stats", "Show activity statistics")
            .interaction(member::stats)
            .message(member::stats_message),
        Definition::new("level", "Show level and XP progress")
            .alias("rank")
            .access(module(ModuleName::Level))
            .interaction(member::level)
            .message(member::level_message),
        Definition::new("quest", "Show today's quest")
            .access(module(ModuleName::Quest))
            .interaction(member::quest)
            .message(member::quest_message),
        Definition::new("quest claim", "Claim the rewards of a finished quest")
            .access(module(ModuleName::Quest))
            .message(member::quest_claim_message),
        // Guild managers
        Definition::new("module status", "Show the module toggles")
            .access(manager())
            .message(admin::module_status),
        Definition::new("module enable", "Turn a module on")
            .access(manager())
            .message(admin::module_enable),
        Definition::new("module disable", "Turn a module off")
            .access(manager())
            .message(admin::module_disable),
        Definition::new("module set", "Change one module setting")
            .access(manager())
            .message(admin::module_set),
        Definition::new("guild timezone", "Set the time zone of the guild day")
            .access(manager())
            .message(admin::guild_timezone),
        Definition::new("guild audit", "Set an audit log channel")
            .access(manager())
            .message(admin::guild_audit),
        Definition::new("guild support-role", "Set the supporter role")
            .access(manager())
            .message(admin::guild_support_role),
        Definition::new("blacklist add", "Exclude a channel from a feature")
            .access(manager())
            .message(admin::blacklist_add),
        Definition::new("blacklist remove", "Include a channel again")
            .access(manager())
            .message(admin::blacklist_remove),
        Definition::new("blacklist list", "List excluded channels")
            .access(manager())
            .message(admin::blacklist_list),
        Definition::new("reward set", "Set the reward of a level")
            .access(manager())
            .message(admin::reward_set),
        Definition::new("reward remove", "Remove the reward of a level")
            .access(manager())
            .message(admin::reward_remove),
        Definition::new("reward list", "List level rewards")
            .access(manager())
            .message(admin::reward_list),
        Definition::new("shop open", "Open a shop, optionally for some hours")
            .access(manager())
            .message(admin::shop_open),
        Definition::new("shop close", "Close a shop")
            .access(manager())
            .message(admin::shop_close),
        Definition::new("shop remove", "Delete a shop and its roles")
            .access(manager())
            .message(admin::shop_remove),
        Definition::new("shop clear", "Delete every shop")
            .access(manager())
            .message(admin::shop_clear),
        Definition::new("shop item", "Sell a role in a shop")
            .access(manager())
            .message(admin::shop_item),
        Definition::new("shop unlist", "Stop selling a role")
            .access(manager())
            .message(admin::shop_unlist),
        Definition::new("shop restock", "Add stock to a role")
            .access(manager())
            .message(admin::shop_restock),
        // Developers
        Definition::new("authority grant", "Grant a user flag")
            .access(developer())
            .message(debug::authority_grant),
        Definition::new("authority revoke", "Revoke a user flag")
            .access(developer())
            .message(debug::authority_revoke),
        Definition::new("debug sessions view", "List the voice sessions of this guild")
            .access(developer())
            .message(debug::sessions_view),
        Definition::new("debug sessions sync", "Rebuild voice sessions from the cache")
            .access(developer())
            .message(debug::sessions_sync),
        Definition::new("debug module reset", "Restore the default module settings")
            .access(developer())
            .message(debug::module_reset),
    ];

    let mut registry = Registry::new();
    for definition in definitions {
        registry.register(definition)?;
    }
    Ok(registry)
}

/// Slash commands to register with Discord.
pub fn slash_commands(registry: &Registry) -> Vec<poise::Command<crate::bot::BotData, Error>> {
    registry
        .commands()
        .filter_map(|command| command.on_interaction.map(|build| build()))
        .collect()
}

/// Text shown to the user for an expected failure, `None` for faults.
#[must_use]
pub fn denial_text(error: &Error) -> Option<String> {
    match error {
        Error::InsufficientFunds {
            available,
            required,
        } => Some(format!(
            "You don't have enough coins: {required} needed, {available} available."
        )),
        Error::VaultFull { capacity } => Some(format!(
            "Your vault is full ({capacity} coins). Upgrade it to store more."
        )),
        Error::EmptyVault => Some("Your vault is empty.".to_string()),
        Error::InvalidAmount { amount } => Some(format!("{amount} is not a valid amount.")),
        Error::Command { message } => Some(message.clone()),
        _ => None,
    }
}

/// Turns an expected failure into a denial reply; faults pass through.
pub async fn finish(cmd: &CommandContext<'_>, result: Result<()>) -> Result<()> {
    match result {
        Err(error) => match denial_text(&error) {
            Some(text) => cmd.say(Reply::denial(text)).await,
            None => Err(error),
        },
        ok => ok,
    }
}

/// Error for a malformed command argument.
pub(crate) fn usage(text: &str) -> Error {
    Error::Command {
        message: format!("Usage: `{text}`"),
    }
}

/// Reads a snowflake from a raw id or a user, role or channel mention.
#[must_use]
pub fn parse_snowflake(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .map_or(raw, |inner| inner.trim_start_matches(['@', '!', '&', '#']));
    inner.parse().ok().filter(|id| *id != 0)
}

#[must_use]
pub fn parse_user(raw: &str) -> Option<serenity::UserId> {
    parse_snowflake(raw).map(serenity::UserId::new)
}

#[must_use]
pub fn parse_channel(raw: &str) -> Option<serenity::ChannelId> {
    parse_snowflake(raw).map(serenity::ChannelId::new)
}

#[must_use]
pub fn parse_role(raw: &str) -> Option<serenity::RoleId> {
    parse_snowflake(raw).map(serenity::RoleId::new)
}
