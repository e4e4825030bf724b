//! Resolves the attributes of the user invoking a command.

use crate::{
    bot::BotData,
    core::{
        access::ActorAttributes,
        modules::guild_modules,
        users::{UserFlag, user_flags},
    },
    errors::Result,
};
use poise::serenity_prelude as serenity;

/// Permission bits and channel facts read from the cache.
#[derive(Debug, Default, Clone, Copy)]
struct CachedFacts {
    permissions: u64,
    is_guild_owner: bool,
    channel_is_nsfw: bool,
}

fn cached_facts(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    channel_id: serenity::ChannelId,
    user_id: serenity::UserId,
) -> CachedFacts {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return CachedFacts::default();
    };
    let channel = guild.channels.get(&channel_id);
    let permissions = match (guild.members.get(&user_id), channel) {
        (Some(member), Some(channel)) => guild.user_permissions_in(channel, member).bits(),
        _ => 0,
    };
    CachedFacts {
        permissions,
        is_guild_owner: guild.owner_id == user_id,
        channel_is_nsfw: channel.is_some_and(|channel| channel.nsfw),
    }
}

/// Builds the attributes access predicates are checked against.
///
/// `permissions` overrides the cached permission bits when the platform
/// already resolved them, as it does for interactions.
pub async fn resolve_actor(
    ctx: &serenity::Context,
    data: &BotData,
    user_id: serenity::UserId,
    guild_id: Option<serenity::GuildId>,
    channel_id: serenity::ChannelId,
    permissions: Option<serenity::Permissions>,
) -> Result<ActorAttributes> {
    let facts = guild_id
        .map(|guild_id| cached_facts(ctx, guild_id, channel_id, user_id))
        .unwrap_or_default();

    let user = user_id.to_string();
    let flags = user_flags(&*data.database, &user).await?;
    let modules = match guild_id {
        Some(guild_id) => guild_modules(&*data.database, &guild_id.to_string()).await?,
        None => Default::default(),
    };

    Ok(ActorAttributes {
        is_developer: data.config.is_developer(&user) || flags.contains(UserFlag::Developer),
        is_beta_tester: flags.contains(UserFlag::BetaTester),
        is_staff: flags.contains(UserFlag::Staff),
        is_guild_owner: facts.is_guild_owner,
        permissions: permissions.map_or(facts.permissions, |p| p.bits()),
        channel_id: channel_id.to_string(),
        channel_is_nsfw: facts.channel_is_nsfw,
        guild_id: guild_id.map(|id| id.to_string()),
        modules,
        user_id: user,
    })
}
