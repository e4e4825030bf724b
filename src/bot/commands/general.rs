//! General commands - ping, help and server information.

use crate::{
    bot::respond::{CommandContext, Reply, colors},
    errors::Result,
};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use std::fmt::Write as _;

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{bot::{Context, respond::CommandContext}, errors::Result};

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command)]
    pub async fn ping(ctx: Context<'_>) -> Result<()> {
        super::run_ping(&CommandContext::slash(ctx)).await
    }

    /// Lists the commands of the bot.
    #[poise::command(slash_command)]
    pub async fn help(ctx: Context<'_>) -> Result<()> {
        super::run_help(&CommandContext::slash(ctx)).await
    }

    /// Server commands.
    #[poise::command(
        slash_command,
        guild_only,
        subcommands("guild_info"),
        subcommand_required
    )]
    pub async fn guild(_ctx: Context<'_>) -> Result<()> {
        Ok(())
    }

    /// Shows information about this server.
    #[poise::command(slash_command, guild_only, rename = "info")]
    pub async fn guild_info(ctx: Context<'_>) -> Result<()> {
        super::run_guild_info(&CommandContext::slash(ctx)).await
    }
}

pub use inner::*;

async fn run_ping(cmd: &CommandContext<'_>) -> Result<()> {
    cmd.say(Reply::text("Pong!")).await
}

async fn run_help(cmd: &CommandContext<'_>) -> Result<()> {
    let prefix = &cmd.data.config.prefix;
    let mut slash = String::new();
    let mut text = String::new();
    for command in cmd.data.registry.commands() {
        if command.on_interaction.is_some() {
            writeln!(slash, "`/{}` {}", command.name, command.description)?;
        } else if command.on_message.is_some() {
            writeln!(text, "`{prefix}{}` {}", command.name, command.description)?;
        }
    }

    let embed = serenity::CreateEmbed::default()
        .title("Guildkeeper Help")
        .description(format!(
            "Every slash command also works as `{prefix}<name>`. \
             Commands only show up when your server and your permissions allow them."
        ))
        .field("Commands", slash, false)
        .field("Management", text, false)
        .color(colors::BLUE);
    cmd.say(Reply::embed(embed)).await
}

/// Channels of a guild by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ChannelCounts {
    total: usize,
    text: usize,
    voice: usize,
    stage: usize,
    category: usize,
}

fn count_channels(kinds: impl IntoIterator<Item = serenity::ChannelType>) -> ChannelCounts {
    let mut counts = ChannelCounts::default();
    for kind in kinds {
        counts.total += 1;
        match kind {
            serenity::ChannelType::Text => counts.text += 1,
            serenity::ChannelType::Voice => counts.voice += 1,
            serenity::ChannelType::Stage => counts.stage += 1,
            serenity::ChannelType::Category => counts.category += 1,
            _ => {}
        }
    }
    counts
}

/// Cached members by kind and presence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MemberCounts {
    total: usize,
    humans: usize,
    bots: usize,
    online: usize,
    dnd: usize,
    idle: usize,
}

/// Counts `(is_bot, status)` pairs; members without a presence are offline.
fn count_members(
    members: impl IntoIterator<Item = (bool, Option<serenity::OnlineStatus>)>,
) -> MemberCounts {
    let mut counts = MemberCounts::default();
    for (is_bot, status) in members {
        counts.total += 1;
        if is_bot {
            counts.bots += 1;
        } else {
            counts.humans += 1;
        }
        match status {
            Some(serenity::OnlineStatus::Online) => counts.online += 1,
            Some(serenity::OnlineStatus::DoNotDisturb) => counts.dnd += 1,
            Some(serenity::OnlineStatus::Idle) => counts.idle += 1,
            _ => {}
        }
    }
    counts
}

fn boost_level(tier: serenity::PremiumTier) -> String {
    match u8::from(tier) {
        0 => "None".to_string(),
        3 => "Level **MAX**".to_string(),
        level => format!("Level **{level}**"),
    }
}

fn guild_info_embed(guild: &serenity::Guild) -> Result<serenity::CreateEmbed> {
    let channels = count_channels(guild.channels.values().map(|channel| channel.kind));
    let members = count_members(guild.members.values().map(|member| {
        (
            member.user.bot,
            guild.presences.get(&member.user.id).map(|presence| presence.status),
        )
    }));
    let created = guild.id.created_at().unix_timestamp();

    let mut about = String::new();
    if let Some(description) = &guild.description {
        writeln!(about, "> {description}")?;
    }
    writeln!(about, "**ID** `{}`", guild.id)?;
    writeln!(about, "**Owner** <@{}>", guild.owner_id)?;
    writeln!(
        about,
        "**Boosts** {} ({})",
        guild.premium_subscription_count.unwrap_or(0),
        boost_level(guild.premium_tier)
    )?;
    write!(about, "**Created** <t:{created}> (<t:{created}:R>)")?;

    let channel_text = format!(
        "{} total\n{} text\n{} voice\n{} stage\n{} categories",
        channels.total, channels.text, channels.voice, channels.stage, channels.category
    );
    let mut member_text = String::new();
    if let Some(max) = guild.max_members {
        writeln!(member_text, "{max} max")?;
    }
    write!(
        member_text,
        "{} total\n{} members\n{} bots\n{} online\n{} do not disturb\n{} idle",
        members.total, members.humans, members.bots, members.online, members.dnd, members.idle
    )?;

    let mut embed = serenity::CreateEmbed::default()
        .title(guild.name.clone())
        .description(about)
        .field("Channels", channel_text, true)
        .field("Members", member_text, true)
        .color(colors::BLUE);
    if let Some(icon) = guild.icon_url() {
        embed = embed.thumbnail(icon);
    }
    Ok(embed)
}

async fn run_guild_info(cmd: &CommandContext<'_>) -> Result<()> {
    let guild_id = cmd.guild()?;
    let embed = cmd
        .serenity
        .cache
        .guild(guild_id)
        .map(|guild| guild_info_embed(&guild))
        .transpose()?;
    let reply = match embed {
        Some(embed) => Reply::embed(embed),
        None => Reply::denial("Server information is not available yet."),
    };
    cmd.say(reply).await
}

pub fn ping_message<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_ping(cmd))
}

pub fn help_message<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_help(cmd))
}

pub fn guild_info_message<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_guild_info(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_channels() {
        let counts = count_channels([
            serenity::ChannelType::Text,
            serenity::ChannelType::Text,
            serenity::ChannelType::Voice,
            serenity::ChannelType::Category,
            serenity::ChannelType::News,
        ]);
        assert_eq!(
            counts,
            ChannelCounts {
                total: 5,
                text: 2,
                voice: 1,
                stage: 0,
                category: 1,
            }
        );
    }

    #[test]
    fn test_count_members_treats_missing_presence_as_offline() {
        let counts = count_members([
            (false, Some(serenity::OnlineStatus::Online)),
            (false, Some(serenity::OnlineStatus::Idle)),
            (false, None),
            (true, Some(serenity::OnlineStatus::DoNotDisturb)),
        ]);
        assert_eq!(counts.total, 4);
        assert_eq!(counts.humans, 3);
        assert_eq!(counts.bots, 1);
        assert_eq!((counts.online, counts.dnd, counts.idle), (1, 1, 1));
    }

    #[test]
    fn test_boost_level() {
        assert_eq!(boost_level(serenity::PremiumTier::Tier0), "None");
        assert_eq!(boost_level(serenity::PremiumTier::Tier2), "Level **2**");
        assert_eq!(boost_level(serenity::PremiumTier::Tier3), "Level **MAX**");
    }
}
