//! Level-up side effects: role rewards, reward coins and the announcement.

use crate::{
    bot::{BotData, commands::parse_role, respond::colors},
    core::{
        ledger::MemberKey,
        leveling::{LevelChange, list_rewards, plan_role_rewards},
        modules::find_module,
    },
    entities::ModuleName,
    errors::Result,
};
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

async fn existing_roles(ctx: &serenity::Context, guild_id: serenity::GuildId) -> Result<HashSet<String>> {
    let cached = ctx.cache.guild(guild_id).map(|guild| {
        guild
            .roles
            .keys()
            .map(ToString::to_string)
            .collect::<HashSet<_>>()
    });
    match cached {
        Some(roles) => Ok(roles),
        None => Ok(guild_id
            .roles(&ctx.http)
            .await?
            .keys()
            .map(ToString::to_string)
            .collect()),
    }
}

fn announcement(user_id: serenity::UserId, change: &LevelChange, coins: i64) -> serenity::CreateEmbed {
    let mut description = format!("<@{user_id}> reached level **{}**!", change.new_level);
    if coins > 0 {
        description.push_str(&format!("\nLevel reward: **{coins}** coins."));
    }
    if change.reached_max {
        description.push_str("\nThat's the highest level of this server.");
    }
    serenity::CreateEmbed::default()
        .title("Level up")
        .description(description)
        .color(colors::GOLD)
}

/// Applies the role rewards of a level change and announces it in
/// `channel_id`. No-op unless the member gained a level.
///
/// Role edits that Discord refuses are logged and skipped.
#[instrument(skip(ctx, data, change))]
pub async fn celebrate(
    ctx: &serenity::Context,
    data: &BotData,
    key: &MemberKey,
    change: &LevelChange,
    channel_id: Option<serenity::ChannelId>,
) -> Result<()> {
    if !change.leveled_up() {
        return Ok(());
    }
    let (Ok(guild_id), Ok(user_id)) = (key.guild_id.parse::<u64>(), key.user_id.parse::<u64>())
    else {
        return Ok(());
    };
    let guild_id = serenity::GuildId::new(guild_id);
    let user_id = serenity::UserId::new(user_id);

    let rewards = list_rewards(&*data.database, &key.guild_id).await?;
    let mut coins = 0;
    if !rewards.is_empty() {
        let member = guild_id.member(ctx, user_id).await?;
        let member_roles: HashSet<String> = member.roles.iter().map(ToString::to_string).collect();
        let existing = existing_roles(ctx, guild_id).await?;
        let plan = plan_role_rewards(&rewards, change.new_level, &member_roles, |role| {
            existing.contains(role)
        });

        for role in plan.add.iter().filter_map(|role| parse_role(role)) {
            if let Err(e) = member.add_role(&ctx.http, role).await {
                warn!("Failed to add level role {} to {}: {}", role, user_id, e);
            }
        }
        for role in plan.remove.iter().filter_map(|role| parse_role(role)) {
            if let Err(e) = member.remove_role(&ctx.http, role).await {
                warn!("Failed to remove level role {} from {}: {}", role, user_id, e);
            }
        }

        let eco_active = find_module(&*data.database, &key.guild_id, ModuleName::Eco)
            .await?
            .is_some_and(|module| module.is_active);
        if eco_active && plan.coins > 0 {
            data.economy().add_wallet_coins(key, plan.coins).await?;
            coins = plan.coins;
        }
    }

    info!("{:?} reached level {}", key, change.new_level);
    if let Some(channel_id) = channel_id {
        let message = serenity::CreateMessage::new().embed(announcement(user_id, change, coins));
        channel_id.send_message(&ctx.http, message).await?;
    }
    Ok(())
}
