//! Guild messages: prefix command dispatch and activity rewards.

use super::random_event::maybe_spawn_event;
use crate::{
    bot::{
        BotData, GatewayEvent,
        actor::resolve_actor,
        commands::finish,
        levels::celebrate,
        respond::{CommandContext, colors},
    },
    core::{
        activity::{MessageActivity, reward_message},
        blacklist::channel_scopes,
        commands::{Routed, strip_prefix},
        ledger::MemberKey,
    },
    entities::BlacklistScope,
    errors::Result,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use rand::{SeedableRng, rngs::StdRng};
use tracing::debug;

/// Runs a prefix command when `message` is one.
///
/// Returns whether the message resolved to a command, in which case it earns
/// no activity rewards.
async fn dispatch(
    ctx: &serenity::Context,
    data: &BotData,
    message: &serenity::Message,
    guild_id: serenity::GuildId,
) -> Result<bool> {
    let Some(tokens) = strip_prefix(&message.content, &data.config.prefix) else {
        return Ok(false);
    };
    if data.registry.resolve(&tokens).is_none() {
        return Ok(false);
    }

    let scopes = channel_scopes(
        &*data.database,
        &guild_id.to_string(),
        &message.channel_id.to_string(),
    )
    .await?;
    if scopes.contains(&BlacklistScope::Command) {
        debug!("Commands are off in channel {}", message.channel_id);
        return Ok(true);
    }

    let actor = resolve_actor(
        ctx,
        data,
        message.author.id,
        Some(guild_id),
        message.channel_id,
        None,
    )
    .await?;
    match data.registry.route_message(&tokens, &actor) {
        Routed::Message {
            command,
            handler,
            args,
        } => {
            debug!("{} ran prefix command '{}'", message.author.id, command.name);
            let cmd = CommandContext::message(ctx, data, message);
            let result = handler(&cmd, &args).await;
            finish(&cmd, result).await?;
        }
        Routed::Ignored(reason) => {
            debug!("Ignored prefix command from {}: {:?}", message.author.id, reason);
        }
        Routed::Interaction { .. } => {}
    }
    Ok(true)
}

/// Handles every guild message from a human.
pub fn on_message<'a>(data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let serenity::FullEvent::Message { new_message: message } = &event.event else {
            return Ok(());
        };
        let Some(guild_id) = message.guild_id else {
            return Ok(());
        };
        if message.author.bot {
            return Ok(());
        }
        let ctx = &event.ctx;
        let now = Utc::now();
        let key = MemberKey::new(message.author.id.to_string(), guild_id.to_string());

        let spam_score = data
            .spam
            .observe(&key.user_id, &key.guild_id, &message.content, now)
            .await;

        if dispatch(ctx, data, message, guild_id).await? {
            return Ok(());
        }

        let activity = MessageActivity {
            key: key.clone(),
            channel_id: message.channel_id.to_string(),
            premium_since: message
                .member
                .as_ref()
                .and_then(|member| member.premium_since)
                .and_then(|since| DateTime::from_timestamp(since.unix_timestamp(), 0)),
            spam_score,
            sent_at: now,
        };
        let report = {
            let mut rng = StdRng::from_os_rng();
            reward_message(&*data.database, &activity, &mut rng).await?
        };

        if let Some(change) = &report.level {
            celebrate(ctx, data, &key, change, Some(message.channel_id)).await?;
        }
        if report.quest_completed {
            let notice = serenity::CreateEmbed::default()
                .description(format!(
                    "<@{}> finished today's quest. Use `{}quest claim` to collect the rewards.",
                    message.author.id, data.config.prefix
                ))
                .color(colors::GREEN);
            message
                .channel_id
                .send_message(&ctx.http, serenity::CreateMessage::new().embed(notice))
                .await?;
        }

        maybe_spawn_event(ctx, data, guild_id, message.channel_id, now).await
    })
}
