//! Moderation audit log: deleted and edited messages.
//!
//! Message contents come from the serenity message cache, so messages sent
//! before the bot started, or evicted since, are not logged.

use crate::{
    bot::{BotData, GatewayEvent, respond::colors},
    core::guild::find_or_create_guild,
    errors::Result,
};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use tracing::debug;

/// Longest text an embed field holds.
const FIELD_LIMIT: usize = 1024;

fn field_text(content: &str) -> String {
    content.chars().take(FIELD_LIMIT).collect()
}

fn audit_embed(author: &serenity::User, channel_id: serenity::ChannelId, title: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::default()
        .author(serenity::CreateEmbedAuthor::new(&author.name).icon_url(author.face()))
        .description(format!("**{title}**"))
        .field("Channel", format!("<#{channel_id}>"), false)
        .footer(serenity::CreateEmbedFooter::new(format!("UID: {}", author.id)))
        .timestamp(serenity::Timestamp::now())
}

fn parse_channel_id(raw: Option<&str>) -> Option<serenity::ChannelId> {
    raw.and_then(|raw| raw.parse::<u64>().ok())
        .filter(|id| *id != 0)
        .map(serenity::ChannelId::new)
}

/// Logs a deleted message in the guild's deletion audit channel.
pub fn on_message_delete<'a>(data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let serenity::FullEvent::MessageDelete {
            channel_id,
            deleted_message_id,
            guild_id: Some(guild_id),
        } = &event.event
        else {
            return Ok(());
        };
        let Some(message) = event
            .ctx
            .cache
            .message(*channel_id, *deleted_message_id)
            .map(|message| message.clone())
        else {
            debug!("Deleted message {} was not cached", deleted_message_id);
            return Ok(());
        };
        if message.author.bot || message.content.is_empty() {
            return Ok(());
        }

        let guild = find_or_create_guild(&*data.database, &guild_id.to_string()).await?;
        let Some(audit_channel) = parse_channel_id(guild.message_deleted_audit_channel_id.as_deref())
        else {
            return Ok(());
        };

        let embed = audit_embed(&message.author, *channel_id, "Message deleted")
            .field("Content", field_text(&message.content), false)
            .color(colors::RED);
        audit_channel
            .send_message(&event.ctx.http, serenity::CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    })
}

/// Logs an edited message, with its old and new content, in the guild's
/// edit audit channel.
pub fn on_message_update<'a>(data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let serenity::FullEvent::MessageUpdate {
            old_if_available: Some(old),
            event: update,
            ..
        } = &event.event
        else {
            return Ok(());
        };
        let Some(guild_id) = update.guild_id else {
            return Ok(());
        };
        let author = update.author.as_ref().unwrap_or(&old.author);
        let Some(content) = update.content.as_deref() else {
            return Ok(());
        };
        if author.bot || old.content.is_empty() || content.is_empty() || old.content == content {
            return Ok(());
        }

        let guild = find_or_create_guild(&*data.database, &guild_id.to_string()).await?;
        let Some(audit_channel) = parse_channel_id(guild.message_edited_audit_channel_id.as_deref())
        else {
            return Ok(());
        };

        let embed = audit_embed(author, update.channel_id, "Message edited")
            .field("Before", field_text(&old.content), false)
            .field("After", field_text(content), false)
            .color(colors::ORANGE);
        audit_channel
            .send_message(&event.ctx.http, serenity::CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_text_truncates_on_chars() {
        let long = "é".repeat(FIELD_LIMIT + 10);
        let text = field_text(&long);
        assert_eq!(text.chars().count(), FIELD_LIMIT);
        assert_eq!(field_text("short"), "short");
    }

    #[test]
    fn test_parse_channel_id() {
        assert_eq!(parse_channel_id(Some("123")), Some(serenity::ChannelId::new(123)));
        assert_eq!(parse_channel_id(Some("0")), None);
        assert_eq!(parse_channel_id(Some("general")), None);
        assert_eq!(parse_channel_id(None), None);
    }
}
