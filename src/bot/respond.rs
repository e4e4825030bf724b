//! Invocation context shared by slash and prefix commands.
//!
//! Command bodies are written once against [`CommandContext`] and reply with a
//! [`Reply`]; the context knows whether to answer the interaction or reply to
//! the triggering message.

use crate::{
    bot::{BotData, Context},
    core::ledger::MemberKey,
    errors::{Error, Result},
};
use poise::{CreateReply, serenity_prelude as serenity};

/// Embed colours used across replies.
pub mod colors {
    pub const GREEN: u32 = 0x002E_CC71;
    pub const RED: u32 = 0x00E7_4C3C;
    pub const BLUE: u32 = 0x0034_98DB;
    pub const GOLD: u32 = 0x00F1_C40F;
    pub const ORANGE: u32 = 0x00E6_7E22;
}

/// Message body independent of how it is sent.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub content: Option<String>,
    pub embed: Option<serenity::CreateEmbed>,
    pub components: Vec<serenity::CreateActionRow>,
}

impl Reply {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn embed(embed: serenity::CreateEmbed) -> Self {
        Self {
            embed: Some(embed),
            ..Self::default()
        }
    }

    /// Short red notice, used for denials.
    #[must_use]
    pub fn denial(text: impl Into<String>) -> Self {
        Self::embed(
            serenity::CreateEmbed::default()
                .description(text.into())
                .color(colors::RED),
        )
    }

    #[must_use]
    pub fn components(mut self, components: Vec<serenity::CreateActionRow>) -> Self {
        self.components = components;
        self
    }

    fn into_poise(self) -> CreateReply {
        let mut reply = CreateReply::default().components(self.components);
        if let Some(content) = self.content {
            reply = reply.content(content);
        }
        if let Some(embed) = self.embed {
            reply = reply.embed(embed);
        }
        reply
    }

    /// Builds a new channel message.
    #[must_use]
    pub fn into_message(self) -> serenity::CreateMessage {
        let mut message = serenity::CreateMessage::new().components(self.components);
        if let Some(content) = self.content {
            message = message.content(content);
        }
        if let Some(embed) = self.embed {
            message = message.embed(embed);
        }
        message
    }

    /// Builds the update of a message after a button click.
    #[must_use]
    pub fn into_update(self) -> serenity::CreateInteractionResponse {
        let mut message =
            serenity::CreateInteractionResponseMessage::new().components(self.components);
        if let Some(content) = self.content {
            message = message.content(content);
        }
        if let Some(embed) = self.embed {
            message = message.embed(embed);
        }
        serenity::CreateInteractionResponse::UpdateMessage(message)
    }
}

enum Origin<'a> {
    Slash(Context<'a>),
    Message(&'a serenity::Message),
}

/// Everything a command body needs, whichever way it was invoked.
pub struct CommandContext<'a> {
    pub serenity: &'a serenity::Context,
    pub data: &'a BotData,
    pub author: &'a serenity::User,
    pub guild_id: Option<serenity::GuildId>,
    pub channel_id: serenity::ChannelId,
    origin: Origin<'a>,
}

impl<'a> CommandContext<'a> {
    #[must_use]
    pub fn slash(ctx: Context<'a>) -> Self {
        Self {
            serenity: ctx.serenity_context(),
            data: ctx.data(),
            author: ctx.author(),
            guild_id: ctx.guild_id(),
            channel_id: ctx.channel_id(),
            origin: Origin::Slash(ctx),
        }
    }

    #[must_use]
    pub fn message(
        serenity: &'a serenity::Context,
        data: &'a BotData,
        message: &'a serenity::Message,
    ) -> Self {
        Self {
            serenity,
            data,
            author: &message.author,
            guild_id: message.guild_id,
            channel_id: message.channel_id,
            origin: Origin::Message(message),
        }
    }

    /// Guild of the invocation; commands are guild only.
    pub fn guild(&self) -> Result<serenity::GuildId> {
        self.guild_id.ok_or_else(|| Error::Command {
            message: "This command only works in a server".to_string(),
        })
    }

    /// Member key of the author in the invoking guild.
    pub fn author_key(&self) -> Result<MemberKey> {
        Ok(MemberKey::new(
            self.author.id.to_string(),
            self.guild()?.to_string(),
        ))
    }

    /// Sends `reply` and returns the message it produced.
    pub async fn send(&self, reply: Reply) -> Result<serenity::Message> {
        match &self.origin {
            Origin::Slash(ctx) => {
                let handle = ctx.send(reply.into_poise()).await?;
                Ok(handle.into_message().await?)
            }
            Origin::Message(message) => {
                let builder = reply.into_message().reference_message(*message);
                Ok(message
                    .channel_id
                    .send_message(&self.serenity.http, builder)
                    .await?)
            }
        }
    }

    /// Sends `reply`, discarding the message handle.
    pub async fn say(&self, reply: Reply) -> Result<()> {
        self.send(reply).await.map(drop)
    }

    /// Defers a slash response; no-op for prefix commands.
    pub async fn defer(&self) -> Result<()> {
        if let Origin::Slash(ctx) = &self.origin {
            ctx.defer().await?;
        }
        Ok(())
    }
}
