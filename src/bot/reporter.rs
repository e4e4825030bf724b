//! Posts handler faults to the operator hub.

use crate::{
    bot::BotData,
    core::events::{FaultReporter, HandlerFault},
};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use tracing::{error, warn};

/// Logs every fault and mirrors it to the heart-logs channel when one is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubReporter {
    channel_id: Option<serenity::ChannelId>,
}

impl HubReporter {
    /// Reporter posting to `channel_id`, a raw snowflake.
    #[must_use]
    pub fn new(channel_id: Option<&str>) -> Self {
        let channel_id = channel_id.and_then(|raw| match raw.parse::<u64>() {
            Ok(id) if id != 0 => Some(serenity::ChannelId::new(id)),
            _ => {
                warn!("Ignoring invalid heart-logs channel id '{}'", raw);
                None
            }
        });
        Self { channel_id }
    }
}

fn fault_embed(fault: &HandlerFault) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::default()
        .title(format!("Handler fault: {}", fault.event))
        .description(format!("```\n{}\n```", fault.error))
        .color(crate::bot::respond::colors::RED)
        .timestamp(serenity::Timestamp::now());
    if let Some(guild_id) = &fault.guild_id {
        embed = embed.field("Guild", guild_id, true);
    }
    if let Some(user_id) = &fault.user_id {
        embed = embed.field("User", format!("<@{user_id}>"), true);
    }
    embed
}

impl FaultReporter<BotData> for HubReporter {
    fn report<'a>(&'a self, state: &'a BotData, fault: HandlerFault) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            error!("Handler fault: {}", fault);
            let Some(channel_id) = self.channel_id else {
                return;
            };
            let message = serenity::CreateMessage::new().embed(fault_embed(&fault));
            if let Err(e) = channel_id.send_message(&state.http, message).await {
                error!("Failed to post fault to the hub: {}", e);
            }
        })
    }
}
