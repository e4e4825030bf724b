//! Gateway event handlers, subscribed on the event bus by event name.

/// Message delete and edit audit log
pub mod audit;
/// Guild locale sync
pub mod guild;
/// Supporter role sync
pub mod members;
/// Prefix commands and activity rewards
pub mod message;
/// Random event prompts
pub mod random_event;
/// Voice session tracking
pub mod voice;

use crate::{
    bot::{BotData, Bus, GatewayEvent, reporter::HubReporter},
    config::settings::AppConfig,
    errors::Result,
};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::info;

fn on_ready<'a>(_data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if let serenity::FullEvent::Ready { data_about_bot } = &event.event {
            info!(
                "{} is connected to {} guild(s)",
                data_about_bot.user.name,
                data_about_bot.guilds.len()
            );
        }
        Ok(())
    })
}

/// Builds the event bus with every gateway handler subscribed.
#[must_use]
pub fn bus(config: Arc<AppConfig>) -> Bus {
    let reporter = HubReporter::new(config.hub_heart_logs_channel_id.as_deref());
    let mut bus = Bus::new(Arc::new(reporter));

    bus.once("ready", on_ready);
    bus.on("message", message::on_message);
    bus.on("voice_state_update", voice::on_voice_state_update);
    bus.on("channel_update", voice::on_channel_update);
    bus.on("guild_create", guild::on_guild_create);
    bus.on("guild_create", voice::on_guild_create);
    bus.on("guild_update", guild::on_guild_update);
    bus.on("message_delete", audit::on_message_delete);
    bus.on("message_update", audit::on_message_update);
    bus.on("guild_member_update", members::on_member_update);
    bus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_config;

    #[test]
    fn test_bus_subscribes_gateway_events() {
        let rendered = format!("{:?}", bus(Arc::new(test_config())));
        for name in ["ready", "message", "voice_state_update", "guild_create", "guild_update", "message_delete"] {
            assert!(rendered.contains(name), "missing {name}");
        }
    }
}
