//! Keeps the stored guild locale in step with Discord, it picks the default
//! time zone of the guild day.

use crate::{
    bot::{BotData, GatewayEvent},
    core::guild::{GuildSettingsUpdate, find_or_create_guild, guild_timezone, update_guild},
    errors::Result,
};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use tracing::info;

/// Locale to store, `None` when the stored one is current.
fn locale_change(stored: Option<&str>, reported: &str) -> Option<Option<String>> {
    let reported = Some(reported.trim()).filter(|locale| !locale.is_empty());
    (stored != reported).then(|| reported.map(str::to_string))
}

async fn record_locale(data: &BotData, guild_id: serenity::GuildId, reported: &str) -> Result<()> {
    let guild_id = guild_id.to_string();
    let guild = find_or_create_guild(&*data.database, &guild_id).await?;
    let Some(locale) = locale_change(guild.preferred_locale.as_deref(), reported) else {
        return Ok(());
    };

    let guild = update_guild(
        &*data.database,
        &guild_id,
        GuildSettingsUpdate {
            preferred_locale: Some(locale),
            ..GuildSettingsUpdate::default()
        },
    )
    .await?;
    info!(
        "Guild {} locale is {:?}, guild day in {}",
        guild_id,
        guild.preferred_locale,
        guild_timezone(&guild).name()
    );
    Ok(())
}

pub fn on_guild_create<'a>(data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if let serenity::FullEvent::GuildCreate { guild, .. } = &event.event {
            record_locale(data, guild.id, &guild.preferred_locale).await?;
        }
        Ok(())
    })
}

pub fn on_guild_update<'a>(data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if let serenity::FullEvent::GuildUpdate { new_data, .. } = &event.event {
            record_locale(data, new_data.id, &new_data.preferred_locale).await?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_change() {
        assert_eq!(locale_change(None, "fr"), Some(Some("fr".to_string())));
        assert_eq!(locale_change(Some("fr"), "fr"), None);
        assert_eq!(locale_change(Some("fr"), "de"), Some(Some("de".to_string())));
        assert_eq!(locale_change(Some("fr"), ""), Some(None));
        assert_eq!(locale_change(None, " "), None);
    }
}
