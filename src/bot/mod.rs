//! Bot layer - Discord-specific interface over the core services
//!
//! Slash commands go through poise. Prefix commands and every gateway event
//! go through the core command registry and event bus, so both invocation
//! paths share the same access predicates.

/// Building actor attributes for access checks
pub mod actor;
/// Slash and prefix command implementations
pub mod commands;
/// Gateway event handlers
pub mod events;
/// Poise framework setup and client startup
pub mod framework;
/// Level-up roles and announcements
pub mod levels;
/// Fault reporting to the operator hub
pub mod reporter;
/// Replies shared by slash and prefix invocations
pub mod respond;

use crate::{
    config::settings::AppConfig,
    core::{
        commands::CommandRegistry,
        economy::EconomyService,
        events::{BusEvent, EventBus},
        modules::ModuleDefaults,
        spam::SpamTracker,
        voice::CallSessionManager,
    },
    errors::{Error, Result},
};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Poise context used by every slash command.
pub type Context<'a> = poise::Context<'a, BotData, Error>;

/// Builds the poise definition of a slash command.
pub type SlashCommand = fn() -> poise::Command<BotData, Error>;

/// Handler of a prefix command.
pub type MessageHandler =
    for<'a, 'b> fn(&'a respond::CommandContext<'b>, &'a [String]) -> BoxFuture<'a, Result<()>>;

/// Registry of every command the bot knows.
pub type Registry = CommandRegistry<SlashCommand, MessageHandler>;

/// Event bus carrying gateway events.
pub type Bus = EventBus<BotData, GatewayEvent>;

/// A gateway event with the serenity context it arrived on.
#[derive(Clone)]
pub struct GatewayEvent {
    pub ctx: serenity::Context,
    pub event: serenity::FullEvent,
}

impl BusEvent for GatewayEvent {
    fn name(&self) -> &'static str {
        self.event.snake_case_name()
    }

    fn guild_id(&self) -> Option<String> {
        use serenity::FullEvent;

        let guild_id = match &self.event {
            FullEvent::Message { new_message } => new_message.guild_id,
            FullEvent::VoiceStateUpdate { new, .. } => new.guild_id,
            FullEvent::ChannelUpdate { new, .. } => Some(new.guild_id),
            FullEvent::MessageDelete { guild_id, .. } => *guild_id,
            FullEvent::MessageUpdate { event, .. } => event.guild_id,
            FullEvent::GuildMemberUpdate { event, .. } => Some(event.guild_id),
            _ => None,
        };
        guild_id.map(|id| id.to_string())
    }

    fn user_id(&self) -> Option<String> {
        use serenity::FullEvent;

        let user_id = match &self.event {
            FullEvent::Message { new_message } => Some(new_message.author.id),
            FullEvent::VoiceStateUpdate { new, .. } => Some(new.user_id),
            FullEvent::MessageUpdate { event, .. } => event.author.as_ref().map(|user| user.id),
            FullEvent::GuildMemberUpdate { event, .. } => Some(event.user.id),
            _ => None,
        };
        user_id.map(|id| id.to_string())
    }
}

/// Shared data available to all commands and event handlers.
pub struct BotData {
    /// Database connection for all database operations, shared with the
    /// periodic flush task
    pub database: Arc<DatabaseConnection>,
    /// HTTP client, for work outside a command or event context
    pub http: Arc<serenity::Http>,
    pub config: Arc<AppConfig>,
    /// Settings written into a guild module row on first use
    pub module_defaults: ModuleDefaults,
    /// Shared with the periodic flush task
    pub sessions: Arc<CallSessionManager>,
    pub spam: SpamTracker,
    pub registry: Registry,
    pub bus: Bus,
}

impl BotData {
    /// Wires the services around a database connection.
    ///
    /// Fails when two commands claim the same route.
    pub fn new(
        database: DatabaseConnection,
        http: Arc<serenity::Http>,
        config: Arc<AppConfig>,
        module_defaults: ModuleDefaults,
    ) -> Result<Self> {
        Ok(Self {
            sessions: Arc::new(CallSessionManager::default()),
            spam: SpamTracker::new(),
            registry: commands::registry()?,
            bus: events::bus(Arc::clone(&config)),
            database: Arc::new(database),
            http,
            config,
            module_defaults,
        })
    }
}

impl BotData {
    /// Economy service over the shared connection.
    #[must_use]
    pub fn economy(&self) -> EconomyService<'_, DatabaseConnection> {
        EconomyService::new(&*self.database)
    }
}

impl std::fmt::Debug for BotData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotData")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_bot_data_shares_one_connection() -> Result<()> {
        let db = setup_test_db().await?;
        let data = BotData::new(
            db,
            Arc::new(serenity::Http::new("token")),
            Arc::new(test_config()),
            ModuleDefaults::default(),
        )?;
        let alice = key("alice");

        data.economy().add_wallet_coins(&alice, 40).await?;
        let shared = Arc::clone(&data.database);
        assert_eq!(balances(&shared, &alice).await?, (40, 0));
        assert_eq!(data.economy().get_total_coins(&alice).await?.total, 40);
        Ok(())
    }
}
