//! Poise framework setup and client startup.

use crate::{
    bot::{BotData, Context, GatewayEvent, actor::resolve_actor, commands, reporter::HubReporter},
    config::settings::{AppConfig, Environment},
    core::{
        activity::reward_voice_minutes,
        blacklist::channel_scopes,
        events::{FaultReporter, HandlerFault},
        modules::ModuleDefaults,
        voice::CallSessionManager,
    },
    entities::BlacklistScope,
    errors::{Error, Result},
};
use chrono::Utc;
use poise::{CreateReply, serenity_prelude as serenity};
use rand::{SeedableRng, rngs::StdRng};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};

/// Messages kept per channel so deleted and edited messages can be audited.
const CACHED_MESSAGES: usize = 500;

fn ephemeral_denial(text: impl Into<String>) -> CreateReply {
    CreateReply::default()
        .embed(
            serenity::CreateEmbed::default()
                .description(text.into())
                .color(super::respond::colors::RED),
        )
        .ephemeral(true)
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            if let Some(text) = commands::denial_text(&error) {
                if let Err(e) = ctx.send(ephemeral_denial(text)).await {
                    error!("Failed to send denial: {}", e);
                }
                return;
            }

            let data = ctx.data();
            let fault = HandlerFault {
                event: "interaction_create",
                guild_id: ctx.guild_id().map(|id| id.to_string()),
                user_id: Some(ctx.author().id.to_string()),
                error: format!("/{}: {}", ctx.command().qualified_name, error),
            };
            HubReporter::new(data.config.hub_heart_logs_channel_id.as_deref())
                .report(data, fault)
                .await;
            if let Err(e) = ctx
                .send(ephemeral_denial("Something went wrong, the error has been reported."))
                .await
            {
                error!("Failed to send error message: {}", e);
            }
        }
        poise::FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            if let Some(error) = error {
                warn!("Access check of /{} failed: {}", ctx.command().qualified_name, error);
            }
            if let Err(e) = ctx
                .send(ephemeral_denial("You can't use this command here."))
                .await
            {
                error!("Failed to send denial: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Applies the registry access predicates and the command blacklist to slash
/// commands.
async fn command_check(ctx: Context<'_>) -> Result<bool> {
    let data = ctx.data();
    let qualified = &ctx.command().qualified_name;

    if let Some(guild_id) = ctx.guild_id() {
        let scopes = channel_scopes(
            &*data.database,
            &guild_id.to_string(),
            &ctx.channel_id().to_string(),
        )
        .await?;
        if scopes.contains(&BlacklistScope::Command) {
            return Ok(false);
        }
    }

    let permissions = match ctx {
        poise::Context::Application(app) => app
            .interaction
            .member
            .as_ref()
            .and_then(|member| member.permissions),
        poise::Context::Prefix(_) => None,
    };
    let actor = resolve_actor(
        ctx.serenity_context(),
        data,
        ctx.author().id,
        ctx.guild_id(),
        ctx.channel_id(),
        permissions,
    )
    .await?;
    let allowed = data.registry.allows_interaction(qualified, &actor);
    debug!("/{} by {} allowed={}", qualified, actor.user_id, allowed);
    Ok(allowed)
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, Error>,
    data: &BotData,
) -> Result<()> {
    let event = GatewayEvent {
        ctx: ctx.clone(),
        event: event.clone(),
    };
    let handled = data.bus.emit(data, &event).await;
    if handled > 0 {
        debug!("{} handled by {} subscriber(s)", event.event.snake_case_name(), handled);
    }
    Ok(())
}

/// Commits every open voice session on a fixed period.
async fn flush_voice_sessions(
    sessions: Arc<CallSessionManager>,
    database: Arc<DatabaseConnection>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let flushed = sessions.flush_all(&*database).await;
        if flushed.is_empty() {
            continue;
        }
        debug!("Flushed {} voice session(s)", flushed.len());

        let mut rng = StdRng::from_os_rng();
        for entry in &flushed {
            if let Err(e) =
                reward_voice_minutes(&*database, &entry.key, entry.minutes, Utc::now(), &mut rng).await
            {
                warn!("Failed to credit voice quest of {:?}: {}", entry.key, e);
            }
        }
    }
}

async fn register_commands(
    ctx: &serenity::Context,
    config: &AppConfig,
    commands: &[poise::Command<BotData, Error>],
) -> Result<()> {
    let dev_guild = config
        .dev_guild_id
        .as_deref()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    match (config.environment, dev_guild) {
        (Environment::Dev, Some(guild_id)) => {
            poise::builtins::register_in_guild(ctx, commands, guild_id).await?;
            info!("Registered {} commands in guild {}", commands.len(), guild_id);
        }
        (Environment::Dev, None) => {
            warn!("DEV_GUILD_ID is not set, skipping command registration");
        }
        (Environment::Prod, _) => {
            poise::builtins::register_globally(ctx, commands).await?;
            info!("Registered {} commands globally", commands.len());
        }
    }
    Ok(())
}

/// Builds the poise framework and runs the client until it stops.
#[instrument(skip_all)]
pub async fn run_bot(
    token: String,
    config: Arc<AppConfig>,
    database: DatabaseConnection,
    module_defaults: ModuleDefaults,
) -> Result<()> {
    let slash_commands = commands::slash_commands(&commands::registry()?);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: slash_commands,
            on_error: |error| Box::pin(on_error(error)),
            command_check: Some(|ctx| Box::pin(command_check(ctx))),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                register_commands(ctx, &config, &framework.options().commands).await?;

                let data = BotData::new(
                    database,
                    Arc::clone(&ctx.http),
                    Arc::clone(&config),
                    module_defaults,
                )?;
                tokio::spawn(flush_voice_sessions(
                    Arc::clone(&data.sessions),
                    Arc::clone(&data.database),
                    config.voice_flush_interval,
                ));
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_VOICE_STATES
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let mut cache_settings = serenity::cache::Settings::default();
    cache_settings.max_messages = CACHED_MESSAGES;

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::ClientBuilder::new(token, intents)
        .cache_settings(cache_settings)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {:?}", e))?;

    info!("Starting bot client...");
    client
        .start()
        .await
        .inspect_err(|e| error!("Client error: {:?}", e))?;
    Ok(())
}
