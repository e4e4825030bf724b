use dotenvy::dotenv;
use guildkeeper::{
    bot::framework::run_bot,
    config::{
        database::{create_connection, create_tables},
        modules::load_module_defaults,
        settings::AppConfig,
    },
    errors::{Error, Result},
};
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Module defaults written into a guild's module row on first use.
const MODULE_DEFAULTS_PATH: &str = "config.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Non-fatal, variables may come from the environment directly
    dotenv().ok();

    let config = AppConfig::from_env()
        .inspect_err(|e| error!("Invalid configuration: {}", e))?;
    info!("Starting in {:?} mode", config.environment);

    let database = create_connection(&config.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to the database: {}", e))?;
    create_tables(&database)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    let module_defaults = load_module_defaults(MODULE_DEFAULTS_PATH)
        .inspect_err(|e| error!("Failed to load {}: {}", MODULE_DEFAULTS_PATH, e))?;

    // Read right before use so the token never sits in AppConfig
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    run_bot(token, Arc::new(config), database, module_defaults).await
}
