//! Process configuration read from environment variables.
//!
//! Values are read once at startup (after `dotenvy` loaded `.env`). The token
//! is intentionally not part of [`AppConfig`]; `main` reads it right before
//! starting the client so it never ends up in debug output.

use super::database::DEFAULT_DATABASE_URL;
use crate::errors::{Error, Result};
use std::time::Duration;

/// Deployment mode, selects where slash commands are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Commands registered on the development guild only
    Dev,
    /// Commands registered globally
    Prod,
}

impl Environment {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEV" => Ok(Self::Dev),
            "PROD" => Ok(Self::Prod),
            _ => Err(Error::Config {
                message: format!("ENV must be DEV or PROD, got '{value}'"),
            }),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Prefix of text commands
    pub prefix: String,
    pub environment: Environment,
    pub database_url: String,
    /// Users allowed to run developer commands
    pub developer_ids: Vec<String>,
    /// Guild used for command registration in [`Environment::Dev`]
    pub dev_guild_id: Option<String>,
    /// Operator guild
    pub hub_guild_id: Option<String>,
    /// Operator channel receiving handler faults
    pub hub_heart_logs_channel_id: Option<String>,
    /// Period of the voice session flush task
    pub voice_flush_interval: Duration,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a
    /// variable or `None` when unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let environment = non_empty("ENV")
            .ok_or_else(|| Error::Config {
                message: "ENV is not set".to_string(),
            })
            .and_then(|value| Environment::parse(&value))?;

        let voice_flush_interval = match non_empty("VOICE_FLUSH_INTERVAL_SECS") {
            Some(value) => {
                let secs: u64 = value.trim().parse().map_err(|_| Error::Config {
                    message: format!("VOICE_FLUSH_INTERVAL_SECS is not a number: '{value}'"),
                })?;
                if secs == 0 {
                    return Err(Error::Config {
                        message: "VOICE_FLUSH_INTERVAL_SECS must be positive".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(300),
        };

        let developer_ids = non_empty("DEVELOPER_IDS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            prefix: non_empty("PREFIX").unwrap_or_else(|| "!".to_string()),
            environment,
            database_url: non_empty("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            developer_ids,
            dev_guild_id: non_empty("DEV_GUILD_ID"),
            hub_guild_id: non_empty("HUB_GUILD_ID"),
            hub_heart_logs_channel_id: non_empty("HUB_HEART_LOGS_CHANNEL_ID"),
            voice_flush_interval,
        })
    }

    /// Whether `user_id` is listed in `DEVELOPER_IDS`.
    #[must_use]
    pub fn is_developer(&self, user_id: &str) -> bool {
        self.developer_ids.iter().any(|id| id == user_id)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("ENV", "dev")])).unwrap();
        assert_eq!(config.prefix, "!");
        assert_eq!(config.environment, Environment::Dev);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.developer_ids.is_empty());
        assert_eq!(config.voice_flush_interval, Duration::from_secs(300));
        assert!(config.hub_heart_logs_channel_id.is_none());
    }

    #[test]
    fn test_missing_env_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("PREFIX", "?")])).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = AppConfig::from_lookup(lookup(&[("ENV", "staging")])).unwrap_err();
        assert!(err.to_string().contains("'staging'"));

        let err = AppConfig::from_lookup(lookup(&[("ENV", "Qa")])).unwrap_err();
        assert!(err.to_string().contains("'Qa'"));
    }

    #[test]
    fn test_parses_lists_and_interval() {
        let config = AppConfig::from_lookup(lookup(&[
            ("ENV", "PROD"),
            ("PREFIX", "?"),
            ("DEVELOPER_IDS", "1, 2,,3"),
            ("HUB_HEART_LOGS_CHANNEL_ID", "42"),
            ("VOICE_FLUSH_INTERVAL_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(config.prefix, "?");
        assert_eq!(config.developer_ids, vec!["1", "2", "3"]);
        assert!(config.is_developer("2"));
        assert!(!config.is_developer("4"));
        assert_eq!(config.hub_heart_logs_channel_id.as_deref(), Some("42"));
        assert_eq!(config.voice_flush_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("ENV", "DEV"),
            ("VOICE_FLUSH_INTERVAL_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
