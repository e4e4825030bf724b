//! Unified error type for `Guildkeeper`.
//!
//! Economy precondition failures (`InsufficientFunds`, `VaultFull`, `EmptyVault`)
//! are regular variants so command handlers can turn them into a short denial
//! message. A command that does not resolve, or an actor that fails an access
//! predicate, is not an error at all and never reaches this type.

use poise::serenity_prelude as serenity;
use thiserror::Error;

/// All errors produced by the bot and its services.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration value
    #[error("Configuration error: {message}")]
    Config {
        /// Human readable reason
        message: String,
    },

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Requested debit exceeds what is available across wallet and vault
    #[error("Insufficient funds: {available} available, {required} required")]
    InsufficientFunds {
        /// Coins available to the member
        available: i64,
        /// Coins the operation needed
        required: i64,
    },

    /// Vault has no free capacity left
    #[error("The vault is already full ({capacity} coins)")]
    VaultFull {
        /// Capacity of the member's current tier
        capacity: i64,
    },

    /// Vault holds no coins to withdraw
    #[error("The vault is empty")]
    EmptyVault,

    /// Amount is zero or negative where a positive amount is required
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: i64,
    },

    /// Two command definitions claim the same token route
    #[error("Duplicate command route: {route}")]
    DuplicateRoute {
        /// The conflicting route, space separated
        route: String,
    },

    /// Command execution failure with a user facing reason
    #[error("Command error: {message}")]
    Command {
        /// Human readable reason
        message: String,
    },

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing environment variable
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// String formatting failure
    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    /// Module settings (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// config.toml parse failure
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serenity/Poise framework failure
    #[error("Discord error: {0}")]
    Discord(Box<serenity::Error>),
}

impl From<serenity::Error> for Error {
    fn from(value: serenity::Error) -> Self {
        Self::Discord(Box::new(value))
    }
}

impl Error {
    /// Whether this error is an expected economy precondition failure that
    /// should be shown to the user as a denial rather than logged as a fault.
    #[must_use]
    pub const fn is_economy_denial(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::VaultFull { .. }
                | Self::EmptyVault
                | Self::InvalidAmount { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_economy_denials_are_classified() {
        assert!(
            Error::InsufficientFunds {
                available: 1,
                required: 2
            }
            .is_economy_denial()
        );
        assert!(Error::EmptyVault.is_economy_denial());
        assert!(Error::VaultFull { capacity: 50_000 }.is_economy_denial());
        assert!(
            !Error::Config {
                message: "x".to_string()
            }
            .is_economy_denial()
        );
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = Error::InsufficientFunds {
            available: 50,
            required: 100,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: 50 available, 100 required"
        );
    }
}
