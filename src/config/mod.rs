/// Database connection and table creation
pub mod database;

/// Default guild module settings from config.toml
pub mod modules;

/// Application settings from environment variables
pub mod settings;
