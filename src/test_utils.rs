//! Shared test utilities.
//!
//! Helpers for an in-memory database and for seeding members with known
//! balances without going through the economy rules.

use crate::{
    config::settings::{AppConfig, Environment},
    core::ledger::{Ledger, MemberKey},
    entities::{CapacityTier, Member, MemberVault, member, member_vault},
    errors::Result,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database under the temp directory, for tests
/// that need several pooled connections. Returns the path for cleanup.
pub async fn setup_file_db(name: &str) -> Result<(DatabaseConnection, std::path::PathBuf)> {
    let path = std::env::temp_dir().join(format!(
        "guildkeeper-{name}-{}-{}.db",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let db = sea_orm::Database::connect(format!("sqlite://{}?mode=rwc", path.display())).await?;
    crate::config::database::create_tables(&db).await?;
    Ok((db, path))
}

/// Development configuration without hub reporting.
#[must_use]
pub fn test_config() -> AppConfig {
    AppConfig {
        prefix: "!".to_string(),
        environment: Environment::Dev,
        database_url: "sqlite::memory:".to_string(),
        developer_ids: Vec::new(),
        dev_guild_id: None,
        hub_guild_id: None,
        hub_heart_logs_channel_id: None,
        voice_flush_interval: std::time::Duration::from_secs(60),
    }
}

/// Builds a member key for `user` in the test guild.
#[must_use]
pub fn key(user: &str) -> MemberKey {
    MemberKey::new(user, "test_guild")
}

/// Creates a member with the given wallet and an empty `TIER_0` vault.
pub async fn create_test_member(
    db: &DatabaseConnection,
    key: &MemberKey,
    wallet_coins: i64,
) -> Result<member::Model> {
    let ledger = Ledger::new(db);
    let model = ledger.find_or_create_member(key).await?;
    let mut active: member::ActiveModel = model.into();
    active.wallet_coins = Set(wallet_coins);
    let model = active.update(db).await?;
    ledger.find_or_create_vault(key).await?;
    Ok(model)
}

/// Forces the vault of `key` to `vault_coins` at `tier`.
pub async fn set_test_vault(
    db: &DatabaseConnection,
    key: &MemberKey,
    vault_coins: i64,
    tier: CapacityTier,
) -> Result<member_vault::Model> {
    let model = Ledger::new(db).find_or_create_vault(key).await?;
    let mut active: member_vault::ActiveModel = model.into();
    active.vault_coins = Set(vault_coins);
    active.capacity_tier = Set(tier);
    Ok(active.update(db).await?)
}

/// Reads `(wallet, vault)` of a member, zero for missing rows.
pub async fn balances(db: &DatabaseConnection, key: &MemberKey) -> Result<(i64, i64)> {
    let wallet = Member::find_by_id(key.id())
        .one(db)
        .await?
        .map_or(0, |m| m.wallet_coins);
    let vault = MemberVault::find_by_id(key.id())
        .one(db)
        .await?
        .map_or(0, |v| v.vault_coins);
    Ok((wallet, vault))
}
