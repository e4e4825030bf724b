//! Database connection and schema setup.
//!
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! models. Parent tables are created before the tables that reference them.

use crate::entities::{
    ChannelBlacklist, Guild, GuildLevelReward, GuildModule, Member, MemberDailyQuest,
    MemberVault, Shop, ShopItem, User,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

/// Default location of the bot database.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/guildkeeper.sqlite?mode=rwc";

/// Establishes a connection to the database at `database_url`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    info!("Connecting to database at {}", database_url);
    Database::connect(database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates every table that does not exist yet.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, User).await?;
    create_table(db, &schema, Guild).await?;
    create_table(db, &schema, Member).await?;
    create_table(db, &schema, MemberVault).await?;
    create_table(db, &schema, MemberDailyQuest).await?;
    create_table(db, &schema, GuildModule).await?;
    create_table(db, &schema, ChannelBlacklist).await?;
    create_table(db, &schema, GuildLevelReward).await?;
    create_table(db, &schema, Shop).await?;
    create_table(db, &schema, ShopItem).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::QuerySelect;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = create_connection("sqlite::memory:").await?;
        create_tables(&db).await?;

        Member::find().limit(1).all(&db).await?;
        MemberVault::find().limit(1).all(&db).await?;
        MemberDailyQuest::find().limit(1).all(&db).await?;
        User::find().limit(1).all(&db).await?;
        Guild::find().limit(1).all(&db).await?;
        GuildModule::find().limit(1).all(&db).await?;
        ChannelBlacklist::find().limit(1).all(&db).await?;
        GuildLevelReward::find().limit(1).all(&db).await?;
        Shop::find().limit(1).all(&db).await?;
        ShopItem::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = create_connection("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
