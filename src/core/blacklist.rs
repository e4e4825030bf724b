//! Channels excluded from an activity scope.

use crate::{
    entities::{BlacklistScope, ChannelBlacklist, channel_blacklist},
    errors::Result,
};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::OnConflict};
use std::collections::HashSet;

impl BlacklistScope {
    /// Every scope, in display order.
    pub const ALL: [Self; 5] = [
        Self::Command,
        Self::Message,
        Self::Economy,
        Self::Level,
        Self::Quest,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Message => "message",
            Self::Economy => "economy",
            Self::Level => "level",
            Self::Quest => "quest",
        }
    }

    /// Parses a scope name typed by a user.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str().eq_ignore_ascii_case(name))
    }
}

/// Scopes a channel is excluded from.
pub async fn channel_scopes<C>(
    db: &C,
    guild_id: &str,
    channel_id: &str,
) -> Result<HashSet<BlacklistScope>>
where
    C: ConnectionTrait,
{
    let rows = ChannelBlacklist::find()
        .filter(channel_blacklist::Column::GuildId.eq(guild_id))
        .filter(channel_blacklist::Column::ChannelId.eq(channel_id))
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|row| row.scope).collect())
}

/// Excludes a channel from `scope`. Adding twice is a no-op.
pub async fn add_channel<C>(
    db: &C,
    guild_id: &str,
    channel_id: &str,
    scope: BlacklistScope,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let row = channel_blacklist::ActiveModel {
        guild_id: Set(guild_id.to_string()),
        channel_id: Set(channel_id.to_string()),
        scope: Set(scope),
    };
    ChannelBlacklist::insert(row)
        .on_conflict(
            OnConflict::columns([
                channel_blacklist::Column::GuildId,
                channel_blacklist::Column::ChannelId,
                channel_blacklist::Column::Scope,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Lifts an exclusion; returns whether one existed.
pub async fn remove_channel<C>(
    db: &C,
    guild_id: &str,
    channel_id: &str,
    scope: BlacklistScope,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result =
        ChannelBlacklist::delete_by_id((guild_id.to_string(), channel_id.to_string(), scope))
            .exec(db)
            .await?;
    Ok(result.rows_affected > 0)
}

/// All exclusions of a guild, grouped by channel.
pub async fn list_guild<C>(db: &C, guild_id: &str) -> Result<Vec<channel_blacklist::Model>>
where
    C: ConnectionTrait,
{
    ChannelBlacklist::find()
        .filter(channel_blacklist::Column::GuildId.eq(guild_id))
        .order_by_asc(channel_blacklist::Column::ChannelId)
        .all(db)
        .await
        .map_err(Into::into)
}
