//! Keeps each member's supporter date in step with the guild's support role.

use crate::{
    bot::{BotData, GatewayEvent, commands::parse_role},
    core::{
        guild::find_or_create_guild,
        ledger::{Ledger, MemberKey, MemberTimestamp},
    },
    errors::Result,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use sea_orm::ConnectionTrait;
use tracing::info;

/// New supporter date to store, `None` when nothing changes.
fn supporter_change(
    has_role: bool,
    assigned_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<Option<DateTime<Utc>>> {
    match (has_role, assigned_at) {
        (true, None) => Some(Some(now)),
        (false, Some(_)) => Some(None),
        _ => None,
    }
}

/// Applies the support role state of one member, returns the new date when it
/// changed. Other guilds of the same user are left alone.
async fn sync_supporter<C>(
    db: &C,
    key: &MemberKey,
    has_role: bool,
    now: DateTime<Utc>,
) -> Result<Option<Option<DateTime<Utc>>>>
where
    C: ConnectionTrait,
{
    let ledger = Ledger::new(db);
    let since = ledger.find_or_create_member(key).await?.supporter_since;
    let change = supporter_change(has_role, since, now);
    if let Some(at) = change {
        ledger
            .set_timestamp(key, MemberTimestamp::SupporterSince, at)
            .await?;
    }
    Ok(change)
}

pub fn on_member_update<'a>(data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let serenity::FullEvent::GuildMemberUpdate { event: update, .. } = &event.event else {
            return Ok(());
        };
        if update.user.bot {
            return Ok(());
        }
        let guild = find_or_create_guild(&*data.database, &update.guild_id.to_string()).await?;
        let Some(support_role) = guild.support_role_id.as_deref().and_then(parse_role) else {
            return Ok(());
        };

        let key = MemberKey::new(update.user.id.to_string(), update.guild_id.to_string());
        let has_role = update.roles.contains(&support_role);
        if let Some(at) = sync_supporter(&*data.database, &key, has_role, Utc::now()).await? {
            info!("Supporter status of {:?} is now {}", key, at.is_some());
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::setup_test_db;
    use chrono::TimeZone;

    #[test]
    fn test_supporter_change() {
        let now = Utc::now();
        assert_eq!(supporter_change(true, None, now), Some(Some(now)));
        assert_eq!(supporter_change(false, Some(now), now), Some(None));
        assert_eq!(supporter_change(true, Some(now), now), None);
        assert_eq!(supporter_change(false, None, now), None);
    }

    #[tokio::test]
    async fn test_supporter_date_is_kept_per_guild() -> Result<()> {
        let db = setup_test_db().await?;
        let in_a = MemberKey::new("u", "guild_a");
        let in_b = MemberKey::new("u", "guild_b");
        let earned = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(sync_supporter(&db, &in_a, true, earned).await?, Some(Some(earned)));
        // Lacking guild B's role must not reset the ramp earned in guild A
        assert_eq!(sync_supporter(&db, &in_b, false, Utc::now()).await?, None);
        assert_eq!(sync_supporter(&db, &in_a, true, Utc::now()).await?, None);

        let ledger = Ledger::new(&db);
        assert_eq!(ledger.find_or_create_member(&in_a).await?.supporter_since, Some(earned));
        assert!(ledger.find_or_create_member(&in_b).await?.supporter_since.is_none());

        assert_eq!(sync_supporter(&db, &in_a, false, Utc::now()).await?, Some(None));
        assert!(ledger.find_or_create_member(&in_a).await?.supporter_since.is_none());
        Ok(())
    }
}
