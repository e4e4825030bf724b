//! Guild rows and the guild day.
//!
//! A guild day runs from local midnight to local midnight in the guild's time
//! zone, daylight saving included. The zone is the one a manager picked, or
//! else the one implied by the guild's preferred locale, or else UTC. Daily
//! quests and the presence streak are both counted in guild days.

use crate::{
    entities::{Guild, guild},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use sea_orm::{
    Condition, Set,
    prelude::*,
    sea_query::{Expr, OnConflict},
};

/// Time zone of a Discord locale, `None` for locales without one.
#[must_use]
pub fn timezone_for_locale(locale: &str) -> Option<Tz> {
    let tz = match locale {
        "id" => Tz::Asia__Jakarta,
        "en-US" => Tz::America__New_York,
        "en-GB" => Tz::Europe__London,
        "bg" => Tz::Europe__Sofia,
        "zh-CN" => Tz::Asia__Shanghai,
        "zh-TW" => Tz::Asia__Taipei,
        "hr" => Tz::Europe__Zagreb,
        "cs" => Tz::Europe__Prague,
        "da" => Tz::Europe__Copenhagen,
        "nl" => Tz::Europe__Amsterdam,
        "fi" => Tz::Europe__Helsinki,
        "fr" => Tz::Europe__Paris,
        "de" => Tz::Europe__Berlin,
        "el" => Tz::Europe__Athens,
        "hi" => Tz::Asia__Kolkata,
        "hu" => Tz::Europe__Budapest,
        "it" => Tz::Europe__Rome,
        "ja" => Tz::Asia__Tokyo,
        "ko" => Tz::Asia__Seoul,
        "lt" => Tz::Europe__Vilnius,
        "no" => Tz::Europe__Oslo,
        "pl" => Tz::Europe__Warsaw,
        "pt-BR" => Tz::America__Sao_Paulo,
        "ro" => Tz::Europe__Bucharest,
        "ru" => Tz::Europe__Moscow,
        "es-ES" => Tz::Europe__Madrid,
        "es-419" => Tz::America__Mexico_City,
        "sv-SE" => Tz::Europe__Stockholm,
        "th" => Tz::Asia__Bangkok,
        "tr" => Tz::Europe__Istanbul,
        "uk" => Tz::Europe__Kyiv,
        "vi" => Tz::Asia__Ho_Chi_Minh,
        _ => return None,
    };
    Some(tz)
}

/// Parses an IANA zone name such as `Europe/Paris`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim().parse::<Tz>().map_err(|_| Error::Command {
        message: format!("Unknown time zone `{name}`, use an IANA name like `Europe/Paris`."),
    })
}

/// Effective time zone of a guild.
#[must_use]
pub fn guild_timezone(model: &guild::Model) -> Tz {
    model
        .timezone
        .as_deref()
        .and_then(|name| name.parse::<Tz>().ok())
        .or_else(|| model.preferred_locale.as_deref().and_then(timezone_for_locale))
        .unwrap_or(Tz::UTC)
}

/// Calendar date of `at` in the guild's zone.
#[must_use]
pub fn guild_day(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// First instant of `day` in `tz`.
fn local_day_start(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    // Zones that switch to DST at midnight skip it, the day then starts at
    // the end of the gap
    let midnight = day.and_time(NaiveTime::MIN);
    (0..=4)
        .map(|step| midnight + TimeDelta::minutes(30 * step))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map_or_else(|| midnight.and_utc(), |start| start.with_timezone(&Utc))
}

/// Instant the guild day containing `at` started.
#[must_use]
pub fn guild_day_start(at: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    local_day_start(guild_day(at, tz), tz)
}

/// Instant the guild day containing `at` ends, which is 23 or 25 hours after
/// its start on DST days.
#[must_use]
pub fn guild_day_end(at: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let day = guild_day(at, tz);
    match day.succ_opt() {
        Some(next) => local_day_start(next, tz),
        None => guild_day_start(at, tz) + TimeDelta::days(1),
    }
}

/// Whether two instants fall on the same guild day.
#[must_use]
pub fn same_guild_day(a: DateTime<Utc>, b: DateTime<Utc>, tz: Tz) -> bool {
    guild_day(a, tz) == guild_day(b, tz)
}

/// Returns the guild row, inserting defaults when missing.
pub async fn find_or_create_guild<C>(db: &C, guild_id: &str) -> Result<guild::Model>
where
    C: ConnectionTrait,
{
    if let Some(model) = Guild::find_by_id(guild_id).one(db).await? {
        return Ok(model);
    }

    let row = guild::ActiveModel {
        id: Set(guild_id.to_string()),
        preferred_locale: Set(None),
        timezone: Set(None),
        last_event_at: Set(None),
        message_deleted_audit_channel_id: Set(None),
        message_edited_audit_channel_id: Set(None),
        support_role_id: Set(None),
    };

    Guild::insert(row)
        .on_conflict(OnConflict::column(guild::Column::Id).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;

    Guild::find_by_id(guild_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("guild {guild_id}")).into())
}

/// Editable guild settings. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildSettingsUpdate {
    /// Locale reported by Discord
    pub preferred_locale: Option<Option<String>>,
    /// IANA zone set by a manager, `Some(None)` follows the locale again
    pub timezone: Option<Option<String>>,
    /// `Some(None)` clears the channel
    pub message_deleted_audit_channel_id: Option<Option<String>>,
    pub message_edited_audit_channel_id: Option<Option<String>>,
    pub support_role_id: Option<Option<String>>,
}

/// Applies `update` to a guild.
pub async fn update_guild<C>(
    db: &C,
    guild_id: &str,
    update: GuildSettingsUpdate,
) -> Result<guild::Model>
where
    C: ConnectionTrait,
{
    if let Some(Some(name)) = &update.timezone {
        parse_timezone(name)?;
    }

    let model = find_or_create_guild(db, guild_id).await?;
    let mut active: guild::ActiveModel = model.into();
    if let Some(locale) = update.preferred_locale {
        active.preferred_locale = Set(locale);
    }
    if let Some(timezone) = update.timezone {
        active.timezone = Set(timezone);
    }
    if let Some(channel) = update.message_deleted_audit_channel_id {
        active.message_deleted_audit_channel_id = Set(channel);
    }
    if let Some(channel) = update.message_edited_audit_channel_id {
        active.message_edited_audit_channel_id = Set(channel);
    }
    if let Some(role) = update.support_role_id {
        active.support_role_id = Set(role);
    }
    Ok(active.update(db).await?)
}

/// Takes the random event slot of a guild if its cooldown elapsed.
///
/// The check and the write are one conditional update, so two messages
/// racing for the slot cannot both win.
pub async fn try_claim_event_slot<C>(
    db: &C,
    guild_id: &str,
    cooldown_minutes: i64,
    now: DateTime<Utc>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    find_or_create_guild(db, guild_id).await?;
    let threshold = now - TimeDelta::minutes(cooldown_minutes.max(0));

    let result = Guild::update_many()
        .col_expr(guild::Column::LastEventAt, Expr::value(Some(now)))
        .filter(guild::Column::Id.eq(guild_id))
        .filter(
            Condition::any()
                .add(guild::Column::LastEventAt.is_null())
                .add(guild::Column::LastEventAt.lte(threshold)),
        )
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Frees the random event slot, used when an event expires unclaimed.
pub async fn clear_event_slot<C>(db: &C, guild_id: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    Guild::update_many()
        .col_expr(
            guild::Column::LastEventAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .filter(guild::Column::Id.eq(guild_id))
        .exec(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::TimeZone;

    #[test]
    fn test_guild_day_follows_zone() {
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 22, 30, 0).unwrap();
        assert_eq!(guild_day(at, Tz::UTC), NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        // Paris is UTC+2 in summer
        assert_eq!(
            guild_day(at, Tz::Europe__Paris),
            NaiveDate::from_ymd_opt(2024, 7, 2).unwrap()
        );
        let early = Utc.with_ymd_and_hms(2024, 7, 1, 3, 0, 0).unwrap();
        assert_eq!(
            guild_day(early, Tz::America__New_York),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
        );

        let next = Utc.with_ymd_and_hms(2024, 7, 2, 1, 0, 0).unwrap();
        assert!(!same_guild_day(at, next, Tz::UTC));
        assert!(same_guild_day(at, next, Tz::Europe__Paris));
    }

    #[test]
    fn test_guild_day_start_tracks_daylight_saving() {
        let summer = Utc.with_ymd_and_hms(2024, 7, 1, 22, 30, 0).unwrap();
        assert_eq!(
            guild_day_start(summer, Tz::Europe__Paris),
            Utc.with_ymd_and_hms(2024, 7, 1, 22, 0, 0).unwrap()
        );
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        assert_eq!(
            guild_day_start(winter, Tz::Europe__Paris),
            Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap()
        );

        // Clocks go forward on March 31st 2024 in Paris, that day is 23 hours
        let spring = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let start = guild_day_start(spring, Tz::Europe__Paris);
        let end = guild_day_end(spring, Tz::Europe__Paris);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 30, 23, 0, 0).unwrap());
        assert_eq!(end - start, TimeDelta::hours(23));
    }

    #[test]
    fn test_day_starts_after_a_skipped_midnight() {
        // Santiago skipped 00:00-01:00 local on September 8th 2024
        let at = Utc.with_ymd_and_hms(2024, 9, 8, 12, 0, 0).unwrap();
        let start = guild_day_start(at, Tz::America__Santiago);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 9, 8, 4, 0, 0).unwrap());
    }

    #[test]
    fn test_guild_timezone_prefers_manager_choice() {
        let mut model = guild::Model {
            id: "g".to_string(),
            preferred_locale: Some("fr".to_string()),
            timezone: None,
            last_event_at: None,
            message_deleted_audit_channel_id: None,
            message_edited_audit_channel_id: None,
            support_role_id: None,
        };
        assert_eq!(guild_timezone(&model), Tz::Europe__Paris);

        model.timezone = Some("Asia/Tokyo".to_string());
        assert_eq!(guild_timezone(&model), Tz::Asia__Tokyo);

        model.timezone = None;
        model.preferred_locale = Some("en-XX".to_string());
        assert_eq!(guild_timezone(&model), Tz::UTC);
        assert_eq!(timezone_for_locale("pt-BR"), Some(Tz::America__Sao_Paulo));
    }

    #[tokio::test]
    async fn test_update_guild() -> Result<()> {
        let db = setup_test_db().await?;

        let guild = update_guild(
            &db,
            "g",
            GuildSettingsUpdate {
                preferred_locale: Some(Some("de".to_string())),
                message_deleted_audit_channel_id: Some(Some("c1".to_string())),
                ..GuildSettingsUpdate::default()
            },
        )
        .await?;
        assert_eq!(guild_timezone(&guild), Tz::Europe__Berlin);
        assert_eq!(guild.message_deleted_audit_channel_id.as_deref(), Some("c1"));

        let guild = update_guild(
            &db,
            "g",
            GuildSettingsUpdate {
                timezone: Some(Some("America/Chicago".to_string())),
                message_deleted_audit_channel_id: Some(None),
                ..GuildSettingsUpdate::default()
            },
        )
        .await?;
        assert_eq!(guild_timezone(&guild), Tz::America__Chicago);
        assert!(guild.message_deleted_audit_channel_id.is_none());

        let err = update_guild(
            &db,
            "g",
            GuildSettingsUpdate {
                timezone: Some(Some("Mars/Olympus".to_string())),
                ..GuildSettingsUpdate::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
        let guild = find_or_create_guild(&db, "g").await?;
        assert_eq!(guild.timezone.as_deref(), Some("America/Chicago"));
        Ok(())
    }

    #[tokio::test]
    async fn test_event_slot_respects_cooldown() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();

        assert!(try_claim_event_slot(&db, "g", 30, now).await?);
        assert!(!try_claim_event_slot(&db, "g", 30, now + TimeDelta::minutes(29)).await?);
        assert!(try_claim_event_slot(&db, "g", 30, now + TimeDelta::minutes(30)).await?);

        clear_event_slot(&db, "g").await?;
        assert!(try_claim_event_slot(&db, "g", 30, now + TimeDelta::minutes(31)).await?);
        Ok(())
    }
}
