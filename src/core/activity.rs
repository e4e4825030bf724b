//! Rewards earned by chatting.
//!
//! A counted message can pay coins, XP and daily quest progress. Each payout is
//! gated by its module toggle, the channel blacklist and a chance roll, then
//! scaled up by the booster and supporter bonuses and down by the spam score.

use crate::{
    core::{
        access::GuildModules,
        blacklist::channel_scopes,
        cooldown::time_elapsed_factor,
        guild::{find_or_create_guild, guild_timezone},
        ledger::{Bounds, Ledger, MemberKey, NumberField},
        leveling::{LevelChange, apply_xp_gain},
        modules::{EcoSettings, LevelSettings, QuestSettings, guild_modules},
        quest::{is_complete, record_messages, record_voice_minutes, sync_daily_quest},
        spam::{QUEST_SCORE_LIMIT, spam_factor},
    },
    entities::{BlacklistScope, ModuleName, member_daily_quest},
    errors::Result,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::ConnectionTrait;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

/// Days of boosting after which the booster bonus is complete.
pub const BOOSTER_RAMP_DAYS: i64 = 7;
/// Days of holding the support role after which its bonus is complete.
pub const SUPPORTER_RAMP_DAYS: i64 = 14;

/// Dates that grow a member's bonus over time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoostSources {
    /// When the member started boosting the guild
    pub premium_since: Option<DateTime<Utc>>,
    /// When the member got the guild's support role
    pub supporter_since: Option<DateTime<Utc>>,
}

impl BoostSources {
    /// Extra multiplier on top of 1, each source ramping linearly to its factor.
    #[must_use]
    pub fn factor(&self, booster_factor: f64, supporter_factor: f64, now: DateTime<Utc>) -> f64 {
        booster_factor * time_elapsed_factor(self.premium_since, BOOSTER_RAMP_DAYS, now)
            + supporter_factor * time_elapsed_factor(self.supporter_since, SUPPORTER_RAMP_DAYS, now)
    }
}

/// `floor(base * (1 + boost) * (1 - spam))`, never negative.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn scaled_gain(base: i64, boost: f64, spam: f64) -> i64 {
    let spam = spam.clamp(0.0, 1.0);
    ((base as f64) * (1.0 + boost.max(0.0)) * (1.0 - spam))
        .floor()
        .max(0.0) as i64
}

/// Rolls a chance-gated gain in `min..=max`; `None` when the roll misses or
/// the scaled gain is zero.
pub fn roll_gain<R: Rng + ?Sized>(
    chance: f64,
    min: i64,
    max: i64,
    boost: f64,
    spam: f64,
    rng: &mut R,
) -> Option<i64> {
    if !rng.random_bool(chance.clamp(0.0, 1.0)) {
        return None;
    }
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    let gain = scaled_gain(rng.random_range(low..=high), boost, spam);
    (gain > 0).then_some(gain)
}

/// Coins a message earns, if any.
pub fn roll_message_coins<R: Rng + ?Sized>(
    settings: &EcoSettings,
    sources: &BoostSources,
    spam_score: i64,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<i64> {
    if !settings.coins_from_message_enabled {
        return None;
    }
    let boost = sources.factor(settings.booster_factor, settings.tag_supporter_factor, now);
    roll_gain(
        settings.message_chance,
        settings.message_min_gain,
        settings.message_max_gain,
        boost,
        spam_factor(spam_score),
        rng,
    )
}

/// XP a message earns, if any.
pub fn roll_message_xp<R: Rng + ?Sized>(
    settings: &LevelSettings,
    sources: &BoostSources,
    spam_score: i64,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<i64> {
    if !settings.is_xp_from_message_enabled {
        return None;
    }
    let boost = sources.factor(settings.booster_factor, settings.tag_supporter_factor, now);
    roll_gain(
        settings.message_chance,
        settings.message_min_gain,
        settings.message_max_gain,
        boost,
        spam_factor(spam_score),
        rng,
    )
}

/// A message to reward.
#[derive(Debug, Clone)]
pub struct MessageActivity {
    pub key: MemberKey,
    pub channel_id: String,
    pub premium_since: Option<DateTime<Utc>>,
    /// Anti-spam score of this message
    pub spam_score: i64,
    pub sent_at: DateTime<Utc>,
}

/// What a message earned.
#[derive(Debug, Clone, Default)]
pub struct ActivityReport {
    /// Whether the message counted towards statistics
    pub counted: bool,
    pub coins: Option<i64>,
    pub level: Option<LevelChange>,
    /// Quest after progress was recorded, `None` when it did not move
    pub quest: Option<member_daily_quest::Model>,
    /// The message finished the quest
    pub quest_completed: bool,
}

/// Settings of a module when it is switched on.
fn active_settings<T: DeserializeOwned>(modules: &GuildModules, module: ModuleName) -> Result<Option<T>> {
    match modules.get(&module) {
        Some(state) if state.is_active => Ok(Some(serde_json::from_value(state.settings.clone())?)),
        _ => Ok(None),
    }
}

/// Records a guild message and pays what it earned.
#[instrument(skip(db, rng), fields(key = ?activity.key))]
pub async fn reward_message<C, R>(
    db: &C,
    activity: &MessageActivity,
    rng: &mut R,
) -> Result<ActivityReport>
where
    C: ConnectionTrait,
    R: Rng + ?Sized,
{
    let key = &activity.key;
    let now = activity.sent_at;
    let scopes = channel_scopes(db, &key.guild_id, &activity.channel_id).await?;
    let modules = guild_modules(db, &key.guild_id).await?;
    let ledger = Ledger::new(db);
    let mut report = ActivityReport::default();

    let member = ledger.find_or_create_member(key).await?;
    if !scopes.contains(&BlacklistScope::Message) {
        ledger
            .update_field(key, NumberField::MessageCount, 1, Bounds::NON_NEGATIVE)
            .await?;
        report.counted = true;
    }

    let sources = BoostSources {
        premium_since: activity.premium_since,
        supporter_since: member.supporter_since,
    };

    if !scopes.contains(&BlacklistScope::Economy) {
        if let Some(settings) = active_settings::<EcoSettings>(&modules, ModuleName::Eco)? {
            report.coins = roll_message_coins(&settings, &sources, activity.spam_score, now, rng);
            if let Some(coins) = report.coins {
                ledger.credit_wallet(key, coins).await?;
            }
        }
    }

    if !scopes.contains(&BlacklistScope::Level) {
        if let Some(settings) = active_settings::<LevelSettings>(&modules, ModuleName::Level)? {
            if let Some(xp) = roll_message_xp(&settings, &sources, activity.spam_score, now, rng) {
                report.level = apply_xp_gain(db, key, xp, settings.max_level).await?;
            }
        }
    }

    if !scopes.contains(&BlacklistScope::Quest) {
        if let Some(settings) = active_settings::<QuestSettings>(&modules, ModuleName::Quest)? {
            let spammy = settings.use_anti_spam && activity.spam_score > QUEST_SCORE_LIMIT;
            if !spammy {
                let tz = guild_timezone(&find_or_create_guild(db, &key.guild_id).await?);
                sync_daily_quest(db, key, tz, now, rng).await?;
                if record_messages(db, key, 1).await? {
                    let quest = sync_daily_quest(db, key, tz, now, rng).await?;
                    report.quest_completed = is_complete(&quest);
                    report.quest = Some(quest);
                }
            }
        }
    }

    debug!("Message activity: {:?}", report);
    Ok(report)
}

/// Counts committed voice minutes towards the daily quest.
///
/// Returns the quest when progress moved, with whether it is now complete.
pub async fn reward_voice_minutes<C, R>(
    db: &C,
    key: &MemberKey,
    minutes: i64,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Option<(member_daily_quest::Model, bool)>>
where
    C: ConnectionTrait,
    R: Rng + ?Sized,
{
    if minutes <= 0 {
        return Ok(None);
    }
    let modules = guild_modules(db, &key.guild_id).await?;
    if active_settings::<QuestSettings>(&modules, ModuleName::Quest)?.is_none() {
        return Ok(None);
    }

    let tz = guild_timezone(&find_or_create_guild(db, &key.guild_id).await?);
    sync_daily_quest(db, key, tz, now, rng).await?;
    if !record_voice_minutes(db, key, minutes).await? {
        return Ok(None);
    }
    let quest = sync_daily_quest(db, key, tz, now, rng).await?;
    let complete = is_complete(&quest);
    Ok(Some((quest, complete)))
}
