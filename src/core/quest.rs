//! Daily quests.
//!
//! Each member gets at most one quest per guild day with up to two
//! objectives: minutes in voice and messages sent. Objectives are drawn from
//! weighted pools by rarity. A quest from a previous guild day is replaced on
//! the next sync, dropping any unclaimed progress.

use crate::{
    core::{
        guild::{find_or_create_guild, guild_timezone, same_guild_day},
        ledger::{Ledger, MemberKey},
        leveling::{LevelChange, apply_xp_gain},
    },
    entities::{MemberDailyQuest, member_daily_quest},
    errors::Result,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::Rng;
use sea_orm::{
    Set, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict, SimpleExpr},
};
use tracing::{debug, info, instrument};

/// Chance for each objective to be part of a quest.
const OBJECTIVE_CHANCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
}

impl Rarity {
    const fn weight(self) -> u32 {
        match self {
            Self::Common => 40,
            Self::Uncommon => 30,
            Self::Rare => 20,
            Self::Epic => 10,
        }
    }

    /// Reward multiplier of the rarity.
    #[must_use]
    pub const fn bonus(self) -> f64 {
        match self {
            Self::Common => 1.0,
            Self::Uncommon => 1.2,
            Self::Rare => 1.3,
            Self::Epic => 1.4,
        }
    }
}

/// One objective a quest can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestObjective {
    pub rarity: Rarity,
    /// Minutes or messages to reach
    pub target: i64,
    pub coins: i64,
    pub xp: i64,
}

const fn objective(rarity: Rarity, target: i64, coins: i64, xp: i64) -> QuestObjective {
    QuestObjective {
        rarity,
        target,
        coins,
        xp,
    }
}

/// Voice minutes objectives.
pub const VOICE_POOL: [QuestObjective; 4] = [
    objective(Rarity::Common, 15, 1_250, 500),
    objective(Rarity::Uncommon, 30, 1_500, 750),
    objective(Rarity::Rare, 120, 3_000, 800),
    objective(Rarity::Epic, 180, 5_000, 1_000),
];

/// Messages sent objectives.
pub const MESSAGE_POOL: [QuestObjective; 4] = [
    objective(Rarity::Common, 75, 750, 500),
    objective(Rarity::Uncommon, 100, 1_250, 750),
    objective(Rarity::Rare, 175, 1_750, 800),
    objective(Rarity::Epic, 250, 2_000, 1_000),
];

/// Draws one objective, weighted by rarity.
pub fn pick_objective<R: Rng + ?Sized>(pool: &[QuestObjective; 4], rng: &mut R) -> QuestObjective {
    let total: u32 = pool.iter().map(|item| item.rarity.weight()).sum();
    let mut roll = rng.random_range(0..total);
    for item in pool {
        let weight = item.rarity.weight();
        if roll < weight {
            return *item;
        }
        roll -= weight;
    }
    pool[0]
}

/// Objectives of a freshly generated quest. At least one is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedQuest {
    pub voice: Option<QuestObjective>,
    pub messages: Option<QuestObjective>,
}

/// Rolls a new quest: each objective with 80% chance, and one of the two at
/// random when both rolls miss.
pub fn generate_daily_quest<R: Rng + ?Sized>(rng: &mut R) -> GeneratedQuest {
    let include_voice = rng.random_bool(OBJECTIVE_CHANCE);
    let include_messages = rng.random_bool(OBJECTIVE_CHANCE);

    if !include_voice && !include_messages {
        return if rng.random_bool(0.5) {
            GeneratedQuest {
                voice: None,
                messages: Some(pick_objective(&MESSAGE_POOL, rng)),
            }
        } else {
            GeneratedQuest {
                voice: Some(pick_objective(&VOICE_POOL, rng)),
                messages: None,
            }
        };
    }

    GeneratedQuest {
        voice: include_voice.then(|| pick_objective(&VOICE_POOL, rng)),
        messages: include_messages.then(|| pick_objective(&MESSAGE_POOL, rng)),
    }
}

/// Combined rarity multiplier: the average-ish `(a + b) / 1.6` for two
/// objectives, the rarity bonus for one.
#[must_use]
pub fn bonus_multiplier(
    voice: Option<&QuestObjective>,
    messages: Option<&QuestObjective>,
) -> f64 {
    match (voice, messages) {
        (Some(v), Some(m)) => (v.rarity.bonus() + m.rarity.bonus()) / 1.6,
        (Some(single), None) | (None, Some(single)) => single.rarity.bonus(),
        (None, None) => 0.0,
    }
}

fn find_objective(pool: &[QuestObjective; 4], target: Option<i64>) -> Option<QuestObjective> {
    let target = target?;
    pool.iter().find(|item| item.target == target).copied()
}

/// Objectives of a stored quest, recovered from its targets.
#[must_use]
pub fn objectives(quest: &member_daily_quest::Model) -> GeneratedQuest {
    GeneratedQuest {
        voice: find_objective(&VOICE_POOL, quest.voice_minutes_target),
        messages: find_objective(&MESSAGE_POOL, quest.messages_sent_target),
    }
}

/// Whether every present objective reached its target.
#[must_use]
pub fn is_complete(quest: &member_daily_quest::Model) -> bool {
    let voice_done = quest
        .voice_minutes_target
        .is_none_or(|target| quest.voice_minutes_progress >= target);
    let messages_done = quest
        .messages_sent_target
        .is_none_or(|target| quest.messages_sent_progress >= target);
    voice_done && messages_done
}

/// Coins and XP a complete quest pays.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn quest_rewards(quest: &member_daily_quest::Model) -> (i64, i64) {
    let GeneratedQuest { voice, messages } = objectives(quest);
    let multiplier = bonus_multiplier(voice.as_ref(), messages.as_ref());
    let coins = voice.map_or(0, |o| o.coins) + messages.map_or(0, |o| o.coins);
    let xp = voice.map_or(0, |o| o.xp) + messages.map_or(0, |o| o.xp);
    (
        (coins as f64 * multiplier).floor() as i64,
        (xp as f64 * multiplier).floor() as i64,
    )
}

/// Returns today's quest of a member, generating a new one when the stored
/// quest is missing or belongs to an earlier guild day.
pub async fn sync_daily_quest<C, R>(
    db: &C,
    key: &MemberKey,
    tz: Tz,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<member_daily_quest::Model>
where
    C: ConnectionTrait,
    R: Rng + ?Sized,
{
    if let Some(quest) = MemberDailyQuest::find_by_id(key.id()).one(db).await? {
        if same_guild_day(quest.started_at, now, tz) {
            return Ok(quest);
        }
    }

    let generated = generate_daily_quest(rng);
    let row = member_daily_quest::ActiveModel {
        user_id: Set(key.user_id.clone()),
        guild_id: Set(key.guild_id.clone()),
        voice_minutes_target: Set(generated.voice.map(|o| o.target)),
        voice_minutes_progress: Set(0),
        messages_sent_target: Set(generated.messages.map(|o| o.target)),
        messages_sent_progress: Set(0),
        started_at: Set(now),
        is_claimed: Set(false),
    };

    MemberDailyQuest::insert(row)
        .on_conflict(
            OnConflict::columns([
                member_daily_quest::Column::UserId,
                member_daily_quest::Column::GuildId,
            ])
            .update_columns([
                member_daily_quest::Column::VoiceMinutesTarget,
                member_daily_quest::Column::VoiceMinutesProgress,
                member_daily_quest::Column::MessagesSentTarget,
                member_daily_quest::Column::MessagesSentProgress,
                member_daily_quest::Column::StartedAt,
                member_daily_quest::Column::IsClaimed,
            ])
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    debug!("Generated daily quest for {:?}: {:?}", key, generated);
    MemberDailyQuest::find_by_id(key.id())
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("daily quest {key:?}")).into())
}

/// `progress + amount`, capped at `target`.
fn capped_progress(
    progress: member_daily_quest::Column,
    target: member_daily_quest::Column,
    amount: i64,
) -> SimpleExpr {
    let next = Expr::col(progress).add(amount);
    Expr::case(Expr::expr(next.clone()).gt(Expr::col(target)), Expr::col(target))
        .finally(next)
        .into()
}

async fn advance<C>(
    db: &C,
    key: &MemberKey,
    progress: member_daily_quest::Column,
    target: member_daily_quest::Column,
    amount: i64,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Ok(false);
    }

    let result = MemberDailyQuest::update_many()
        .col_expr(progress, capped_progress(progress, target, amount))
        .filter(member_daily_quest::Column::UserId.eq(key.user_id.as_str()))
        .filter(member_daily_quest::Column::GuildId.eq(key.guild_id.as_str()))
        .filter(member_daily_quest::Column::IsClaimed.eq(false))
        .filter(target.is_not_null())
        .filter(Expr::col(progress).lt(Expr::col(target)))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Counts sent messages towards the quest; returns whether progress moved.
pub async fn record_messages<C>(db: &C, key: &MemberKey, count: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    advance(
        db,
        key,
        member_daily_quest::Column::MessagesSentProgress,
        member_daily_quest::Column::MessagesSentTarget,
        count,
    )
    .await
}

/// Counts voice minutes towards the quest; returns whether progress moved.
pub async fn record_voice_minutes<C>(db: &C, key: &MemberKey, minutes: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    advance(
        db,
        key,
        member_daily_quest::Column::VoiceMinutesProgress,
        member_daily_quest::Column::VoiceMinutesTarget,
        minutes,
    )
    .await
}

/// Result of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    NoQuest,
    AlreadyClaimed,
    Incomplete,
    /// Rewards to pay, the quest is now marked claimed
    Claimed { coins: i64, xp: i64 },
}

/// Marks a complete quest as claimed and returns its rewards.
///
/// The claimed flag flips with a conditional update so concurrent claims pay
/// once. Paying the rewards is left to the caller, in the same transaction.
pub async fn claim<C>(db: &C, key: &MemberKey) -> Result<ClaimOutcome>
where
    C: ConnectionTrait,
{
    let Some(quest) = MemberDailyQuest::find_by_id(key.id()).one(db).await? else {
        return Ok(ClaimOutcome::NoQuest);
    };
    if quest.is_claimed {
        return Ok(ClaimOutcome::AlreadyClaimed);
    }
    if !is_complete(&quest) {
        return Ok(ClaimOutcome::Incomplete);
    }

    let result = MemberDailyQuest::update_many()
        .col_expr(member_daily_quest::Column::IsClaimed, Expr::value(true))
        .filter(member_daily_quest::Column::UserId.eq(key.user_id.as_str()))
        .filter(member_daily_quest::Column::GuildId.eq(key.guild_id.as_str()))
        .filter(member_daily_quest::Column::IsClaimed.eq(false))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Ok(ClaimOutcome::AlreadyClaimed);
    }

    let (coins, xp) = quest_rewards(&quest);
    Ok(ClaimOutcome::Claimed { coins, xp })
}

/// Claims today's quest and pays coins and XP in one transaction.
///
/// A quest from an earlier guild day is replaced first, so stale progress
/// can never be claimed. Returns the level change when XP was paid.
#[instrument(skip(db, rng))]
pub async fn claim_rewards<C, R>(
    db: &C,
    key: &MemberKey,
    max_level: Option<i64>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<(ClaimOutcome, Option<LevelChange>)>
where
    C: TransactionTrait,
    R: Rng + ?Sized,
{
    let txn = db.begin().await?;
    let tz = guild_timezone(&find_or_create_guild(&txn, &key.guild_id).await?);
    sync_daily_quest(&txn, key, tz, now, rng).await?;

    let outcome = claim(&txn, key).await?;
    let change = match outcome {
        ClaimOutcome::Claimed { coins, xp } => {
            Ledger::new(&txn).credit_wallet(key, coins).await?;
            info!("{:?} claimed a quest for {} coins and {} xp", key, coins, xp);
            apply_xp_gain(&txn, key, xp, max_level).await?
        }
        _ => None,
    };
    txn.commit().await?;
    Ok((outcome, change))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    #![allow(clippy::panic)]
    use super::*;
    use crate::test_utils::*;
    use chrono::{TimeDelta, TimeZone};
    use rand::{SeedableRng, rngs::StdRng};

    fn quest(voice: Option<i64>, messages: Option<i64>) -> member_daily_quest::Model {
        member_daily_quest::Model {
            user_id: "u".to_string(),
            guild_id: "g".to_string(),
            voice_minutes_target: voice,
            voice_minutes_progress: 0,
            messages_sent_target: messages,
            messages_sent_progress: 0,
            started_at: Utc::now(),
            is_claimed: false,
        }
    }

    async fn set_quest<C: ConnectionTrait>(
        db: &C,
        key: &MemberKey,
        voice: Option<i64>,
        messages: Option<i64>,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let row = member_daily_quest::ActiveModel {
            user_id: Set(key.user_id.clone()),
            guild_id: Set(key.guild_id.clone()),
            voice_minutes_target: Set(voice),
            voice_minutes_progress: Set(0),
            messages_sent_target: Set(messages),
            messages_sent_progress: Set(0),
            started_at: Set(started_at),
            is_claimed: Set(false),
        };
        MemberDailyQuest::insert(row).exec_without_returning(db).await?;
        Ok(())
    }

    #[test]
    fn test_generated_quest_has_an_objective() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let quest = generate_daily_quest(&mut rng);
            assert!(quest.voice.is_some() || quest.messages.is_some());
            if let Some(voice) = quest.voice {
                assert!(VOICE_POOL.contains(&voice));
            }
        }
    }

    #[test]
    fn test_pick_objective_follows_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let commons = (0..10_000)
            .filter(|_| pick_objective(&VOICE_POOL, &mut rng).rarity == Rarity::Common)
            .count();
        assert!((3_500..4_500).contains(&commons));
    }

    #[test]
    fn test_bonus_multiplier() {
        let epic = VOICE_POOL[3];
        let uncommon = MESSAGE_POOL[1];
        assert_eq!(bonus_multiplier(Some(&epic), None), 1.4);
        assert_eq!(bonus_multiplier(Some(&epic), Some(&uncommon)), (1.4 + 1.2) / 1.6);
        assert_eq!(bonus_multiplier(None, None), 0.0);
    }

    #[test]
    fn test_quest_rewards() {
        let single = quest(Some(30), None);
        assert_eq!(quest_rewards(&single), (1_800, 900));

        let both = quest(Some(15), Some(75));
        // (1 + 1) / 1.6 = 1.25
        assert_eq!(quest_rewards(&both), (2_500, 1_250));
    }

    #[tokio::test]
    async fn test_sync_keeps_quest_within_guild_day() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        let morning = Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap();
        set_quest(&db, &alice, Some(15), None, morning).await?;
        record_voice_minutes(&db, &alice, 5).await?;

        let mut rng = StdRng::seed_from_u64(1);
        let quest = sync_daily_quest(&db, &alice, Tz::UTC, morning + TimeDelta::hours(10), &mut rng).await?;
        assert_eq!(quest.voice_minutes_progress, 5);

        // 23:30 UTC is already the next day in Berlin
        let late = Utc.with_ymd_and_hms(2024, 4, 2, 23, 30, 0).unwrap();
        let quest = sync_daily_quest(&db, &alice, Tz::Europe__Berlin, late, &mut rng).await?;
        assert_eq!(quest.voice_minutes_progress, 0);
        assert_eq!(quest.started_at, late);
        Ok(())
    }

    #[tokio::test]
    async fn test_progress_is_capped_and_claim_pays_once() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        set_quest(&db, &alice, Some(15), Some(75), Utc::now()).await?;

        assert_eq!(claim(&db, &alice).await?, ClaimOutcome::Incomplete);

        assert!(record_voice_minutes(&db, &alice, 40).await?);
        assert!(!record_voice_minutes(&db, &alice, 1).await?);
        for _ in 0..80 {
            record_messages(&db, &alice, 1).await?;
        }

        let stored = MemberDailyQuest::find_by_id(alice.id()).one(&db).await?.unwrap();
        assert_eq!(stored.voice_minutes_progress, 15);
        assert_eq!(stored.messages_sent_progress, 75);

        assert_eq!(
            claim(&db, &alice).await?,
            ClaimOutcome::Claimed {
                coins: 2_500,
                xp: 1_250
            }
        );
        assert_eq!(claim(&db, &alice).await?, ClaimOutcome::AlreadyClaimed);
        assert_eq!(claim(&db, &key("bob")).await?, ClaimOutcome::NoQuest);
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_rewards_pays_wallet_and_xp() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        let now = Utc::now();
        set_quest(&db, &alice, Some(15), None, now).await?;
        record_voice_minutes(&db, &alice, 15).await?;

        let mut rng = StdRng::seed_from_u64(3);
        let (outcome, change) = claim_rewards(&db, &alice, None, now, &mut rng).await?;
        let ClaimOutcome::Claimed { coins, xp } = outcome else {
            panic!("expected a claim, got {outcome:?}");
        };
        assert_eq!(balances(&db, &alice).await?.0, coins);
        assert_eq!(change.unwrap().xp, xp);

        let (again, change) = claim_rewards(&db, &alice, None, now, &mut rng).await?;
        assert_eq!(again, ClaimOutcome::AlreadyClaimed);
        assert!(change.is_none());
        assert_eq!(balances(&db, &alice).await?.0, coins);
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_rewards_ignores_yesterdays_quest() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        let now = Utc::now();
        set_quest(&db, &alice, Some(15), None, now - TimeDelta::days(2)).await?;
        record_voice_minutes(&db, &alice, 15).await?;

        let mut rng = StdRng::seed_from_u64(3);
        let (outcome, _) = claim_rewards(&db, &alice, None, now, &mut rng).await?;
        assert_eq!(outcome, ClaimOutcome::Incomplete);
        assert_eq!(balances(&db, &alice).await?.0, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_objective_never_progresses() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        set_quest(&db, &alice, None, Some(75), Utc::now()).await?;
        assert!(!record_voice_minutes(&db, &alice, 10).await?);
        Ok(())
    }
}
