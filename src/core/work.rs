//! Work shifts and the daily presence streak.

use crate::{
    core::{
        cooldown::cooldown_minutes,
        guild::{find_or_create_guild, guild_day, guild_day_end, guild_day_start, guild_timezone},
        ledger::{Bounds, Ledger, MemberKey, NumberField},
        modules::EcoSettings,
    },
    entities::{Member, member},
    errors::Result,
};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use sea_orm::{Condition, prelude::*, sea_query::Expr};
use tracing::{info, instrument};

/// Presence pays a base reward in this range.
pub const PRESENCE_MIN_REWARD: i64 = 250;
pub const PRESENCE_MAX_REWARD: i64 = 750;
/// Every `STREAK_STEP`th consecutive day pays a bonus.
pub const STREAK_STEP: i64 = 7;
/// Multiplier applied to the base reward on a bonus day.
pub const STREAK_BONUS_MULTIPLIER: f64 = 1.75;

/// Luck on top of the base work pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkBonus {
    /// 10% of shifts, 20 to 69 coins
    Jackpot(i64),
    /// 20% of shifts, 5 to 24 coins
    Tip(i64),
}

impl WorkBonus {
    #[must_use]
    pub const fn amount(self) -> i64 {
        match self {
            Self::Jackpot(amount) | Self::Tip(amount) => amount,
        }
    }
}

/// Pay of one shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPay {
    pub base: i64,
    pub bonus: Option<WorkBonus>,
}

impl WorkPay {
    #[must_use]
    pub fn total(&self) -> i64 {
        self.base + self.bonus.map_or(0, WorkBonus::amount)
    }
}

/// Rolls the pay of a shift.
pub fn roll_work_pay<R: Rng + ?Sized>(min: i64, max: i64, rng: &mut R) -> WorkPay {
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    let base = rng.random_range(low..=high);
    let luck: f64 = rng.random();
    let bonus = if luck < 0.1 {
        Some(WorkBonus::Jackpot(rng.random_range(20..70)))
    } else if luck < 0.3 {
        Some(WorkBonus::Tip(rng.random_range(5..25)))
    } else {
        None
    };
    WorkPay { base, bonus }
}

/// Result of a work attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    OnCooldown { expires_at: DateTime<Utc> },
    Paid(WorkPay),
}

/// Works a shift if the cooldown elapsed and pays it into the wallet.
#[instrument(skip(db, settings, rng))]
pub async fn work<C, R>(
    db: &C,
    key: &MemberKey,
    settings: &EcoSettings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<WorkOutcome>
where
    C: ConnectionTrait,
    R: Rng + ?Sized,
{
    let ledger = Ledger::new(db);
    let member = ledger.find_or_create_member(key).await?;
    let state = cooldown_minutes(member.last_worked_at, settings.work_cooldown_minutes, now);
    if let (true, Some(expires_at)) = (state.is_active, state.expires_at) {
        return Ok(WorkOutcome::OnCooldown { expires_at });
    }

    let threshold = now - TimeDelta::minutes(settings.work_cooldown_minutes.max(0));
    let claimed = Member::update_many()
        .col_expr(member::Column::LastWorkedAt, Expr::value(Some(now)))
        .filter(member::Column::UserId.eq(key.user_id.as_str()))
        .filter(member::Column::GuildId.eq(key.guild_id.as_str()))
        .filter(
            Condition::any()
                .add(member::Column::LastWorkedAt.is_null())
                .add(member::Column::LastWorkedAt.lte(threshold)),
        )
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Ok(WorkOutcome::OnCooldown {
            expires_at: now + TimeDelta::minutes(settings.work_cooldown_minutes.max(0)),
        });
    }

    let pay = roll_work_pay(settings.work_min_gain, settings.work_max_gain, rng);
    ledger.credit_wallet(key, pay.total()).await?;
    info!("{:?} worked for {} coins", key, pay.total());
    Ok(WorkOutcome::Paid(pay))
}

/// Position of a streak inside its bonus cycle, `1..=STREAK_STEP`.
#[must_use]
pub const fn streak_day(streak: i64) -> i64 {
    match streak % STREAK_STEP {
        0 => STREAK_STEP,
        day => day,
    }
}

/// Bonus paid on the last day of a streak cycle.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn streak_bonus(streak: i64, base: i64) -> i64 {
    if streak > 0 && streak_day(streak) == STREAK_STEP {
        (base as f64 * STREAK_BONUS_MULTIPLIER).floor() as i64
    } else {
        0
    }
}

/// Result of a presence claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    /// Already claimed this guild day; the next claim opens at `resets_at`
    AlreadyClaimed { streak: i64, resets_at: DateTime<Utc> },
    Claimed { streak: i64, base: i64, bonus: i64 },
}

/// Claims the daily presence reward.
///
/// The streak grows when the previous claim fell on the previous guild day
/// and restarts at 1 otherwise.
#[instrument(skip(db, rng))]
pub async fn attend<C, R>(
    db: &C,
    key: &MemberKey,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<PresenceOutcome>
where
    C: ConnectionTrait,
    R: Rng + ?Sized,
{
    let tz = guild_timezone(&find_or_create_guild(db, &key.guild_id).await?);
    let ledger = Ledger::new(db);
    let member = ledger.find_or_create_member(key).await?;
    let today_start = guild_day_start(now, tz);
    let resets_at = guild_day_end(now, tz);

    let already = || PresenceOutcome::AlreadyClaimed {
        streak: member.daily_streak,
        resets_at,
    };
    if member.last_attended_at.is_some_and(|at| at >= today_start) {
        return Ok(already());
    }

    let claimed = Member::update_many()
        .col_expr(member::Column::LastAttendedAt, Expr::value(Some(now)))
        .filter(member::Column::UserId.eq(key.user_id.as_str()))
        .filter(member::Column::GuildId.eq(key.guild_id.as_str()))
        .filter(
            Condition::any()
                .add(member::Column::LastAttendedAt.is_null())
                .add(member::Column::LastAttendedAt.lt(today_start)),
        )
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Ok(already());
    }

    let yesterday = guild_day(now, tz).pred_opt();
    let continues = member
        .last_attended_at
        .is_some_and(|at| Some(guild_day(at, tz)) == yesterday);
    let member = if continues {
        ledger
            .update_field(key, NumberField::DailyStreak, 1, Bounds::NON_NEGATIVE)
            .await?
    } else {
        ledger
            .set_field(key, NumberField::DailyStreak, 1, Bounds::NON_NEGATIVE)
            .await?
    };

    let base = rng.random_range(PRESENCE_MIN_REWARD..=PRESENCE_MAX_REWARD);
    let bonus = streak_bonus(member.daily_streak, base);
    ledger.credit_wallet(key, base + bonus).await?;

    Ok(PresenceOutcome::Claimed {
        streak: member.daily_streak,
        base,
        bonus,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::TimeZone;
    use rand::{SeedableRng, rngs::StdRng};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_work_pay_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let pay = roll_work_pay(100, 250, &mut rng);
            assert!((100..=250).contains(&pay.base));
            match pay.bonus {
                Some(WorkBonus::Jackpot(amount)) => assert!((20..70).contains(&amount)),
                Some(WorkBonus::Tip(amount)) => assert!((5..25).contains(&amount)),
                None => {}
            }
            assert!(pay.total() >= pay.base);
        }
    }

    #[test]
    fn test_streak_bonus() {
        assert_eq!(streak_day(1), 1);
        assert_eq!(streak_day(7), 7);
        assert_eq!(streak_day(8), 1);
        assert_eq!(streak_bonus(7, 400), 700);
        assert_eq!(streak_bonus(14, 301), 526);
        assert_eq!(streak_bonus(6, 400), 0);
        assert_eq!(streak_bonus(0, 400), 0);
    }

    #[tokio::test]
    async fn test_work_cooldown() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        let settings = EcoSettings::default();
        let mut rng = StdRng::seed_from_u64(5);

        let WorkOutcome::Paid(pay) = work(&db, &alice, &settings, at(1, 8), &mut rng).await? else {
            panic!("first shift should pay");
        };
        assert_eq!(balances(&db, &alice).await?.0, pay.total());

        let outcome = work(&db, &alice, &settings, at(1, 9), &mut rng).await?;
        assert_eq!(
            outcome,
            WorkOutcome::OnCooldown {
                expires_at: at(1, 10)
            }
        );

        let outcome = work(&db, &alice, &settings, at(1, 10), &mut rng).await?;
        assert!(matches!(outcome, WorkOutcome::Paid(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_presence_streak() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        let mut rng = StdRng::seed_from_u64(9);

        let outcome = attend(&db, &alice, at(1, 8), &mut rng).await?;
        assert!(matches!(outcome, PresenceOutcome::Claimed { streak: 1, bonus: 0, .. }));

        let outcome = attend(&db, &alice, at(1, 23), &mut rng).await?;
        assert_eq!(
            outcome,
            PresenceOutcome::AlreadyClaimed {
                streak: 1,
                resets_at: at(2, 0)
            }
        );

        for day in 2..=6 {
            attend(&db, &alice, at(day, 12), &mut rng).await?;
        }
        let PresenceOutcome::Claimed { streak, base, bonus } =
            attend(&db, &alice, at(7, 12), &mut rng).await?
        else {
            panic!("seventh day should pay");
        };
        assert_eq!(streak, 7);
        assert_eq!(bonus, streak_bonus(7, base));
        assert!(bonus > 0);

        // Skipping a day restarts the streak
        let outcome = attend(&db, &alice, at(9, 12), &mut rng).await?;
        assert!(matches!(outcome, PresenceOutcome::Claimed { streak: 1, .. }));
        Ok(())
    }
}
