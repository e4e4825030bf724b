//! Activity XP curve, level ups and level role rewards.

use crate::{
    core::ledger::{Bounds, Ledger, MemberKey, NumberField},
    entities::{GuildLevelReward, guild_level_reward},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::OnConflict};
use std::collections::HashSet;
use tracing::instrument;

/// XP needed to reach `level`. Level 1 starts at 0.
#[must_use]
pub const fn level_to_xp(level: i64) -> i64 {
    if level <= 1 {
        return 0;
    }
    let steps = level - 1;
    250 * steps * steps + 3 * level + 750
}

/// Level reached with `xp`, the inverse of [`level_to_xp`].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn xp_to_level(xp: i64) -> i64 {
    let a = 250.0_f64;
    let b = 3.0 - 2.0 * a;
    let c = a + 750.0 - xp as f64;

    let delta = b.mul_add(b, -4.0 * a * c);
    if delta <= 0.0 {
        return 1;
    }
    (((-b + delta.sqrt()) / (2.0 * a)).floor() as i64).max(1)
}

/// Position of some XP within its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpProgress {
    pub level: i64,
    pub level_xp: i64,
    pub next_level_xp: i64,
    /// XP earned since the start of the level
    pub progress: i64,
    /// XP between this level and the next
    pub needed: i64,
}

#[must_use]
pub fn xp_progress(xp: i64) -> XpProgress {
    let level = xp_to_level(xp);
    let level_xp = level_to_xp(level);
    let next_level_xp = level_to_xp(level + 1);
    XpProgress {
        level,
        level_xp,
        next_level_xp,
        progress: xp - level_xp,
        needed: next_level_xp - level_xp,
    }
}

/// Effect of an XP gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub previous_level: i64,
    pub new_level: i64,
    pub xp: i64,
    /// The gain hit the level cap and XP was pinned to it
    pub reached_max: bool,
}

impl LevelChange {
    #[must_use]
    pub const fn leveled_up(&self) -> bool {
        self.new_level > self.previous_level
    }
}

/// Adds `gain` XP to a member, honouring an optional level cap.
///
/// Returns `None` when the member is already at the cap. Reaching the cap
/// pins XP to the cap threshold.
#[instrument(skip(db))]
pub async fn apply_xp_gain<C>(
    db: &C,
    key: &MemberKey,
    gain: i64,
    max_level: Option<i64>,
) -> Result<Option<LevelChange>>
where
    C: ConnectionTrait,
{
    if gain < 0 {
        return Err(Error::InvalidAmount { amount: gain });
    }

    let ledger = Ledger::new(db);
    let member = ledger.find_or_create_member(key).await?;
    let previous_level = xp_to_level(member.activity_xp);

    if max_level.is_some_and(|max| previous_level >= max) {
        return Ok(None);
    }

    let projected = xp_to_level(member.activity_xp + gain);
    let cap = max_level.filter(|max| projected >= *max);

    let member = match cap {
        Some(max) => {
            ledger
                .set_field(key, NumberField::ActivityXp, level_to_xp(max), Bounds::NON_NEGATIVE)
                .await?
        }
        None => {
            ledger
                .update_field(key, NumberField::ActivityXp, gain, Bounds::NON_NEGATIVE)
                .await?
        }
    };

    Ok(Some(LevelChange {
        previous_level,
        new_level: xp_to_level(member.activity_xp),
        xp: member.activity_xp,
        reached_max: cap.is_some(),
    }))
}

/// Role changes and coins owed after reaching a level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePlan {
    pub add: Vec<String>,
    pub remove: Vec<String>,
    /// Sum of the coin rewards of the roles being added
    pub coins: i64,
}

/// Plans role rewards for `level`.
///
/// Every reward up to `level` applies. Stackable roles accumulate; of the
/// non-stackable ones only the highest is kept and lower ones are removed.
/// Roles `role_exists` does not recognise are skipped.
pub fn plan_role_rewards<F>(
    rewards: &[guild_level_reward::Model],
    level: i64,
    member_roles: &HashSet<String>,
    role_exists: F,
) -> RolePlan
where
    F: Fn(&str) -> bool,
{
    let mut eligible: Vec<(&guild_level_reward::Model, &str)> = rewards
        .iter()
        .filter(|reward| reward.at_level <= level)
        .filter_map(|reward| reward.role_id.as_deref().map(|role| (reward, role)))
        .collect();
    eligible.sort_by(|a, b| b.0.at_level.cmp(&a.0.at_level));

    let Some(&(_, highest)) = eligible.first() else {
        return RolePlan::default();
    };

    let mut plan = RolePlan::default();
    for (reward, role) in eligible {
        if !role_exists(role) {
            continue;
        }
        let keep = reward.is_stackable || role == highest;
        let has = member_roles.contains(role);

        if keep && !has {
            plan.add.push(role.to_string());
            plan.coins += reward.coins_reward;
        } else if !keep && has {
            plan.remove.push(role.to_string());
        }
    }
    plan
}

/// Rewards of a guild, lowest level first.
pub async fn list_rewards<C>(db: &C, guild_id: &str) -> Result<Vec<guild_level_reward::Model>>
where
    C: ConnectionTrait,
{
    GuildLevelReward::find()
        .filter(guild_level_reward::Column::GuildId.eq(guild_id))
        .order_by_asc(guild_level_reward::Column::AtLevel)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates or replaces the reward unlocked at `at_level`.
pub async fn set_reward<C>(
    db: &C,
    guild_id: &str,
    at_level: i64,
    role_id: Option<String>,
    coins_reward: i64,
    is_stackable: bool,
) -> Result<()>
where
    C: ConnectionTrait,
{
    if at_level < 2 {
        return Err(Error::InvalidAmount { amount: at_level });
    }
    if coins_reward < 0 {
        return Err(Error::InvalidAmount {
            amount: coins_reward,
        });
    }

    let row = guild_level_reward::ActiveModel {
        guild_id: Set(guild_id.to_string()),
        at_level: Set(at_level),
        role_id: Set(role_id),
        coins_reward: Set(coins_reward),
        is_stackable: Set(is_stackable),
    };

    GuildLevelReward::insert(row)
        .on_conflict(
            OnConflict::columns([
                guild_level_reward::Column::GuildId,
                guild_level_reward::Column::AtLevel,
            ])
            .update_columns([
                guild_level_reward::Column::RoleId,
                guild_level_reward::Column::CoinsReward,
                guild_level_reward::Column::IsStackable,
            ])
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Deletes the reward at `at_level`; returns whether one existed.
pub async fn remove_reward<C>(db: &C, guild_id: &str, at_level: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = GuildLevelReward::delete_by_id((guild_id.to_string(), at_level))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}
