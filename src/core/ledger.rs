//! Ledger primitives over member and vault rows.
//!
//! A [`Ledger`] wraps a connection or an open transaction and exposes the
//! numeric mutations every other service builds on. Counters are changed with
//! a single `UPDATE ... SET x = CASE ... END` statement that adds the delta and
//! clamps the result in the database, so concurrent writers never lose an
//! update. Debits that must not go below zero use a conditional update and
//! report [`Error::InsufficientFunds`] when no row matched.

use crate::{
    core::economy::capacity,
    entities::{CapacityTier, Member, MemberVault, member, member_vault},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    Set,
    prelude::*,
    sea_query::{Expr, OnConflict, SimpleExpr},
};

/// Identifies a participant in one guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub user_id: String,
    pub guild_id: String,
}

impl MemberKey {
    /// Builds a key from any string-like ids.
    pub fn new(user_id: impl Into<String>, guild_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            guild_id: guild_id.into(),
        }
    }

    /// Primary key tuple of the member and vault tables.
    #[must_use]
    pub fn id(&self) -> (String, String) {
        (self.user_id.clone(), self.guild_id.clone())
    }
}

/// Inclusive clamp applied to a numeric field after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: i64,
    /// `None` for no upper bound
    pub max: Option<i64>,
}

impl Bounds {
    /// `[0, ∞)`
    pub const NON_NEGATIVE: Self = Self { min: 0, max: None };

    /// `[0, max]`
    #[must_use]
    pub const fn up_to(max: i64) -> Self {
        Self { min: 0, max: Some(max) }
    }

    /// Clamps a value computed outside the database.
    #[must_use]
    pub fn clamp(self, value: i64) -> i64 {
        let value = value.max(self.min);
        self.max.map_or(value, |max| value.min(max))
    }
}

/// Numeric member fields that go through the clamped primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberField {
    WalletCoins,
    ActivityXp,
    MessageCount,
    DailyStreak,
}

impl NumberField {
    const fn column(self) -> member::Column {
        match self {
            Self::WalletCoins => member::Column::WalletCoins,
            Self::ActivityXp => member::Column::ActivityXp,
            Self::MessageCount => member::Column::MessageCount,
            Self::DailyStreak => member::Column::DailyStreak,
        }
    }
}

/// Member timestamps backing cooldowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberTimestamp {
    LastAttendedAt,
    LastWorkedAt,
    LastRobAt,
    LastRobbedAt,
    SupporterSince,
}

impl MemberTimestamp {
    const fn column(self) -> member::Column {
        match self {
            Self::LastAttendedAt => member::Column::LastAttendedAt,
            Self::LastWorkedAt => member::Column::LastWorkedAt,
            Self::LastRobAt => member::Column::LastRobAt,
            Self::LastRobbedAt => member::Column::LastRobbedAt,
            Self::SupporterSince => member::Column::SupporterSince,
        }
    }
}

/// Minutes to add to the voice counters of a member in one statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallMinutes {
    pub active: i64,
    pub muted: i64,
    pub deaf: i64,
    pub private: i64,
    pub public: i64,
    pub streaming: i64,
    pub camera: i64,
}

impl CallMinutes {
    fn columns(&self) -> [(member::Column, i64); 7] {
        [
            (member::Column::CallActiveMinutes, self.active),
            (member::Column::CallMutedMinutes, self.muted),
            (member::Column::CallDeafMinutes, self.deaf),
            (member::Column::CallPrivateMinutes, self.private),
            (member::Column::CallPublicMinutes, self.public),
            (member::Column::CallStreamingMinutes, self.streaming),
            (member::Column::CallCameraMinutes, self.camera),
        ]
    }
}

/// `column + delta` clamped to `bounds`, evaluated by the database.
fn clamped_add<T: ColumnTrait>(column: T, delta: i64, bounds: Bounds) -> SimpleExpr {
    let next = Expr::col(column).add(delta);
    let mut case = Expr::case(Expr::expr(next.clone()).lt(bounds.min), bounds.min);
    if let Some(max) = bounds.max {
        case = case.case(Expr::expr(next.clone()).gt(max), max);
    }
    case.finally(next).into()
}

/// Ledger operations bound to one connection or transaction.
///
/// Build one per logical operation: `Ledger::new(&db)` for single statement
/// updates, `Ledger::new(&txn)` when several rows must change together.
pub struct Ledger<'c, C> {
    conn: &'c C,
}

impl<'c, C> Ledger<'c, C>
where
    C: ConnectionTrait,
{
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// The wrapped connection, for nested services that take `&C`.
    pub const fn conn(&self) -> &'c C {
        self.conn
    }

    async fn member(&self, key: &MemberKey) -> Result<member::Model> {
        Member::find_by_id(key.id())
            .one(self.conn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("member {key:?}")).into())
    }

    async fn vault(&self, key: &MemberKey) -> Result<member_vault::Model> {
        MemberVault::find_by_id(key.id())
            .one(self.conn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("vault {key:?}")).into())
    }

    /// Returns the member row, inserting a zeroed one if missing.
    pub async fn find_or_create_member(&self, key: &MemberKey) -> Result<member::Model> {
        if let Some(model) = Member::find_by_id(key.id()).one(self.conn).await? {
            return Ok(model);
        }

        let row = member::ActiveModel {
            user_id: Set(key.user_id.clone()),
            guild_id: Set(key.guild_id.clone()),
            wallet_coins: Set(0),
            activity_xp: Set(0),
            message_count: Set(0),
            call_active_minutes: Set(0),
            call_muted_minutes: Set(0),
            call_deaf_minutes: Set(0),
            call_private_minutes: Set(0),
            call_public_minutes: Set(0),
            call_streaming_minutes: Set(0),
            call_camera_minutes: Set(0),
            daily_streak: Set(0),
            last_attended_at: Set(None),
            last_worked_at: Set(None),
            last_rob_at: Set(None),
            last_robbed_at: Set(None),
            supporter_since: Set(None),
        };

        // A concurrent insert of the same key is fine, keep whichever landed
        Member::insert(row)
            .on_conflict(
                OnConflict::columns([member::Column::UserId, member::Column::GuildId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        self.member(key).await
    }

    /// Returns the vault row, inserting an empty `TIER_0` vault if missing.
    pub async fn find_or_create_vault(&self, key: &MemberKey) -> Result<member_vault::Model> {
        if let Some(model) = MemberVault::find_by_id(key.id()).one(self.conn).await? {
            return Ok(model);
        }

        self.find_or_create_member(key).await?;

        let row = member_vault::ActiveModel {
            user_id: Set(key.user_id.clone()),
            guild_id: Set(key.guild_id.clone()),
            vault_coins: Set(0),
            capacity_tier: Set(CapacityTier::Tier0),
        };

        MemberVault::insert(row)
            .on_conflict(
                OnConflict::columns([
                    member_vault::Column::UserId,
                    member_vault::Column::GuildId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        self.vault(key).await
    }

    /// Adds `delta` (negative to subtract) to a member field, clamped to
    /// `bounds`, and returns the updated row.
    pub async fn update_field(
        &self,
        key: &MemberKey,
        field: NumberField,
        delta: i64,
        bounds: Bounds,
    ) -> Result<member::Model> {
        self.find_or_create_member(key).await?;

        Member::update_many()
            .col_expr(field.column(), clamped_add(field.column(), delta, bounds))
            .filter(member::Column::UserId.eq(key.user_id.as_str()))
            .filter(member::Column::GuildId.eq(key.guild_id.as_str()))
            .exec(self.conn)
            .await?;

        self.member(key).await
    }

    /// Overwrites a member field with `value` clamped to `bounds`.
    pub async fn set_field(
        &self,
        key: &MemberKey,
        field: NumberField,
        value: i64,
        bounds: Bounds,
    ) -> Result<member::Model> {
        self.find_or_create_member(key).await?;

        Member::update_many()
            .col_expr(field.column(), Expr::value(bounds.clamp(value)))
            .filter(member::Column::UserId.eq(key.user_id.as_str()))
            .filter(member::Column::GuildId.eq(key.guild_id.as_str()))
            .exec(self.conn)
            .await?;

        self.member(key).await
    }

    /// Sets or clears a cooldown timestamp.
    pub async fn set_timestamp(
        &self,
        key: &MemberKey,
        field: MemberTimestamp,
        value: Option<DateTime<Utc>>,
    ) -> Result<member::Model> {
        self.find_or_create_member(key).await?;

        Member::update_many()
            .col_expr(field.column(), Expr::value(value))
            .filter(member::Column::UserId.eq(key.user_id.as_str()))
            .filter(member::Column::GuildId.eq(key.guild_id.as_str()))
            .exec(self.conn)
            .await?;

        self.member(key).await
    }

    /// Adds minutes to every non-zero voice counter in one statement.
    pub async fn add_call_minutes(
        &self,
        key: &MemberKey,
        minutes: &CallMinutes,
    ) -> Result<member::Model> {
        self.find_or_create_member(key).await?;

        let mut update = Member::update_many();
        let mut touched = false;
        for (column, delta) in minutes.columns() {
            if delta > 0 {
                update = update.col_expr(column, clamped_add(column, delta, Bounds::NON_NEGATIVE));
                touched = true;
            }
        }

        if touched {
            update
                .filter(member::Column::UserId.eq(key.user_id.as_str()))
                .filter(member::Column::GuildId.eq(key.guild_id.as_str()))
                .exec(self.conn)
                .await?;
        }

        self.member(key).await
    }

    /// Adds coins to the wallet.
    pub async fn credit_wallet(&self, key: &MemberKey, amount: i64) -> Result<member::Model> {
        self.update_field(key, NumberField::WalletCoins, amount, Bounds::NON_NEGATIVE)
            .await
    }

    /// Removes exactly `amount` coins from the wallet, or fails without
    /// touching it when the wallet holds less.
    pub async fn debit_wallet(&self, key: &MemberKey, amount: i64) -> Result<member::Model> {
        let current = self.find_or_create_member(key).await?;

        let result = Member::update_many()
            .col_expr(
                member::Column::WalletCoins,
                Expr::col(member::Column::WalletCoins).sub(amount),
            )
            .filter(member::Column::UserId.eq(key.user_id.as_str()))
            .filter(member::Column::GuildId.eq(key.guild_id.as_str()))
            .filter(member::Column::WalletCoins.gte(amount))
            .exec(self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(Error::InsufficientFunds {
                available: current.wallet_coins,
                required: amount,
            });
        }

        self.member(key).await
    }

    /// Adds `delta` to the vault, clamped to `[0, capacity(tier)]`.
    pub async fn update_vault_coins(
        &self,
        key: &MemberKey,
        delta: i64,
    ) -> Result<member_vault::Model> {
        let vault = self.find_or_create_vault(key).await?;
        let bounds = Bounds::up_to(capacity(vault.capacity_tier));

        MemberVault::update_many()
            .col_expr(
                member_vault::Column::VaultCoins,
                clamped_add(member_vault::Column::VaultCoins, delta, bounds),
            )
            .filter(member_vault::Column::UserId.eq(key.user_id.as_str()))
            .filter(member_vault::Column::GuildId.eq(key.guild_id.as_str()))
            .exec(self.conn)
            .await?;

        self.vault(key).await
    }

    /// Removes exactly `amount` coins from the vault, or fails without
    /// touching it when the vault holds less.
    pub async fn debit_vault(&self, key: &MemberKey, amount: i64) -> Result<member_vault::Model> {
        let current = self.find_or_create_vault(key).await?;

        let result = MemberVault::update_many()
            .col_expr(
                member_vault::Column::VaultCoins,
                Expr::col(member_vault::Column::VaultCoins).sub(amount),
            )
            .filter(member_vault::Column::UserId.eq(key.user_id.as_str()))
            .filter(member_vault::Column::GuildId.eq(key.guild_id.as_str()))
            .filter(member_vault::Column::VaultCoins.gte(amount))
            .exec(self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(Error::InsufficientFunds {
                available: current.vault_coins,
                required: amount,
            });
        }

        self.vault(key).await
    }

    /// Sets the capacity tier. Balances are left alone.
    pub async fn set_capacity_tier(
        &self,
        key: &MemberKey,
        tier: CapacityTier,
    ) -> Result<member_vault::Model> {
        let vault = self.find_or_create_vault(key).await?;
        let mut active: member_vault::ActiveModel = vault.into();
        active.capacity_tier = Set(tier);
        Ok(active.update(self.conn).await?)
    }

    /// Takes `amount` coins from the vault first and the wallet for the rest.
    ///
    /// Fails with [`Error::InsufficientFunds`] when both together hold less.
    /// Run it inside a transaction: on failure of the second debit the first
    /// one must be rolled back by the caller.
    pub async fn drain_vault_then_wallet(
        &self,
        key: &MemberKey,
        amount: i64,
    ) -> Result<(member::Model, member_vault::Model)> {
        let member = self.find_or_create_member(key).await?;
        let vault = self.find_or_create_vault(key).await?;

        let available = member.wallet_coins + vault.vault_coins;
        if available < amount {
            return Err(Error::InsufficientFunds {
                available,
                required: amount,
            });
        }

        let from_vault = vault.vault_coins.min(amount);
        let from_wallet = amount - from_vault;

        let vault = if from_vault > 0 {
            self.debit_vault(key, from_vault).await?
        } else {
            vault
        };
        let member = if from_wallet > 0 {
            self.debit_wallet(key, from_wallet).await?
        } else {
            member
        };

        Ok((member, vault))
    }
}
