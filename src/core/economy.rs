//! Economy ledger service.
//!
//! Wallet and vault balances of members. Every operation that touches more
//! than one balance runs in a single database transaction through a
//! transaction-scoped [`Ledger`]; if any step fails the transaction is dropped
//! and rolled back, so no partial transfer is ever visible.

use crate::{
    core::{
        activity::SUPPORTER_RAMP_DAYS,
        cooldown::{cooldown_minutes, time_elapsed_factor},
        ledger::{Ledger, MemberKey, MemberTimestamp},
        modules::EcoSettings,
    },
    entities::{CapacityTier, member, member_vault},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, TransactionTrait};
use tracing::{debug, info, instrument};

/// Share of the total balance lost on a failed rob.
pub const ROB_FAILURE_PENALTY: f64 = 0.02;

/// Vault capacity of a tier.
#[must_use]
pub const fn capacity(tier: CapacityTier) -> i64 {
    match tier {
        CapacityTier::Tier0 => 50_000,
        CapacityTier::Tier1 => 75_000,
        CapacityTier::Tier2 => 150_000,
        CapacityTier::Tier3 => 225_000,
        CapacityTier::Tier4 => 300_000,
        CapacityTier::Tier5 => 375_000,
        CapacityTier::Tier6 => 450_000,
        CapacityTier::Tier7 => 525_000,
        CapacityTier::Tier8 => 600_000,
    }
}

/// Price of reaching a tier from the previous one.
#[must_use]
pub const fn upgrade_cost(tier: CapacityTier) -> i64 {
    match tier {
        CapacityTier::Tier0 => 0,
        CapacityTier::Tier1 => 12_500,
        CapacityTier::Tier2 => 25_000,
        CapacityTier::Tier3 => 37_500,
        CapacityTier::Tier4 => 50_000,
        CapacityTier::Tier5 => 62_500,
        CapacityTier::Tier6 => 75_000,
        CapacityTier::Tier7 => 87_500,
        CapacityTier::Tier8 => 100_000,
    }
}

/// Steal chance bonus, in percent, shown for a tier.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub const fn steal_chance_increase(tier: CapacityTier) -> f64 {
    tier.ordinal() as f64 * 2.5
}

/// Wallet, vault and their sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalCoins {
    pub in_wallet: i64,
    pub in_vault: i64,
    pub total: i64,
}

/// Requested amount of a deposit or withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    /// As much as possible
    All,
    Exact(i64),
}

impl Amount {
    /// Parses `all` or a positive integer.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        input
            .replace(['_', ','], "")
            .parse::<i64>()
            .ok()
            .filter(|amount| *amount > 0)
            .map(Self::Exact)
    }
}

/// Result of a wallet/vault movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultTransfer {
    /// Coins actually moved
    pub moved: i64,
    pub member: member::Model,
    pub vault: member_vault::Model,
}

/// The tier after the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextTier {
    pub tier: CapacityTier,
    pub cost: i64,
    pub capacity: i64,
}

impl NextTier {
    /// Next tier after `current`, `None` at the last tier.
    #[must_use]
    pub fn after(current: CapacityTier) -> Option<Self> {
        current.next().map(|tier| Self {
            tier,
            cost: upgrade_cost(tier),
            capacity: capacity(tier),
        })
    }

    /// Cost after a discount ratio in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn discounted_cost(&self, discount: f64) -> i64 {
        (self.cost as f64 * (1.0 - discount.clamp(0.0, 1.0))).floor() as i64
    }
}

/// Vault upgrade discount of a supporter, growing linearly from 0 to
/// `max_discount` over the supporter ramp.
#[must_use]
pub fn upgrade_discount(
    supporter_since: Option<DateTime<Utc>>,
    max_discount: f64,
    now: DateTime<Utc>,
) -> f64 {
    max_discount.clamp(0.0, 1.0) * time_elapsed_factor(supporter_since, SUPPORTER_RAMP_DAYS, now)
}

/// Outcome of a rob attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobOutcome {
    /// Robber and target are the same member
    SelfTarget,
    /// Robber must wait until `expires_at`
    OnCooldown { expires_at: DateTime<Utc> },
    /// Target has no coins in the wallet
    TargetBroke,
    /// Target was robbed recently
    TargetProtected { expires_at: DateTime<Utc> },
    /// Coins moved from the target wallet to the robber wallet
    Stolen { amount: i64 },
    /// Coins burned from the robber, vault first
    Caught { penalty: i64 },
}

/// Wallet and vault operations of members, over a borrowed connection.
#[derive(Debug)]
pub struct EconomyService<'c, C> {
    db: &'c C,
}

impl<'c, C> EconomyService<'c, C>
where
    C: ConnectionTrait + TransactionTrait,
{
    #[must_use]
    pub const fn new(db: &'c C) -> Self {
        Self { db }
    }

    /// Wallet, vault and total of a member.
    pub async fn get_total_coins(&self, key: &MemberKey) -> Result<TotalCoins> {
        let ledger = Ledger::new(self.db);
        let member = ledger.find_or_create_member(key).await?;
        let vault = ledger.find_or_create_vault(key).await?;
        Ok(TotalCoins {
            in_wallet: member.wallet_coins,
            in_vault: vault.vault_coins,
            total: member.wallet_coins + vault.vault_coins,
        })
    }

    /// Adds coins to the wallet.
    pub async fn add_wallet_coins(&self, key: &MemberKey, amount: i64) -> Result<member::Model> {
        Ledger::new(self.db).credit_wallet(key, amount.max(0)).await
    }

    /// Removes coins from the wallet, stopping at zero.
    ///
    /// Never fails for lack of funds. Callers that need that check use
    /// [`Self::remove_coins_with_vault_fallback`] or [`Self::transfer`].
    pub async fn remove_wallet_coins(&self, key: &MemberKey, amount: i64) -> Result<member::Model> {
        Ledger::new(self.db).credit_wallet(key, -amount.max(0)).await
    }

    /// Removes `amount` coins, vault first, then wallet. All or nothing.
    #[instrument(skip(self))]
    pub async fn remove_coins_with_vault_fallback(
        &self,
        key: &MemberKey,
        amount: i64,
    ) -> Result<TotalCoins> {
        if amount < 0 {
            return Err(Error::InvalidAmount { amount });
        }

        let txn = self.db.begin().await?;
        let (member, vault) = Ledger::new(&txn).drain_vault_then_wallet(key, amount).await?;
        txn.commit().await?;

        Ok(TotalCoins {
            in_wallet: member.wallet_coins,
            in_vault: vault.vault_coins,
            total: member.wallet_coins + vault.vault_coins,
        })
    }

    /// Moves coins from the wallet to the vault, as many as the wallet holds
    /// and the vault can take.
    #[instrument(skip(self))]
    pub async fn deposit_to_vault(&self, key: &MemberKey, amount: Amount) -> Result<VaultTransfer> {
        if let Amount::Exact(value) = amount {
            if value <= 0 {
                return Err(Error::InvalidAmount { amount: value });
            }
        }

        let txn = self.db.begin().await?;
        let ledger = Ledger::new(&txn);
        let member = ledger.find_or_create_member(key).await?;
        let vault = ledger.find_or_create_vault(key).await?;

        let capacity = capacity(vault.capacity_tier);
        let free = capacity - vault.vault_coins;
        if free <= 0 {
            return Err(Error::VaultFull { capacity });
        }

        let requested = match amount {
            Amount::All => member.wallet_coins,
            Amount::Exact(value) => value,
        };
        let moved = requested.min(member.wallet_coins).min(free);
        if moved <= 0 {
            return Err(Error::InsufficientFunds {
                available: member.wallet_coins,
                required: requested.max(1),
            });
        }

        let member = ledger.debit_wallet(key, moved).await?;
        let vault = ledger.update_vault_coins(key, moved).await?;
        txn.commit().await?;

        debug!("Deposited {} coins into vault of {:?}", moved, key);
        Ok(VaultTransfer {
            moved,
            member,
            vault,
        })
    }

    /// Moves coins from the vault back to the wallet.
    #[instrument(skip(self))]
    pub async fn withdraw_from_vault(
        &self,
        key: &MemberKey,
        amount: Amount,
    ) -> Result<VaultTransfer> {
        if let Amount::Exact(value) = amount {
            if value <= 0 {
                return Err(Error::InvalidAmount { amount: value });
            }
        }

        let txn = self.db.begin().await?;
        let ledger = Ledger::new(&txn);
        let vault = ledger.find_or_create_vault(key).await?;
        if vault.vault_coins <= 0 {
            return Err(Error::EmptyVault);
        }

        let moved = match amount {
            Amount::All => vault.vault_coins,
            Amount::Exact(value) => value.min(vault.vault_coins),
        };

        let vault = ledger.debit_vault(key, moved).await?;
        let member = ledger.credit_wallet(key, moved).await?;
        txn.commit().await?;

        debug!("Withdrew {} coins from vault of {:?}", moved, key);
        Ok(VaultTransfer {
            moved,
            member,
            vault,
        })
    }

    /// Moves `amount` wallet coins from one member to another.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        from: &MemberKey,
        to: &MemberKey,
        amount: i64,
    ) -> Result<(member::Model, member::Model)> {
        if amount <= 0 {
            return Err(Error::InvalidAmount { amount });
        }

        let txn = self.db.begin().await?;
        let ledger = Ledger::new(&txn);
        let source = ledger.debit_wallet(from, amount).await?;
        let destination = ledger.credit_wallet(to, amount).await?;
        txn.commit().await?;

        Ok((source, destination))
    }

    /// Next tier of the member vault, `None` at the last tier.
    pub async fn get_next_tier(&self, key: &MemberKey) -> Result<Option<NextTier>> {
        let vault = Ledger::new(self.db).find_or_create_vault(key).await?;
        Ok(NextTier::after(vault.capacity_tier))
    }

    /// Moves the vault to the next tier without charging for it.
    ///
    /// Returns `None` when the vault is already at the last tier.
    pub async fn upgrade_tier(&self, key: &MemberKey) -> Result<Option<member_vault::Model>> {
        let ledger = Ledger::new(self.db);
        let vault = ledger.find_or_create_vault(key).await?;
        match vault.capacity_tier.next() {
            Some(tier) => Ok(Some(ledger.set_capacity_tier(key, tier).await?)),
            None => Ok(None),
        }
    }

    /// Charges `cost` (vault first) and upgrades the vault to `expected`, in
    /// one transaction.
    ///
    /// Returns `None` without charging when the vault is no longer one step
    /// below `expected`, for instance after a concurrent upgrade.
    #[instrument(skip(self))]
    pub async fn purchase_tier(
        &self,
        key: &MemberKey,
        expected: CapacityTier,
        cost: i64,
    ) -> Result<Option<member_vault::Model>> {
        if cost < 0 {
            return Err(Error::InvalidAmount { amount: cost });
        }

        let txn = self.db.begin().await?;
        let ledger = Ledger::new(&txn);
        let vault = ledger.find_or_create_vault(key).await?;
        if vault.capacity_tier.next() != Some(expected) {
            return Ok(None);
        }

        ledger.drain_vault_then_wallet(key, cost).await?;
        let vault = ledger.set_capacity_tier(key, expected).await?;
        txn.commit().await?;

        info!("Vault of {:?} upgraded to {:?} for {} coins", key, expected, cost);
        Ok(Some(vault))
    }

    /// Attempts a rob. `roll` is a uniform draw in `[0, 1)`; the attempt
    /// succeeds when it is below the configured success chance.
    ///
    /// Cooldowns are checked and set in the same transaction as the coin
    /// movement.
    #[instrument(skip(self, settings))]
    pub async fn rob(
        &self,
        robber: &MemberKey,
        target: &MemberKey,
        settings: &EcoSettings,
        roll: f64,
        now: DateTime<Utc>,
    ) -> Result<RobOutcome> {
        if robber == target {
            return Ok(RobOutcome::SelfTarget);
        }

        let txn = self.db.begin().await?;
        let ledger = Ledger::new(&txn);

        let robber_row = ledger.find_or_create_member(robber).await?;
        let own = cooldown_minutes(robber_row.last_rob_at, settings.rob_cooldown_minutes, now);
        if let (true, Some(expires_at)) = (own.is_active, own.expires_at) {
            return Ok(RobOutcome::OnCooldown { expires_at });
        }

        let target_row = ledger.find_or_create_member(target).await?;
        if target_row.wallet_coins <= 0 {
            return Ok(RobOutcome::TargetBroke);
        }

        let protection = cooldown_minutes(
            target_row.last_robbed_at,
            settings.robbed_cooldown_minutes,
            now,
        );
        if let (true, Some(expires_at)) = (protection.is_active, protection.expires_at) {
            return Ok(RobOutcome::TargetProtected { expires_at });
        }

        ledger
            .set_timestamp(robber, MemberTimestamp::LastRobAt, Some(now))
            .await?;
        ledger
            .set_timestamp(target, MemberTimestamp::LastRobbedAt, Some(now))
            .await?;

        let outcome = if roll < settings.rob_success_chance {
            let amount = share(target_row.wallet_coins, settings.rob_steal_percentage);
            if amount > 0 {
                ledger.debit_wallet(target, amount).await?;
                ledger.credit_wallet(robber, amount).await?;
            }
            RobOutcome::Stolen { amount }
        } else {
            let vault = ledger.find_or_create_vault(robber).await?;
            let penalty = share(
                robber_row.wallet_coins + vault.vault_coins,
                ROB_FAILURE_PENALTY,
            );
            if penalty > 0 {
                ledger.drain_vault_then_wallet(robber, penalty).await?;
            }
            RobOutcome::Caught { penalty }
        };

        txn.commit().await?;
        info!("Rob by {:?} on {:?}: {:?}", robber, target, outcome);
        Ok(outcome)
    }
}

/// `floor(amount * ratio)`, ratio clamped to `[0, 1]`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn share(amount: i64, ratio: f64) -> i64 {
    (amount as f64 * ratio.clamp(0.0, 1.0)).floor() as i64
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::{TimeDelta, TimeZone};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_vault_scenario() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        create_test_member(&db, &alice, 100).await?;
        let economy = EconomyService::new(&db);

        let deposit = economy.deposit_to_vault(&alice, Amount::Exact(150)).await?;
        assert_eq!(deposit.moved, 100);
        assert_eq!(balances(&db, &alice).await?, (0, 100));

        let totals = economy.remove_coins_with_vault_fallback(&alice, 50).await?;
        assert_eq!((totals.in_wallet, totals.in_vault), (0, 50));

        let err = economy
            .remove_coins_with_vault_fallback(&alice, 100)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                available: 50,
                required: 100
            }
        ));
        assert_eq!(balances(&db, &alice).await?, (0, 50));
        Ok(())
    }

    #[tokio::test]
    async fn test_fallback_failure_after_partial_drain_rolls_back() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        create_test_member(&db, &alice, 20).await?;
        set_test_vault(&db, &alice, 30, CapacityTier::Tier0).await?;
        let economy = EconomyService::new(&db);

        let totals = economy.remove_coins_with_vault_fallback(&alice, 45).await?;
        assert_eq!((totals.in_wallet, totals.in_vault), (5, 0));

        assert!(economy.remove_coins_with_vault_fallback(&alice, 6).await.is_err());
        assert_eq!(balances(&db, &alice).await?, (5, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_deposit_all_fills_free_capacity() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        create_test_member(&db, &alice, 1_000).await?;
        set_test_vault(&db, &alice, 49_400, CapacityTier::Tier0).await?;
        let economy = EconomyService::new(&db);

        let deposit = economy.deposit_to_vault(&alice, Amount::All).await?;
        assert_eq!(deposit.moved, 600);
        assert_eq!(balances(&db, &alice).await?, (400, 50_000));

        let err = economy.deposit_to_vault(&alice, Amount::All).await.unwrap_err();
        assert!(matches!(err, Error::VaultFull { capacity: 50_000 }));
        assert_eq!(balances(&db, &alice).await?, (400, 50_000));
        Ok(())
    }

    #[tokio::test]
    async fn test_deposit_with_empty_wallet_fails() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        create_test_member(&db, &alice, 0).await?;
        let economy = EconomyService::new(&db);

        let err = economy.deposit_to_vault(&alice, Amount::All).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { available: 0, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_withdraw() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        create_test_member(&db, &alice, 10).await?;
        let economy = EconomyService::new(&db);

        let err = economy.withdraw_from_vault(&alice, Amount::All).await.unwrap_err();
        assert!(matches!(err, Error::EmptyVault));

        set_test_vault(&db, &alice, 70, CapacityTier::Tier0).await?;
        let withdrawal = economy.withdraw_from_vault(&alice, Amount::Exact(500)).await?;
        assert_eq!(withdrawal.moved, 70);
        assert_eq!(balances(&db, &alice).await?, (80, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_wallet_coins_floors_at_zero() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        create_test_member(&db, &alice, 30).await?;
        let economy = EconomyService::new(&db);

        let member = economy.remove_wallet_coins(&alice, 100).await?;
        assert_eq!(member.wallet_coins, 0);

        let member = economy.add_wallet_coins(&alice, 25).await?;
        assert_eq!(member.wallet_coins, 25);
        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_conserves_coins() -> Result<()> {
        let db = setup_test_db().await?;
        let (alice, bob) = (key("alice"), key("bob"));
        create_test_member(&db, &alice, 300).await?;
        create_test_member(&db, &bob, 50).await?;
        let economy = EconomyService::new(&db);

        let (from, to) = economy.transfer(&alice, &bob, 120).await?;
        assert_eq!(from.wallet_coins + to.wallet_coins, 350);
        assert_eq!(to.wallet_coins, 170);

        let err = economy.transfer(&alice, &bob, 1_000).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(balances(&db, &alice).await?.0, 180);
        assert_eq!(balances(&db, &bob).await?.0, 170);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_transfers_cannot_double_spend() -> Result<()> {
        let (db, path) = setup_file_db("double-spend").await?;
        let (alice, bob, carol) = (key("alice"), key("bob"), key("carol"));
        create_test_member(&db, &alice, 100).await?;
        create_test_member(&db, &bob, 0).await?;
        create_test_member(&db, &carol, 0).await?;
        let economy = EconomyService::new(&db);

        let (to_bob, to_carol) = tokio::join!(
            economy.transfer(&alice, &bob, 100),
            economy.transfer(&alice, &carol, 100)
        );
        assert_eq!(
            u8::from(to_bob.is_ok()) + u8::from(to_carol.is_ok()),
            1,
            "{to_bob:?} / {to_carol:?}"
        );

        let total = balances(&db, &alice).await?.0
            + balances(&db, &bob).await?.0
            + balances(&db, &carol).await?.0;
        assert_eq!(balances(&db, &alice).await?.0, 0);
        assert_eq!(total, 100);

        db.close().await?;
        let _ = std::fs::remove_file(path);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_amounts_rejected_before_queries() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let economy = EconomyService::new(&db);
        let alice = key("alice");

        assert!(matches!(
            economy.transfer(&alice, &key("bob"), 0).await,
            Err(Error::InvalidAmount { amount: 0 })
        ));
        assert!(matches!(
            economy.deposit_to_vault(&alice, Amount::Exact(-5)).await,
            Err(Error::InvalidAmount { amount: -5 })
        ));
        assert!(matches!(
            economy.remove_coins_with_vault_fallback(&alice, -1).await,
            Err(Error::InvalidAmount { amount: -1 })
        ));
    }

    #[tokio::test]
    async fn test_tiers_are_monotonic() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        let economy = EconomyService::new(&db);

        let next = economy.get_next_tier(&alice).await?.unwrap();
        assert_eq!(next.tier, CapacityTier::Tier1);
        assert_eq!(next.cost, 12_500);
        assert_eq!(next.capacity, 75_000);

        let mut previous = CapacityTier::Tier0;
        while let Some(vault) = economy.upgrade_tier(&alice).await? {
            assert!(vault.capacity_tier.ordinal() > previous.ordinal());
            previous = vault.capacity_tier;
        }
        assert_eq!(previous, CapacityTier::Tier8);
        assert!(economy.get_next_tier(&alice).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_purchase_tier_charges_then_upgrades() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = key("alice");
        create_test_member(&db, &alice, 10_000).await?;
        set_test_vault(&db, &alice, 5_000, CapacityTier::Tier0).await?;
        let economy = EconomyService::new(&db);

        let vault = economy
            .purchase_tier(&alice, CapacityTier::Tier1, 12_500)
            .await?
            .unwrap();
        assert_eq!(vault.capacity_tier, CapacityTier::Tier1);
        assert_eq!(balances(&db, &alice).await?, (2_500, 0));

        // A stale confirmation for the same tier does nothing
        assert!(
            economy
                .purchase_tier(&alice, CapacityTier::Tier1, 12_500)
                .await?
                .is_none()
        );

        let err = economy
            .purchase_tier(&alice, CapacityTier::Tier2, 25_000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        let vault = economy.get_next_tier(&alice).await?.unwrap();
        assert_eq!(vault.tier, CapacityTier::Tier2);
        assert_eq!(balances(&db, &alice).await?, (2_500, 0));
        Ok(())
    }

    #[test]
    fn test_discounted_cost() {
        let next = NextTier::after(CapacityTier::Tier0).unwrap();
        assert_eq!(next.discounted_cost(0.0), 12_500);
        assert_eq!(next.discounted_cost(0.1), 11_250);
        assert_eq!(next.discounted_cost(2.0), 0);
        assert!(NextTier::after(CapacityTier::Tier8).is_none());
    }

    #[test]
    fn test_upgrade_discount_grows_with_support_age() {
        let since = now() - TimeDelta::days(7);
        assert!(upgrade_discount(None, 0.2, now()).abs() < f64::EPSILON);
        assert!((upgrade_discount(Some(since), 0.2, now()) - 0.1).abs() < 1e-9);
        assert!((upgrade_discount(Some(since), 0.2, now() + TimeDelta::days(30)) - 0.2).abs() < 1e-9);
        assert!(upgrade_discount(Some(now()), 0.2, now()).abs() < f64::EPSILON);

        let next = NextTier::after(CapacityTier::Tier0).unwrap();
        assert_eq!(next.discounted_cost(upgrade_discount(Some(since), 0.2, now())), 11_250);
    }

    #[test]
    fn test_amount_parse() {
        assert_eq!(Amount::parse("ALL"), Some(Amount::All));
        assert_eq!(Amount::parse("1_000"), Some(Amount::Exact(1_000)));
        assert_eq!(Amount::parse("0"), None);
        assert_eq!(Amount::parse("-3"), None);
        assert_eq!(Amount::parse("lots"), None);
    }

    #[tokio::test]
    async fn test_rob_success_moves_share_of_target_wallet() -> Result<()> {
        let db = setup_test_db().await?;
        let (robber, target) = (key("robber"), key("target"));
        create_test_member(&db, &robber, 100).await?;
        create_test_member(&db, &target, 1_005).await?;
        let economy = EconomyService::new(&db);
        let settings = EcoSettings::default();

        let outcome = economy.rob(&robber, &target, &settings, 0.0, now()).await?;
        assert_eq!(outcome, RobOutcome::Stolen { amount: 100 });
        let (robber_wallet, _) = balances(&db, &robber).await?;
        let (target_wallet, _) = balances(&db, &target).await?;
        assert_eq!((robber_wallet, target_wallet), (200, 905));
        assert_eq!(robber_wallet + target_wallet, 1_105);

        let outcome = economy
            .rob(&robber, &key("other"), &settings, 0.0, now())
            .await?;
        assert!(matches!(outcome, RobOutcome::OnCooldown { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_rob_failure_burns_penalty_from_vault_first() -> Result<()> {
        let db = setup_test_db().await?;
        let (robber, target) = (key("robber"), key("target"));
        create_test_member(&db, &robber, 500).await?;
        set_test_vault(&db, &robber, 500, CapacityTier::Tier0).await?;
        create_test_member(&db, &target, 1_000).await?;
        let economy = EconomyService::new(&db);

        let outcome = economy
            .rob(&robber, &target, &EcoSettings::default(), 0.99, now())
            .await?;
        assert_eq!(outcome, RobOutcome::Caught { penalty: 20 });
        assert_eq!(balances(&db, &robber).await?, (500, 480));
        assert_eq!(balances(&db, &target).await?.0, 1_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_rob_guards() -> Result<()> {
        let db = setup_test_db().await?;
        let (robber, target) = (key("robber"), key("target"));
        create_test_member(&db, &robber, 100).await?;
        create_test_member(&db, &target, 0).await?;
        let economy = EconomyService::new(&db);
        let settings = EcoSettings::default();

        assert_eq!(
            economy.rob(&robber, &robber, &settings, 0.0, now()).await?,
            RobOutcome::SelfTarget
        );
        assert_eq!(
            economy.rob(&robber, &target, &settings, 0.0, now()).await?,
            RobOutcome::TargetBroke
        );

        // A broke target does not consume the robber cooldown
        economy.add_wallet_coins(&target, 50).await?;
        Ledger::new(&db)
            .set_timestamp(
                &target,
                MemberTimestamp::LastRobbedAt,
                Some(now() - TimeDelta::minutes(10)),
            )
            .await?;
        let outcome = economy.rob(&robber, &target, &settings, 0.0, now()).await?;
        assert_eq!(
            outcome,
            RobOutcome::TargetProtected {
                expires_at: now() + TimeDelta::minutes(110)
            }
        );
        assert_eq!(balances(&db, &target).await?.0, 50);
        Ok(())
    }
}
