//! Economy commands - work, presence, rob, vault movements and upgrades.

use super::{parse_user, usage};
use crate::{
    bot::respond::{CommandContext, Reply, colors},
    core::{
        cooldown::format_time_left,
        economy::{Amount, NextTier, RobOutcome, capacity, upgrade_discount},
        ledger::{Ledger, MemberKey},
        modules::{EcoSettings, module_settings},
        work::{
            PresenceOutcome, STREAK_STEP, WorkBonus, WorkOutcome, attend, streak_day,
            work as work_shift,
        },
    },
    entities::ModuleName,
    errors::Result,
};
use chrono::Utc;
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::time::Duration;
use tracing::{debug, info};

/// How long the upgrade offer waits for a click.
const UPGRADE_TIMEOUT: Duration = Duration::from_secs(60);

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, respond::CommandContext},
        core::economy::Amount,
        errors::Result,
    };
    use poise::serenity_prelude as serenity;

    /// Works a shift for coins.
    #[poise::command(slash_command, guild_only)]
    pub async fn work(ctx: Context<'_>) -> Result<()> {
        super::run_work(&CommandContext::slash(ctx)).await
    }

    /// Claims the daily presence reward and grows your streak.
    #[poise::command(slash_command, guild_only)]
    pub async fn presence(ctx: Context<'_>) -> Result<()> {
        super::run_presence(&CommandContext::slash(ctx)).await
    }

    /// Tries to steal coins from another member's wallet.
    #[poise::command(slash_command, guild_only)]
    pub async fn rob(
        ctx: Context<'_>,
        #[description = "Member to rob"] target: serenity::User,
    ) -> Result<()> {
        super::run_rob(&CommandContext::slash(ctx), target.id).await
    }

    /// Moves coins from your wallet into your vault.
    #[poise::command(slash_command, guild_only)]
    pub async fn deposit(
        ctx: Context<'_>,
        #[description = "Coins to deposit, or `all`"] amount: String,
    ) -> Result<()> {
        let cmd = CommandContext::slash(ctx);
        let amount = Amount::parse(&amount).ok_or_else(|| super::usage("/deposit <amount|all>"))?;
        super::run_deposit(&cmd, amount).await
    }

    /// Moves coins from your vault into your wallet.
    #[poise::command(slash_command, guild_only)]
    pub async fn withdraw(
        ctx: Context<'_>,
        #[description = "Coins to withdraw, or `all`"] amount: String,
    ) -> Result<()> {
        let cmd = CommandContext::slash(ctx);
        let amount = Amount::parse(&amount).ok_or_else(|| super::usage("/withdraw <amount|all>"))?;
        super::run_withdraw(&cmd, amount).await
    }

    /// Shows wallet and vault balances.
    #[poise::command(slash_command, guild_only)]
    pub async fn currencies(
        ctx: Context<'_>,
        #[description = "Member to look at"] member: Option<serenity::User>,
    ) -> Result<()> {
        let cmd = CommandContext::slash(ctx);
        let user_id = member.map_or(cmd.author.id, |user| user.id);
        super::run_currencies(&cmd, user_id).await
    }

    /// Buys the next vault tier.
    #[poise::command(slash_command, guild_only)]
    pub async fn upgrade(ctx: Context<'_>) -> Result<()> {
        super::run_upgrade(&CommandContext::slash(ctx)).await
    }
}

pub use inner::*;

async fn eco_settings(cmd: &CommandContext<'_>, guild_id: &str) -> Result<EcoSettings> {
    module_settings(
        &*cmd.data.database,
        guild_id,
        ModuleName::Eco,
        cmd.data.module_defaults.eco.clone(),
    )
    .await
}

async fn run_work(cmd: &CommandContext<'_>) -> Result<()> {
    let key = cmd.author_key()?;
    let settings = eco_settings(cmd, &key.guild_id).await?;
    let now = Utc::now();
    let mut rng = StdRng::from_os_rng();

    let reply = match work_shift(&*cmd.data.database, &key, &settings, now, &mut rng).await? {
        WorkOutcome::OnCooldown { expires_at } => Reply::denial(format!(
            "You are still tired from your last shift. Come back in {}.",
            format_time_left(expires_at, now)
        )),
        WorkOutcome::Paid(pay) => {
            let mut description = format!("You worked a shift and earned **{}** coins.", pay.base);
            match pay.bonus {
                Some(WorkBonus::Jackpot(amount)) => {
                    description.push_str(&format!("\nJackpot! Your boss added **{amount}** coins."));
                }
                Some(WorkBonus::Tip(amount)) => {
                    description.push_str(&format!("\nA customer tipped you **{amount}** coins."));
                }
                None => {}
            }
            Reply::embed(
                serenity::CreateEmbed::default()
                    .title("Work")
                    .description(description)
                    .footer(serenity::CreateEmbedFooter::new(format!(
                        "Total: {} coins",
                        pay.total()
                    )))
                    .color(colors::GREEN),
            )
        }
    };
    cmd.say(reply).await
}

async fn run_presence(cmd: &CommandContext<'_>) -> Result<()> {
    let key = cmd.author_key()?;
    let now = Utc::now();
    let mut rng = StdRng::from_os_rng();

    let reply = match attend(&*cmd.data.database, &key, now, &mut rng).await? {
        PresenceOutcome::AlreadyClaimed { streak, resets_at } => Reply::denial(format!(
            "You already checked in today (streak {streak}). Next check-in in {}.",
            format_time_left(resets_at, now)
        )),
        PresenceOutcome::Claimed {
            streak,
            base,
            bonus,
        } => {
            let mut description = format!("You checked in and received **{base}** coins.");
            if bonus > 0 {
                description.push_str(&format!("\nStreak bonus: **{bonus}** coins!"));
            }
            Reply::embed(
                serenity::CreateEmbed::default()
                    .title("Presence")
                    .description(description)
                    .footer(serenity::CreateEmbedFooter::new(format!(
                        "Streak: {streak} days ({}/{STREAK_STEP} to the next bonus)",
                        streak_day(streak)
                    )))
                    .color(colors::GREEN),
            )
        }
    };
    cmd.say(reply).await
}

async fn run_rob(cmd: &CommandContext<'_>, target: serenity::UserId) -> Result<()> {
    let robber = cmd.author_key()?;
    let target_key = MemberKey::new(target.to_string(), robber.guild_id.clone());
    let settings = eco_settings(cmd, &robber.guild_id).await?;
    let now = Utc::now();
    let roll: f64 = StdRng::from_os_rng().random();

    let outcome = cmd
        .data
        .economy()
        .rob(&robber, &target_key, &settings, roll, now)
        .await?;
    debug!("Rob by {:?} on {:?}: {:?}", robber, target_key, outcome);

    let reply = match outcome {
        RobOutcome::SelfTarget => Reply::denial("You can't rob yourself."),
        RobOutcome::OnCooldown { expires_at } => Reply::denial(format!(
            "You need to lay low for {} before robbing again.",
            format_time_left(expires_at, now)
        )),
        RobOutcome::TargetBroke => Reply::denial(format!("<@{target}> has nothing in their wallet.")),
        RobOutcome::TargetProtected { expires_at } => Reply::denial(format!(
            "<@{target}> was robbed recently and is on guard for {}.",
            format_time_left(expires_at, now)
        )),
        RobOutcome::Stolen { amount } => Reply::embed(
            serenity::CreateEmbed::default()
                .title("Robbery")
                .description(format!("You stole **{amount}** coins from <@{target}>."))
                .color(colors::GREEN),
        ),
        RobOutcome::Caught { penalty } => Reply::embed(
            serenity::CreateEmbed::default()
                .title("Robbery")
                .description(format!("You got caught and paid a fine of **{penalty}** coins."))
                .color(colors::RED),
        ),
    };
    cmd.say(reply).await
}

fn vault_line(vault_coins: i64, tier: crate::entities::CapacityTier) -> String {
    format!("{vault_coins}/{} coins", capacity(tier))
}

async fn run_deposit(cmd: &CommandContext<'_>, amount: Amount) -> Result<()> {
    let key = cmd.author_key()?;
    let transfer = cmd.data.economy().deposit_to_vault(&key, amount).await?;
    cmd.say(Reply::embed(
        serenity::CreateEmbed::default()
            .description(format!(
                "Deposited **{}** coins.\nWallet: {} coins\nVault: {}",
                transfer.moved,
                transfer.member.wallet_coins,
                vault_line(transfer.vault.vault_coins, transfer.vault.capacity_tier)
            ))
            .color(colors::GREEN),
    ))
    .await
}

async fn run_withdraw(cmd: &CommandContext<'_>, amount: Amount) -> Result<()> {
    let key = cmd.author_key()?;
    let transfer = cmd.data.economy().withdraw_from_vault(&key, amount).await?;
    cmd.say(Reply::embed(
        serenity::CreateEmbed::default()
            .description(format!(
                "Withdrew **{}** coins.\nWallet: {} coins\nVault: {}",
                transfer.moved,
                transfer.member.wallet_coins,
                vault_line(transfer.vault.vault_coins, transfer.vault.capacity_tier)
            ))
            .color(colors::GREEN),
    ))
    .await
}

async fn run_currencies(cmd: &CommandContext<'_>, user_id: serenity::UserId) -> Result<()> {
    let guild_id = cmd.guild()?.to_string();
    let key = MemberKey::new(user_id.to_string(), guild_id);
    let totals = cmd.data.economy().get_total_coins(&key).await?;
    let next = cmd.data.economy().get_next_tier(&key).await?;

    let mut embed = serenity::CreateEmbed::default()
        .title("Currencies")
        .description(format!("<@{user_id}>"))
        .field("Wallet", totals.in_wallet.to_string(), true)
        .field("Vault", totals.in_vault.to_string(), true)
        .field("Total", totals.total.to_string(), true)
        .color(colors::GOLD);
    if let Some(next) = next {
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "Next vault tier holds {} coins for {} coins",
            next.capacity, next.cost
        )));
    }
    cmd.say(Reply::embed(embed)).await
}

fn upgrade_buttons(confirm_id: &str, cancel_id: &str) -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(confirm_id)
            .label("Upgrade")
            .style(serenity::ButtonStyle::Success),
        serenity::CreateButton::new(cancel_id)
            .label("Cancel")
            .style(serenity::ButtonStyle::Secondary),
    ])]
}

fn upgrade_result(text: impl Into<String>, color: u32) -> Reply {
    Reply::embed(
        serenity::CreateEmbed::default()
            .title("Vault upgrade")
            .description(text.into())
            .color(color),
    )
}

async fn run_upgrade(cmd: &CommandContext<'_>) -> Result<()> {
    let key = cmd.author_key()?;
    let Some(next) = cmd.data.economy().get_next_tier(&key).await? else {
        return cmd
            .say(Reply::denial("Your vault is already at the highest tier."))
            .await;
    };

    let settings = eco_settings(cmd, &key.guild_id).await?;
    let member = Ledger::new(&*cmd.data.database).find_or_create_member(&key).await?;
    let discount = upgrade_discount(member.supporter_since, settings.tag_upgrade_discount, Utc::now());
    let cost = next.discounted_cost(discount);

    let nonce: u64 = StdRng::from_os_rng().random();
    let confirm_id = format!("upgrade_confirm:{}:{nonce}", cmd.author.id);
    let cancel_id = format!("upgrade_cancel:{}:{nonce}", cmd.author.id);

    let mut offer = format!(
        "Upgrade your vault to hold **{}** coins for **{cost}** coins?",
        next.capacity
    );
    if cost < next.cost {
        offer.push_str(&format!("\nSupporter discount applied (was {}).", next.cost));
    }
    let mut message = cmd
        .send(
            upgrade_result(offer, colors::BLUE).components(upgrade_buttons(&confirm_id, &cancel_id)),
        )
        .await?;

    let interaction = message
        .await_component_interaction(cmd.serenity)
        .author_id(cmd.author.id)
        .timeout(UPGRADE_TIMEOUT)
        .await;

    let Some(interaction) = interaction else {
        let expired = serenity::EditMessage::new()
            .embed(
                serenity::CreateEmbed::default()
                    .title("Vault upgrade")
                    .description("The offer expired. Nothing was charged.")
                    .color(colors::RED),
            )
            .components(Vec::new());
        message.edit(&cmd.serenity.http, expired).await?;
        return Ok(());
    };

    let reply = if interaction.data.custom_id == confirm_id {
        purchase(cmd, &key, next, cost).await?
    } else {
        upgrade_result("Upgrade cancelled.", colors::RED)
    };
    interaction
        .create_response(&cmd.serenity.http, reply.into_update())
        .await?;
    Ok(())
}

async fn purchase(cmd: &CommandContext<'_>, key: &MemberKey, next: NextTier, cost: i64) -> Result<Reply> {
    match cmd.data.economy().purchase_tier(key, next.tier, cost).await {
        Ok(Some(vault)) => {
            info!("{:?} bought vault tier {:?}", key, vault.capacity_tier);
            Ok(upgrade_result(
                format!(
                    "Your vault now holds up to **{}** coins.",
                    capacity(vault.capacity_tier)
                ),
                colors::GREEN,
            ))
        }
        Ok(None) => Ok(upgrade_result(
            "Your vault changed in the meantime. Nothing was charged.",
            colors::RED,
        )),
        Err(error) => match super::denial_text(&error) {
            Some(text) => Ok(upgrade_result(text, colors::RED)),
            None => Err(error),
        },
    }
}

fn parse_amount(args: &[String], text: &str) -> Result<Amount> {
    args.first()
        .and_then(|raw| Amount::parse(raw))
        .ok_or_else(|| usage(text))
}

pub fn work_message<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_work(cmd))
}

pub fn presence_message<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_presence(cmd))
}

pub fn rob_message<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let target = args
            .first()
            .and_then(|raw| parse_user(raw))
            .ok_or_else(|| usage("rob <member>"))?;
        run_rob(cmd, target).await
    })
}

pub fn deposit_message<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let amount = parse_amount(args, "deposit <amount|all>")?;
        run_deposit(cmd, amount).await
    })
}

pub fn withdraw_message<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let amount = parse_amount(args, "withdraw <amount|all>")?;
        run_withdraw(cmd, amount).await
    })
}

pub fn currencies_message<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let user_id = args
            .first()
            .and_then(|raw| parse_user(raw))
            .unwrap_or(cmd.author.id);
        run_currencies(cmd, user_id).await
    })
}

pub fn upgrade_message<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_upgrade(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_requires_a_value() {
        assert_eq!(parse_amount(&["all".to_string()], "x").ok(), Some(Amount::All));
        assert_eq!(
            parse_amount(&["1,500".to_string()], "x").ok(),
            Some(Amount::Exact(1500))
        );
        assert!(parse_amount(&[], "deposit <amount|all>").is_err());
        assert!(parse_amount(&["-5".to_string()], "x").is_err());
    }

    #[test]
    fn test_vault_line_shows_capacity() {
        assert_eq!(
            vault_line(100, crate::entities::CapacityTier::Tier0),
            "100/50000 coins"
        );
    }
}
