//! Member commands - stats, level and the daily quest.

use super::parse_user;
use crate::{
    bot::{
        events::voice::credit_voice_quest,
        levels::celebrate,
        respond::{CommandContext, Reply, colors},
    },
    core::{
        cooldown::format_time_left,
        guild::{find_or_create_guild, guild_day_end, guild_timezone},
        ledger::{Ledger, MemberKey},
        leveling::xp_progress,
        modules::{LevelSettings, module_settings},
        quest::{ClaimOutcome, QuestObjective, claim_rewards, is_complete, objectives, quest_rewards, sync_daily_quest},
    },
    entities::{ModuleName, member_daily_quest},
    errors::Result,
};
use chrono::Utc;
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use rand::{SeedableRng, rngs::StdRng};

const BAR_WIDTH: i64 = 12;

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, respond::CommandContext},
        errors::Result,
    };
    use poise::serenity_prelude as serenity;

    /// Shows message, voice and streak statistics.
    #[poise::command(slash_command, guild_only)]
    pub async fn stats(
        ctx: Context<'_>,
        #[description = "Member to look at"] member: Option<serenity::User>,
    ) -> Result<()> {
        let cmd = CommandContext::slash(ctx);
        let user_id = member.map_or(cmd.author.id, |user| user.id);
        super::run_stats(&cmd, user_id).await
    }

    /// Shows level and XP progress.
    #[poise::command(slash_command, guild_only)]
    pub async fn level(
        ctx: Context<'_>,
        #[description = "Member to look at"] member: Option<serenity::User>,
    ) -> Result<()> {
        let cmd = CommandContext::slash(ctx);
        let user_id = member.map_or(cmd.author.id, |user| user.id);
        super::run_level(&cmd, user_id).await
    }

    /// Daily quest commands.
    #[poise::command(
        slash_command,
        guild_only,
        subcommands("quest_view", "quest_claim"),
        subcommand_required
    )]
    pub async fn quest(_ctx: Context<'_>) -> Result<()> {
        Ok(())
    }

    /// Shows today's quest and its progress.
    #[poise::command(slash_command, guild_only, rename = "view")]
    pub async fn quest_view(ctx: Context<'_>) -> Result<()> {
        super::run_quest(&CommandContext::slash(ctx)).await
    }

    /// Claims the rewards of a finished quest.
    #[poise::command(slash_command, guild_only, rename = "claim")]
    pub async fn quest_claim(ctx: Context<'_>) -> Result<()> {
        super::run_quest_claim(&CommandContext::slash(ctx)).await
    }
}

pub use inner::*;

async fn run_stats(cmd: &CommandContext<'_>, user_id: serenity::UserId) -> Result<()> {
    let key = MemberKey::new(user_id.to_string(), cmd.guild()?.to_string());
    let db = &*cmd.data.database;

    if let Some(flushed) = cmd.data.sessions.flush(db, &key.user_id).await? {
        credit_voice_quest(cmd.data, &flushed).await?;
    }
    let member = Ledger::new(db).find_or_create_member(&key).await?;

    let voice = format!(
        "Active: {} min\nMuted: {} min\nDeafened: {} min\nPublic: {} min\nPrivate: {} min\nStreaming: {} min\nCamera: {} min",
        member.call_active_minutes,
        member.call_muted_minutes,
        member.call_deaf_minutes,
        member.call_public_minutes,
        member.call_private_minutes,
        member.call_streaming_minutes,
        member.call_camera_minutes,
    );
    let embed = serenity::CreateEmbed::default()
        .title("Stats")
        .description(format!("<@{user_id}>"))
        .field("Messages", member.message_count.to_string(), true)
        .field("Level", xp_progress(member.activity_xp).level.to_string(), true)
        .field("Presence streak", format!("{} days", member.daily_streak), true)
        .field("Voice", voice, false)
        .color(colors::BLUE);
    cmd.say(Reply::embed(embed)).await
}

/// `[#####-------]` style bar.
fn progress_bar(progress: i64, total: i64) -> String {
    let filled = if total <= 0 {
        BAR_WIDTH
    } else {
        (progress.clamp(0, total) * BAR_WIDTH) / total
    };
    let filled = usize::try_from(filled).unwrap_or_default();
    let empty = usize::try_from(BAR_WIDTH).unwrap_or_default().saturating_sub(filled);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(empty))
}

async fn run_level(cmd: &CommandContext<'_>, user_id: serenity::UserId) -> Result<()> {
    let key = MemberKey::new(user_id.to_string(), cmd.guild()?.to_string());
    let member = Ledger::new(&*cmd.data.database).find_or_create_member(&key).await?;
    let progress = xp_progress(member.activity_xp);

    let embed = serenity::CreateEmbed::default()
        .title(format!("Level {}", progress.level))
        .description(format!(
            "<@{user_id}>\n{} {}/{} XP",
            progress_bar(progress.progress, progress.needed),
            progress.progress,
            progress.needed
        ))
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Total XP: {}",
            member.activity_xp
        )))
        .color(colors::GOLD);
    cmd.say(Reply::embed(embed)).await
}

fn objective_line(label: &str, objective: &QuestObjective, progress: i64) -> String {
    format!(
        "**{label}** ({:?}): {} {progress}/{}",
        objective.rarity,
        progress_bar(progress, objective.target),
        objective.target
    )
}

fn quest_embed(quest: &member_daily_quest::Model, resets_in: &str) -> serenity::CreateEmbed {
    let found = objectives(quest);
    let mut lines = Vec::new();
    if let Some(voice) = &found.voice {
        lines.push(objective_line("Voice minutes", voice, quest.voice_minutes_progress));
    }
    if let Some(messages) = &found.messages {
        lines.push(objective_line("Messages sent", messages, quest.messages_sent_progress));
    }

    let (coins, xp) = quest_rewards(quest);
    let status = if quest.is_claimed {
        "Claimed".to_string()
    } else if is_complete(quest) {
        "Complete, use `quest claim` to collect it".to_string()
    } else {
        "In progress".to_string()
    };
    serenity::CreateEmbed::default()
        .title("Daily quest")
        .description(lines.join("\n"))
        .field("Rewards", format!("{coins} coins, {xp} XP"), true)
        .field("Status", status, true)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "New quest in {resets_in}"
        )))
        .color(colors::BLUE)
}

async fn run_quest(cmd: &CommandContext<'_>) -> Result<()> {
    let key = cmd.author_key()?;
    let db = &*cmd.data.database;
    let now = Utc::now();
    let tz = guild_timezone(&find_or_create_guild(db, &key.guild_id).await?);

    let quest = {
        let mut rng = StdRng::from_os_rng();
        sync_daily_quest(db, &key, tz, now, &mut rng).await?
    };
    let resets_at = guild_day_end(now, tz);
    cmd.say(Reply::embed(quest_embed(
        &quest,
        &format_time_left(resets_at, now),
    )))
    .await
}

async fn run_quest_claim(cmd: &CommandContext<'_>) -> Result<()> {
    let key = cmd.author_key()?;
    let db = &*cmd.data.database;
    let settings: LevelSettings = module_settings(
        db,
        &key.guild_id,
        ModuleName::Level,
        cmd.data.module_defaults.level.clone(),
    )
    .await?;

    let (outcome, change) = {
        let mut rng = StdRng::from_os_rng();
        claim_rewards(db, &key, settings.max_level, Utc::now(), &mut rng).await?
    };
    let reply = match outcome {
        ClaimOutcome::NoQuest => Reply::denial("You have no quest yet. Use `quest view` first."),
        ClaimOutcome::AlreadyClaimed => Reply::denial("You already claimed today's quest."),
        ClaimOutcome::Incomplete => Reply::denial("Your quest isn't finished yet."),
        ClaimOutcome::Claimed { coins, xp } => Reply::embed(
            serenity::CreateEmbed::default()
                .title("Quest complete")
                .description(format!("You received **{coins}** coins and **{xp}** XP."))
                .color(colors::GREEN),
        ),
    };
    cmd.say(reply).await?;

    if let Some(change) = change {
        celebrate(cmd.serenity, cmd.data, &key, &change, Some(cmd.channel_id)).await?;
    }
    Ok(())
}

pub fn stats_message<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let user_id = args
            .first()
            .and_then(|raw| parse_user(raw))
            .unwrap_or(cmd.author.id);
        run_stats(cmd, user_id).await
    })
}

pub fn level_message<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let user_id = args
            .first()
            .and_then(|raw| parse_user(raw))
            .unwrap_or(cmd.author.id);
        run_level(cmd, user_id).await
    })
}

pub fn quest_message<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_quest(cmd))
}

pub fn quest_claim_message<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_quest_claim(cmd))
}
