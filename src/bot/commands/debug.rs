//! Developer commands: user flags, voice session inspection and module resets.

use super::{parse_user, usage};
use crate::{
    bot::{
        events::voice::{credit_voice_quest, guild_presences},
        respond::{CommandContext, Reply, colors},
    },
    core::{
        modules::reset_settings,
        users::{UserFlag, grant_flag, revoke_flag, user_flags},
    },
    entities::ModuleName,
    errors::{Error, Result},
};
use chrono::Utc;
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use tracing::info;

fn flag_target(cmd: &CommandContext<'_>, args: &[String], text: &str) -> Result<(UserFlag, serenity::UserId)> {
    let raw = args.first().ok_or_else(|| usage(text))?;
    let flag = UserFlag::parse(raw).ok_or_else(|| Error::Command {
        message: format!(
            "Unknown flag `{raw}`. Flags: {}",
            UserFlag::ALL.map(UserFlag::as_str).join(", ")
        ),
    })?;
    let user = match args.get(1) {
        Some(raw) => parse_user(raw).ok_or_else(|| usage(text))?,
        None => cmd.author.id,
    };
    Ok((flag, user))
}

async fn set_flag(cmd: &CommandContext<'_>, args: &[String], grant: bool) -> Result<()> {
    let text = if grant {
        "authority grant <flag> [user]"
    } else {
        "authority revoke <flag> [user]"
    };
    let (flag, user) = flag_target(cmd, args, text)?;
    let db = &*cmd.data.database;
    let user_key = user.to_string();

    let changed = if grant {
        grant_flag(db, &user_key, flag).await?
    } else {
        revoke_flag(db, &user_key, flag).await?
    };
    let flags = user_flags(db, &user_key).await?.names();
    let summary = if flags.is_empty() {
        "none".to_string()
    } else {
        flags.join(", ")
    };

    let reply = if changed {
        Reply::embed(
            serenity::CreateEmbed::default()
                .description(format!(
                    "{} `{}` {} <@{user}>.\nFlags: {summary}",
                    if grant { "Granted" } else { "Revoked" },
                    flag.as_str(),
                    if grant { "to" } else { "from" },
                ))
                .color(colors::GREEN),
        )
    } else {
        Reply::denial(format!("Nothing changed. Flags of <@{user}>: {summary}"))
    };
    cmd.say(reply).await
}

pub fn authority_grant<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(set_flag(cmd, args, true))
}

pub fn authority_revoke<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(set_flag(cmd, args, false))
}

pub fn sessions_view<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let guild_id = cmd.guild()?.to_string();
        let sessions = cmd.data.sessions.guild_sessions(&guild_id).await;
        let now = Utc::now();

        let description = if sessions.is_empty() {
            "No tracked voice sessions.".to_string()
        } else {
            sessions
                .iter()
                .map(|(user_id, session)| {
                    let flags = session.flags;
                    let mut marks = Vec::new();
                    if flags.is_private {
                        marks.push("private");
                    }
                    if flags.is_deaf {
                        marks.push("deaf");
                    } else if flags.is_muted {
                        marks.push("muted");
                    }
                    if flags.is_streaming {
                        marks.push("streaming");
                    }
                    if flags.has_camera {
                        marks.push("camera");
                    }
                    format!(
                        "<@{user_id}> in <#{}>, {} min unflushed [{}]",
                        session.channel_id,
                        (now - session.started_at).num_minutes(),
                        marks.join(", ")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        cmd.say(Reply::embed(
            serenity::CreateEmbed::default()
                .title(format!("Voice sessions ({})", sessions.len()))
                .description(description)
                .color(colors::BLUE),
        ))
        .await
    })
}

pub fn sessions_sync<'a>(cmd: &'a CommandContext<'_>, _args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let guild_id = cmd.guild()?;
        let present = cmd
            .serenity
            .cache
            .guild(guild_id)
            .map(|guild| guild_presences(&guild))
            .ok_or_else(|| Error::Command {
                message: "This server is not in the cache yet".to_string(),
            })?;

        let report = cmd
            .data
            .sessions
            .sync(&*cmd.data.database, &guild_id.to_string(), present)
            .await?;
        for flushed in &report.flushed {
            credit_voice_quest(cmd.data, flushed).await?;
        }
        info!(
            "Voice sync in guild {}: {} started, {} updated, {} stopped",
            guild_id, report.started, report.updated, report.stopped
        );

        cmd.say(Reply::embed(
            serenity::CreateEmbed::default()
                .title("Voice sessions synced")
                .description(format!(
                    "Started: {}\nUpdated: {}\nStopped: {}\nMinutes committed: {}",
                    report.started,
                    report.updated,
                    report.stopped,
                    report.flushed.iter().map(|f| f.minutes).sum::<i64>()
                ))
                .color(colors::GREEN),
        ))
        .await
    })
}

pub fn module_reset<'a>(cmd: &'a CommandContext<'_>, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        const USAGE: &str = "debug module reset <module>";
        let guild_id = cmd.guild()?.to_string();
        let module = args
            .first()
            .and_then(|raw| ModuleName::parse(raw))
            .ok_or_else(|| usage(USAGE))?;

        reset_settings(
            &*cmd.data.database,
            &guild_id,
            module,
            &cmd.data.module_defaults,
        )
        .await?;
        info!(
            "Settings of module {} reset in guild {} by {}",
            module.as_str(),
            guild_id,
            cmd.author.id
        );
        cmd.say(Reply::embed(
            serenity::CreateEmbed::default()
                .description(format!("Settings of `{}` are back to defaults.", module.as_str()))
                .color(colors::GREEN),
        ))
        .await
    })
}
