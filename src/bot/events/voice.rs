//! Voice presence tracking fed from gateway events.

use crate::{
    bot::{BotData, GatewayEvent},
    core::{
        activity::reward_voice_minutes,
        voice::{Flushed, VoiceFlags, VoicePresence},
    },
    errors::Result,
};
use chrono::Utc;
use futures::future::BoxFuture;
use poise::serenity_prelude as serenity;
use rand::{SeedableRng, rngs::StdRng};
use std::collections::HashMap;
use tracing::{debug, info};

/// Permissions @everyone needs on a channel for it to count as public.
const PUBLIC_PERMISSIONS: serenity::Permissions =
    serenity::Permissions::VIEW_CHANNEL.union(serenity::Permissions::CONNECT);

/// Whether @everyone is denied viewing or joining a channel.
///
/// `base` holds the guild-wide permissions of @everyone, whose role id is
/// the guild id.
#[must_use]
pub fn is_private_channel(
    guild_id: serenity::GuildId,
    base: serenity::Permissions,
    overwrites: &[serenity::PermissionOverwrite],
) -> bool {
    let everyone = serenity::RoleId::new(guild_id.get());
    let effective = overwrites
        .iter()
        .filter(|overwrite| overwrite.kind == serenity::PermissionOverwriteType::Role(everyone))
        .fold(base, |permissions, overwrite| {
            (permissions - overwrite.deny) | overwrite.allow
        });
    !effective.contains(PUBLIC_PERMISSIONS)
}

fn everyone_permissions(guild: &serenity::Guild) -> serenity::Permissions {
    guild
        .roles
        .get(&serenity::RoleId::new(guild.id.get()))
        .map_or(serenity::Permissions::empty(), |role| role.permissions)
}

fn channel_privacy(guild: &serenity::Guild, channel_id: serenity::ChannelId) -> bool {
    guild.channels.get(&channel_id).is_some_and(|channel| {
        is_private_channel(guild.id, everyone_permissions(guild), &channel.permission_overwrites)
    })
}

fn flags_of(state: &serenity::VoiceState, is_private: bool) -> VoiceFlags {
    VoiceFlags {
        is_private,
        is_muted: state.self_mute || state.mute,
        is_deaf: state.self_deaf || state.deaf,
        is_streaming: state.self_stream.unwrap_or(false),
        has_camera: state.self_video,
    }
}

/// Presence described by a voice state, `None` when not in a channel.
fn presence_of(
    guild_id: serenity::GuildId,
    state: &serenity::VoiceState,
    is_private: bool,
) -> Option<VoicePresence> {
    let channel_id = state.channel_id?;
    Some(VoicePresence {
        guild_id: guild_id.to_string(),
        channel_id: channel_id.to_string(),
        flags: flags_of(state, is_private),
    })
}

/// Every member currently in a voice channel of `guild`, keyed by user id.
#[must_use]
pub fn guild_presences(guild: &serenity::Guild) -> HashMap<String, VoicePresence> {
    guild
        .voice_states
        .values()
        .filter(|state| !state.member.as_ref().is_some_and(|member| member.user.bot))
        .filter_map(|state| {
            let is_private = state
                .channel_id
                .is_some_and(|channel_id| channel_privacy(guild, channel_id));
            presence_of(guild.id, state, is_private)
                .map(|presence| (state.user_id.to_string(), presence))
        })
        .collect()
}

/// Counts flushed minutes towards the member's daily quest.
pub async fn credit_voice_quest(data: &BotData, flushed: &Flushed) -> Result<()> {
    let mut rng = StdRng::from_os_rng();
    let moved = reward_voice_minutes(
        &*data.database,
        &flushed.key,
        flushed.minutes,
        Utc::now(),
        &mut rng,
    )
    .await?;
    if let Some((_, true)) = moved {
        info!("{:?} completed the daily quest in voice", flushed.key);
    }
    Ok(())
}

/// Starts, updates or stops the session of a member whose voice state changed.
pub fn on_voice_state_update<'a>(data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let serenity::FullEvent::VoiceStateUpdate { new, .. } = &event.event else {
            return Ok(());
        };
        let Some(guild_id) = new.guild_id else {
            return Ok(());
        };
        if new.member.as_ref().is_some_and(|member| member.user.bot) {
            return Ok(());
        }

        let is_private = match new.channel_id {
            Some(channel_id) => event
                .ctx
                .cache
                .guild(guild_id)
                .is_some_and(|guild| channel_privacy(&guild, channel_id)),
            None => false,
        };
        let user_id = new.user_id.to_string();
        let db = &*data.database;

        let flushed = match presence_of(guild_id, new, is_private) {
            None => data.sessions.stop(db, &user_id).await?,
            Some(presence) => {
                if data.sessions.session(&user_id).await.is_none() {
                    data.sessions.start(&user_id, presence).await;
                    None
                } else {
                    data.sessions.update(db, &user_id, presence).await?
                }
            }
        };
        if let Some(flushed) = flushed {
            credit_voice_quest(data, &flushed).await?;
        }
        Ok(())
    })
}

/// Refreshes the privacy flag of sessions in a voice channel whose
/// permissions changed.
pub fn on_channel_update<'a>(data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let serenity::FullEvent::ChannelUpdate { new, .. } = &event.event else {
            return Ok(());
        };
        if !matches!(
            new.kind,
            serenity::ChannelType::Voice | serenity::ChannelType::Stage
        ) {
            return Ok(());
        }

        let base = event
            .ctx
            .cache
            .guild(new.guild_id)
            .map_or(serenity::Permissions::empty(), |guild| everyone_permissions(&guild));
        let is_private = is_private_channel(new.guild_id, base, &new.permission_overwrites);
        let changed = data
            .sessions
            .set_channel_privacy(&new.id.to_string(), is_private)
            .await;
        debug!(
            "Channel {} is now private={}, {} session(s) updated",
            new.id, is_private, changed
        );
        Ok(())
    })
}

/// Reconciles sessions with the voice states a guild reports on connect.
pub fn on_guild_create<'a>(data: &'a BotData, event: &'a GatewayEvent) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let serenity::FullEvent::GuildCreate { guild, .. } = &event.event else {
            return Ok(());
        };
        let present = guild_presences(guild);
        let report = data
            .sessions
            .sync(&*data.database, &guild.id.to_string(), present)
            .await?;
        for flushed in &report.flushed {
            credit_voice_quest(data, flushed).await?;
        }
        info!(
            "Guild {} voice sessions: {} started, {} updated, {} stopped",
            guild.id, report.started, report.updated, report.stopped
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::{Permissions, PermissionOverwrite, PermissionOverwriteType, RoleId};

    const GUILD: serenity::GuildId = serenity::GuildId::new(42);

    fn everyone(allow: Permissions, deny: Permissions) -> PermissionOverwrite {
        PermissionOverwrite {
            allow,
            deny,
            kind: PermissionOverwriteType::Role(RoleId::new(42)),
        }
    }

    #[test]
    fn test_public_channel() {
        let base = Permissions::VIEW_CHANNEL | Permissions::CONNECT | Permissions::SPEAK;
        assert!(!is_private_channel(GUILD, base, &[]));
    }

    #[test]
    fn test_everyone_denied_is_private() {
        let base = Permissions::VIEW_CHANNEL | Permissions::CONNECT;
        let hidden = everyone(Permissions::empty(), Permissions::VIEW_CHANNEL);
        assert!(is_private_channel(GUILD, base, &[hidden]));

        let locked = everyone(Permissions::empty(), Permissions::CONNECT);
        assert!(is_private_channel(GUILD, base, &[locked]));
    }

    #[test]
    fn test_overwrite_for_other_role_is_ignored() {
        let base = Permissions::VIEW_CHANNEL | Permissions::CONNECT;
        let other = PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL,
            kind: PermissionOverwriteType::Role(RoleId::new(7)),
        };
        assert!(!is_private_channel(GUILD, base, &[other]));
    }

    #[test]
    fn test_allow_overwrite_opens_channel() {
        let opened = everyone(Permissions::VIEW_CHANNEL | Permissions::CONNECT, Permissions::empty());
        assert!(!is_private_channel(GUILD, Permissions::empty(), &[opened]));
    }
}
