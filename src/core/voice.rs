//! Voice session tracking.
//!
//! [`CallSessionManager`] keeps one in-memory session per user currently in a
//! voice channel. Elapsed time is committed to the member voice counters on
//! flush, in whole minutes, under the flags that were active during that time
//! slice. Any change of channel or flags flushes the old session and starts a
//! fresh one.
//!
//! The session map lock is held while a flush is written, so a session is
//! never committed twice for the same time slice.

use crate::{
    core::ledger::{CallMinutes, Ledger, MemberKey},
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Voice state flags relevant to minute accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceFlags {
    /// Channel hidden from or closed to @everyone
    pub is_private: bool,
    /// Self or server mute
    pub is_muted: bool,
    /// Self or server deafen
    pub is_deaf: bool,
    pub is_streaming: bool,
    pub has_camera: bool,
}

impl VoiceFlags {
    /// Splits `minutes` over the counters these flags select.
    ///
    /// Exactly one of deaf, muted or active (deaf wins over muted), exactly
    /// one of private or public, plus streaming and camera when set.
    #[must_use]
    pub fn minutes(&self, minutes: i64) -> CallMinutes {
        let mut split = CallMinutes::default();

        if self.is_deaf {
            split.deaf = minutes;
        } else if self.is_muted {
            split.muted = minutes;
        } else {
            split.active = minutes;
        }

        if self.is_private {
            split.private = minutes;
        } else {
            split.public = minutes;
        }

        if self.is_streaming {
            split.streaming = minutes;
        }
        if self.has_camera {
            split.camera = minutes;
        }

        split
    }
}

/// Where a user is and with which flags, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePresence {
    pub guild_id: String,
    pub channel_id: String,
    pub flags: VoiceFlags,
}

/// A tracked voice session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub guild_id: String,
    pub channel_id: String,
    pub started_at: DateTime<Utc>,
    pub flags: VoiceFlags,
}

/// Minutes committed for one member by a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flushed {
    pub key: MemberKey,
    pub minutes: i64,
}

/// Changes applied by [`CallSessionManager::sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub started: usize,
    pub updated: usize,
    pub stopped: usize,
    pub flushed: Vec<Flushed>,
}

/// In-memory voice sessions keyed by user id.
pub struct CallSessionManager {
    sessions: Mutex<HashMap<String, CallSession>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CallSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionManager").finish_non_exhaustive()
    }
}

impl Default for CallSessionManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl CallSessionManager {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Starts tracking `user_id`, replacing any previous session.
    pub async fn start(&self, user_id: &str, presence: VoicePresence) {
        let session = CallSession {
            guild_id: presence.guild_id,
            channel_id: presence.channel_id,
            started_at: self.clock.now(),
            flags: presence.flags,
        };
        debug!("Voice session started for {}: {:?}", user_id, session);
        self.sessions.lock().await.insert(user_id.to_string(), session);
    }

    /// Commits the elapsed whole minutes of a session and restarts its timer.
    ///
    /// Returns `None` when the user has no session or less than a minute
    /// elapsed; the timer is only reset when minutes were committed.
    pub async fn flush<C>(&self, db: &C, user_id: &str) -> Result<Option<Flushed>>
    where
        C: ConnectionTrait,
    {
        let mut sessions = self.sessions.lock().await;
        let now = self.clock.now();
        match sessions.get_mut(user_id) {
            Some(session) => commit(db, user_id, session, now).await,
            None => Ok(None),
        }
    }

    /// Flushes and forgets the session of a user leaving voice.
    ///
    /// The session is forgotten even when the flush fails.
    pub async fn stop<C>(&self, db: &C, user_id: &str) -> Result<Option<Flushed>>
    where
        C: ConnectionTrait,
    {
        let mut sessions = self.sessions.lock().await;
        let now = self.clock.now();
        let Some(mut session) = sessions.remove(user_id) else {
            return Ok(None);
        };
        debug!("Voice session stopped for {}", user_id);
        commit(db, user_id, &mut session, now).await
    }

    /// Applies a voice state change.
    ///
    /// When the channel or any flag changed, the elapsed time is flushed under
    /// the old flags and a new session starts now, even when the flush
    /// fails. Users without a session are ignored; [`Self::sync`] adopts them.
    pub async fn update<C>(
        &self,
        db: &C,
        user_id: &str,
        presence: VoicePresence,
    ) -> Result<Option<Flushed>>
    where
        C: ConnectionTrait,
    {
        let mut sessions = self.sessions.lock().await;
        let now = self.clock.now();
        let Some(session) = sessions.get_mut(user_id) else {
            return Ok(None);
        };

        if session.guild_id == presence.guild_id
            && session.channel_id == presence.channel_id
            && session.flags == presence.flags
        {
            return Ok(None);
        }

        let flushed = commit(db, user_id, session, now).await;
        *session = CallSession {
            guild_id: presence.guild_id,
            channel_id: presence.channel_id,
            started_at: now,
            flags: presence.flags,
        };
        flushed
    }

    /// Flushes every session, logging and skipping failures.
    pub async fn flush_all<C>(&self, db: &C) -> Vec<Flushed>
    where
        C: ConnectionTrait,
    {
        let mut sessions = self.sessions.lock().await;
        let now = self.clock.now();
        let mut flushed = Vec::new();

        for (user_id, session) in sessions.iter_mut() {
            match commit(db, user_id, session, now).await {
                Ok(Some(entry)) => flushed.push(entry),
                Ok(None) => {}
                Err(e) => warn!("Failed to flush voice session of {}: {}", user_id, e),
            }
        }

        flushed
    }

    /// Sets the privacy flag of every session in `channel_id` in place.
    ///
    /// Nothing is flushed: already elapsed time is attributed to the new flag
    /// at the next flush. Returns how many sessions changed.
    pub async fn set_channel_privacy(&self, channel_id: &str, is_private: bool) -> usize {
        let mut sessions = self.sessions.lock().await;
        let mut changed = 0;
        for session in sessions.values_mut() {
            if session.channel_id == channel_id && session.flags.is_private != is_private {
                session.flags.is_private = is_private;
                changed += 1;
            }
        }
        changed
    }

    /// Current session of a user.
    pub async fn session(&self, user_id: &str) -> Option<CallSession> {
        self.sessions.lock().await.get(user_id).cloned()
    }

    /// Every session of a guild, sorted by start time.
    pub async fn guild_sessions(&self, guild_id: &str) -> Vec<(String, CallSession)> {
        let sessions = self.sessions.lock().await;
        let mut list: Vec<_> = sessions
            .iter()
            .filter(|(_, session)| session.guild_id == guild_id)
            .map(|(user_id, session)| (user_id.clone(), session.clone()))
            .collect();
        list.sort_by_key(|(_, session)| session.started_at);
        list
    }

    /// Reconciles the sessions of a guild with the users actually present.
    ///
    /// Missing users start a session, stale sessions are flushed and dropped,
    /// changed ones go through the same flush-then-restart as [`Self::update`].
    /// A failed flush does not stop the reconciliation; the first failure is
    /// returned once every session is in its new state.
    pub async fn sync<C>(
        &self,
        db: &C,
        guild_id: &str,
        present: HashMap<String, VoicePresence>,
    ) -> Result<SyncReport>
    where
        C: ConnectionTrait,
    {
        let mut sessions = self.sessions.lock().await;
        let now = self.clock.now();
        let mut report = SyncReport::default();
        let mut failure = None;

        let stale: Vec<String> = sessions
            .iter()
            .filter(|(user_id, session)| {
                session.guild_id == guild_id && !present.contains_key(*user_id)
            })
            .map(|(user_id, _)| user_id.clone())
            .collect();

        for user_id in stale {
            if let Some(mut session) = sessions.remove(&user_id) {
                match commit(db, &user_id, &mut session, now).await {
                    Ok(Some(entry)) => report.flushed.push(entry),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Failed to flush voice session of {}: {}", user_id, e);
                        failure.get_or_insert(e);
                    }
                }
                report.stopped += 1;
            }
        }

        for (user_id, presence) in present {
            let fresh = CallSession {
                guild_id: presence.guild_id.clone(),
                channel_id: presence.channel_id.clone(),
                started_at: now,
                flags: presence.flags,
            };

            match sessions.get_mut(&user_id) {
                Some(session)
                    if session.channel_id == presence.channel_id
                        && session.flags == presence.flags => {}
                Some(session) => {
                    let committed = commit(db, &user_id, session, now).await;
                    *session = fresh;
                    report.updated += 1;
                    match committed {
                        Ok(Some(entry)) => report.flushed.push(entry),
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Failed to flush voice session of {}: {}", user_id, e);
                            failure.get_or_insert(e);
                        }
                    }
                }
                None => {
                    sessions.insert(user_id, fresh);
                    report.started += 1;
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Writes the whole minutes elapsed in `session` and resets its timer.
async fn commit<C>(
    db: &C,
    user_id: &str,
    session: &mut CallSession,
    now: DateTime<Utc>,
) -> Result<Option<Flushed>>
where
    C: ConnectionTrait,
{
    let minutes = (now - session.started_at).num_minutes();
    if minutes <= 0 {
        return Ok(None);
    }

    let key = MemberKey::new(user_id, session.guild_id.as_str());
    Ledger::new(db)
        .add_call_minutes(&key, &session.flags.minutes(minutes))
        .await?;
    session.started_at = now;

    debug!("Flushed {} voice minutes for {:?}", minutes, key);
    Ok(Some(Flushed { key, minutes }))
}
