//! Per-user message spam scoring.
//!
//! Every message is compared to the previous one from the same user in the
//! same guild. Fast messages, repeated content and a machine-like regular
//! rhythm all add to a running score; one clean message resets it. The score
//! scales message rewards down and can gate quest progress.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Messages closer than this are considered fast.
const FAST_INTERVAL_MS: i64 = 750;
/// Intervals within this of the previous one are considered regular.
const RHYTHM_TOLERANCE_MS: i64 = 75;
/// Score at which rewards drop to zero.
const FULL_PENALTY_SCORE: f64 = 5.0;
/// Records idle for longer than this are dropped.
const RECORD_TTL_SECS: i64 = 120;
/// Highest score still allowed to progress quests when anti-spam is on.
pub const QUEST_SCORE_LIMIT: i64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SpamRecord {
    guild_id: String,
    last_message_at: DateTime<Utc>,
    last_interval_ms: Option<i64>,
    last_content: String,
    score: i64,
}

/// Score increase of a message given the previous one.
fn score_message(
    record: &SpamRecord,
    interval_ms: i64,
    content: &str,
) -> i64 {
    let last_interval = record.last_interval_ms.unwrap_or(interval_ms);
    let mut score = 0;

    if interval_ms < FAST_INTERVAL_MS {
        score += 1;
    }
    if record.last_content == content && content.chars().count() > 1 {
        score += 2;
    }
    if (interval_ms - last_interval).abs() <= RHYTHM_TOLERANCE_MS {
        score += 3;
    }
    score
}

/// Reward penalty for a score, in `[0, 1]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn spam_factor(score: i64) -> f64 {
    (score as f64 / FULL_PENALTY_SCORE).clamp(0.0, 1.0)
}

/// Running spam scores of all users.
#[derive(Debug, Default)]
pub struct SpamTracker {
    records: Mutex<HashMap<String, SpamRecord>>,
}

impl SpamTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores a message and returns the user's updated score.
    ///
    /// A message in another guild than the previous one starts over. Records
    /// of users quiet for longer than two minutes are evicted first.
    pub async fn observe(
        &self,
        user_id: &str,
        guild_id: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> i64 {
        let content = content.trim();
        let mut records = self.records.lock().await;
        let ttl = TimeDelta::seconds(RECORD_TTL_SECS);
        records.retain(|_, record| at - record.last_message_at <= ttl);

        match records.get_mut(user_id) {
            Some(record) if record.guild_id == guild_id => {
                let interval_ms = (at - record.last_message_at).num_milliseconds();
                let gained = score_message(record, interval_ms, content);

                record.score = if gained == 0 { 0 } else { record.score + gained };
                record.last_interval_ms = Some(interval_ms);
                record.last_message_at = at;
                record.last_content = content.to_string();
                record.score
            }
            _ => {
                records.insert(
                    user_id.to_string(),
                    SpamRecord {
                        guild_id: guild_id.to_string(),
                        last_message_at: at,
                        last_interval_ms: None,
                        last_content: content.to_string(),
                        score: 0,
                    },
                );
                0
            }
        }
    }

    /// Current score of a user, 0 when unknown.
    pub async fn score(&self, user_id: &str) -> i64 {
        self.records
            .lock()
            .await
            .get(user_id)
            .map_or(0, |record| record.score)
    }

    /// Number of users currently tracked.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
