//! Random events spawned by chat activity.
//!
//! An event is a short scenario with one or two buttons. The first member to
//! press a button wins its reward. Only one event per guild can be live within
//! the configured cooldown.

use crate::{
    core::{guild::try_claim_event_slot, modules::EventSettings},
    errors::Result,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::ConnectionTrait;
use std::time::Duration;
use tracing::debug;

/// How long an event waits for a click before it expires.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(30);
/// Chance that the reward turns out to be nothing.
const EMPTY_CHANCE: f64 = 0.1;
/// Chance, below which the careful choice pays a bonus.
const BONUS_CHANCE: f64 = 0.4;
const BONUS_RATIO: f64 = 0.25;

/// What an event pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An abandoned purse
    Coins,
    /// An old grimoire
    Xp,
}

/// Button offered by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChoice {
    Take,
    Inspect,
    Read,
    Focus,
}

impl EventChoice {
    /// Component id of the button.
    #[must_use]
    pub const fn custom_id(self) -> &'static str {
        match self {
            Self::Take => "event_take",
            Self::Inspect => "event_inspect",
            Self::Read => "event_read",
            Self::Focus => "event_focus",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Take => "Take the purse",
            Self::Inspect => "Inspect the area",
            Self::Read => "Read the grimoire",
            Self::Focus => "Read carefully",
        }
    }

    #[must_use]
    pub fn from_custom_id(id: &str) -> Option<Self> {
        [Self::Take, Self::Inspect, Self::Read, Self::Focus]
            .into_iter()
            .find(|choice| choice.custom_id() == id)
    }

    /// Whether this is the careful choice that may pay a bonus.
    const fn is_careful(self) -> bool {
        matches!(self, Self::Inspect | Self::Focus)
    }
}

/// A spawned event waiting for a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomEvent {
    pub kind: EventKind,
    /// Reward before the outcome roll
    pub amount: i64,
    pub choices: Vec<EventChoice>,
    /// Flavour number shown to members
    pub scenario: u32,
}

impl RandomEvent {
    #[must_use]
    pub const fn intro(&self) -> &'static str {
        match self.kind {
            EventKind::Coins => "While walking through town you notice an abandoned purse on the ground.",
            EventKind::Xp => "An old grimoire lies on a bench.",
        }
    }
}

/// How a click played out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResolution {
    /// Nothing inside
    Empty,
    /// The base reward
    Plain(i64),
    /// The careful choice paid a bonus
    Bonus(i64),
}

impl EventResolution {
    #[must_use]
    pub const fn amount(self) -> i64 {
        match self {
            Self::Empty => 0,
            Self::Plain(amount) | Self::Bonus(amount) => amount,
        }
    }
}

/// Picks the kind of event to spawn, `None` when no enabled kind was drawn.
pub fn pick_event<R: Rng + ?Sized>(settings: &EventSettings, rng: &mut R) -> Option<RandomEvent> {
    let draw: f64 = rng.random();
    let (kind, min, max, second, second_chance) =
        if settings.is_coin_event_enabled && draw < settings.coins_chance {
            (
                EventKind::Coins,
                settings.coins_min_gain,
                settings.coins_max_gain,
                EventChoice::Inspect,
                0.5,
            )
        } else if settings.is_xp_event_enabled && draw < settings.xp_chance {
            (
                EventKind::Xp,
                settings.xp_min_gain,
                settings.xp_max_gain,
                EventChoice::Focus,
                0.7,
            )
        } else {
            return None;
        };

    let first = match kind {
        EventKind::Coins => EventChoice::Take,
        EventKind::Xp => EventChoice::Read,
    };
    let mut choices = vec![first];
    if rng.random_bool(second_chance) {
        choices.push(second);
    }

    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    Some(RandomEvent {
        kind,
        amount: rng.random_range(low..=high),
        choices,
        scenario: rng.random_range(0..1000),
    })
}

/// Resolves a click. `roll` is a uniform draw in `[0, 1)`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn resolve(event: &RandomEvent, choice: EventChoice, roll: f64) -> EventResolution {
    if roll < EMPTY_CHANCE {
        EventResolution::Empty
    } else if choice.is_careful() && roll < BONUS_CHANCE {
        let bonus = (event.amount as f64 * BONUS_RATIO).floor() as i64;
        EventResolution::Bonus(event.amount + bonus)
    } else {
        EventResolution::Plain(event.amount)
    }
}

/// Rolls whether a message spawns an event and claims the guild slot for it.
///
/// Returns `None` when the chance roll misses, no kind is drawn, or another
/// event holds the slot.
pub async fn try_spawn<C, R>(
    db: &C,
    guild_id: &str,
    settings: &EventSettings,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Option<RandomEvent>>
where
    C: ConnectionTrait,
    R: Rng + ?Sized,
{
    if !rng.random_bool(settings.random_event_chance.clamp(0.0, 1.0)) {
        return Ok(None);
    }
    let Some(event) = pick_event(settings, rng) else {
        return Ok(None);
    };
    if !try_claim_event_slot(db, guild_id, settings.random_event_cooldown_minutes, now).await? {
        return Ok(None);
    }
    debug!("Spawned {:?} event in guild {}", event.kind, guild_id);
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::guild::clear_event_slot, test_utils::*};
    use chrono::TimeDelta;
    use rand::{SeedableRng, rngs::StdRng};

    fn purse(amount: i64) -> RandomEvent {
        RandomEvent {
            kind: EventKind::Coins,
            amount,
            choices: vec![EventChoice::Take, EventChoice::Inspect],
            scenario: 1,
        }
    }

    #[test]
    fn test_resolve() {
        let event = purse(200);
        assert_eq!(resolve(&event, EventChoice::Take, 0.05), EventResolution::Empty);
        assert_eq!(resolve(&event, EventChoice::Inspect, 0.05), EventResolution::Empty);
        assert_eq!(resolve(&event, EventChoice::Take, 0.2), EventResolution::Plain(200));
        assert_eq!(resolve(&event, EventChoice::Inspect, 0.2), EventResolution::Bonus(250));
        assert_eq!(resolve(&event, EventChoice::Inspect, 0.5), EventResolution::Plain(200));
    }

    #[test]
    fn test_pick_respects_toggles() {
        let mut rng = StdRng::seed_from_u64(3);
        let settings = EventSettings {
            is_coin_event_enabled: false,
            is_xp_event_enabled: false,
            ..EventSettings::default()
        };
        assert!(pick_event(&settings, &mut rng).is_none());

        let settings = EventSettings {
            is_coin_event_enabled: false,
            is_xp_event_enabled: true,
            xp_chance: 1.0,
            ..EventSettings::default()
        };
        let event = pick_event(&settings, &mut rng);
        let event = event.as_ref().map(|e| (e.kind, e.choices[0]));
        assert_eq!(event, Some((EventKind::Xp, EventChoice::Read)));
    }

    #[test]
    fn test_choice_ids() {
        assert_eq!(
            EventChoice::from_custom_id("event_focus"),
            Some(EventChoice::Focus)
        );
        assert_eq!(EventChoice::from_custom_id("take"), None);
    }

    #[tokio::test]
    async fn test_one_event_per_cooldown() -> Result<()> {
        let db = setup_test_db().await?;
        let mut rng = StdRng::seed_from_u64(8);
        let settings = EventSettings {
            random_event_chance: 1.0,
            is_coin_event_enabled: true,
            coins_chance: 1.0,
            ..EventSettings::default()
        };
        let now = Utc::now();

        assert!(try_spawn(&db, "g", &settings, now, &mut rng).await?.is_some());
        assert!(try_spawn(&db, "g", &settings, now, &mut rng).await?.is_none());

        clear_event_slot(&db, "g").await?;
        assert!(try_spawn(&db, "g", &settings, now, &mut rng).await?.is_some());

        let later = now + TimeDelta::minutes(settings.random_event_cooldown_minutes);
        assert!(try_spawn(&db, "g", &settings, later, &mut rng).await?.is_some());
        Ok(())
    }
}
