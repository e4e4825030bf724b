//! Framework-agnostic guild logic.
//!
//! Nothing in here talks to Discord. Services take a `ConnectionTrait` so
//! they run against a plain connection or inside a transaction, and random
//! rolls take an explicit `Rng`.

/// Command access predicates
pub mod access;
/// Message rewards
pub mod activity;
/// Channel blacklist
pub mod blacklist;
/// Command registry and resolver
pub mod commands;
/// Cooldown and elapsed time helpers
pub mod cooldown;
/// Wallet, vault, rob and tier upgrades
pub mod economy;
/// Named event bus with fault isolation
pub mod events;
/// Guild rows and the guild day
pub mod guild;
/// Clamped member counters
pub mod ledger;
/// XP curve, level ups and role rewards
pub mod leveling;
/// Guild module toggles and settings
pub mod modules;
/// Daily quests
pub mod quest;
/// Chat random events
pub mod random_event;
/// Role shops
pub mod shop;
/// Anti-spam scoring
pub mod spam;
/// User flags and supporter tag
pub mod users;
/// Voice sessions
pub mod voice;
/// Work and presence
pub mod work;
