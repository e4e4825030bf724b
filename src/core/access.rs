//! Access predicates attached to commands.
//!
//! A policy is the AND of its user, channel and guild parts. Every unset part
//! is vacuously true. Evaluation is pure: the bot layer resolves the actor's
//! attributes (flags, permissions, module toggles) beforehand.

use crate::entities::ModuleName;
use sea_orm::prelude::Json;
use std::collections::HashMap;

/// Toggle and settings of one guild module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleState {
    pub is_active: bool,
    pub settings: Json,
}

/// Module states of a guild. Missing modules count as inactive.
pub type GuildModules = HashMap<ModuleName, ModuleState>;

/// A module that must be active, optionally with a boolean setting turned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleRequirement {
    pub module: ModuleName,
    pub setting: Option<&'static str>,
}

impl ModuleRequirement {
    /// Whether `modules` satisfies the requirement.
    ///
    /// False when the module is missing or inactive, or when the named setting
    /// is absent or falsy.
    #[must_use]
    pub fn is_met(&self, modules: &GuildModules) -> bool {
        let Some(state) = modules.get(&self.module) else {
            return false;
        };
        if !state.is_active {
            return false;
        }
        self.setting.is_none_or(|name| is_truthy(state.settings.get(name)))
    }
}

fn is_truthy(value: Option<&Json>) -> bool {
    match value {
        Some(Json::Bool(flag)) => *flag,
        Some(Json::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Json::String(text)) => !text.is_empty(),
        Some(Json::Array(_) | Json::Object(_)) => true,
        Some(Json::Null) | None => false,
    }
}

/// Predicates on the invoking user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPolicy {
    /// Only these users, when set
    pub authorized_ids: Option<Vec<String>>,
    pub is_developer: bool,
    pub is_beta_tester: bool,
    pub is_staff: bool,
    pub is_guild_owner: bool,
    /// Permission bits the user must all hold
    pub required_permissions: u64,
}

/// Predicates on the channel the command was used in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPolicy {
    pub authorized_ids: Option<Vec<String>>,
    pub is_nsfw: bool,
}

/// Predicates on the guild the command was used in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildPolicy {
    pub authorized_ids: Option<Vec<String>>,
    pub modules: Vec<ModuleRequirement>,
}

/// All predicates of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub user: UserPolicy,
    pub channel: ChannelPolicy,
    pub guild: GuildPolicy,
}

/// Resolved attributes of whoever invokes a command, and where.
#[derive(Debug, Clone, Default)]
pub struct ActorAttributes {
    pub user_id: String,
    pub is_developer: bool,
    pub is_beta_tester: bool,
    pub is_staff: bool,
    pub is_guild_owner: bool,
    pub permissions: u64,
    pub channel_id: String,
    pub channel_is_nsfw: bool,
    /// `None` in direct messages
    pub guild_id: Option<String>,
    pub modules: GuildModules,
}

fn listed(ids: Option<&Vec<String>>, id: Option<&str>) -> bool {
    ids.is_none_or(|ids| id.is_some_and(|id| ids.iter().any(|allowed| allowed == id)))
}

impl AccessPolicy {
    /// Restricts to developers.
    #[must_use]
    pub const fn developer_only(mut self) -> Self {
        self.user.is_developer = true;
        self
    }

    /// Requires the invoking user to hold every bit of `permissions`.
    #[must_use]
    pub const fn require_permissions(mut self, permissions: u64) -> Self {
        self.user.required_permissions |= permissions;
        self
    }

    /// Requires `module` to be active.
    #[must_use]
    pub fn require_module(mut self, module: ModuleName) -> Self {
        self.guild.modules.push(ModuleRequirement {
            module,
            setting: None,
        });
        self
    }

    /// Requires `module` to be active with `setting` turned on.
    #[must_use]
    pub fn require_setting(mut self, module: ModuleName, setting: &'static str) -> Self {
        self.guild.modules.push(ModuleRequirement {
            module,
            setting: Some(setting),
        });
        self
    }

    /// Whether the policy names any module, so the caller knows to load them.
    #[must_use]
    pub fn needs_modules(&self) -> bool {
        !self.guild.modules.is_empty()
    }

    /// Evaluates every predicate against `actor`.
    #[must_use]
    pub fn allows(&self, actor: &ActorAttributes) -> bool {
        self.user_allows(actor) && self.channel_allows(actor) && self.guild_allows(actor)
    }

    fn user_allows(&self, actor: &ActorAttributes) -> bool {
        let user = &self.user;
        listed(user.authorized_ids.as_ref(), Some(actor.user_id.as_str()))
            && (!user.is_developer || actor.is_developer)
            && (!user.is_beta_tester || actor.is_beta_tester)
            && (!user.is_staff || actor.is_staff)
            && (!user.is_guild_owner || actor.is_guild_owner)
            && actor.permissions & user.required_permissions == user.required_permissions
    }

    fn channel_allows(&self, actor: &ActorAttributes) -> bool {
        listed(self.channel.authorized_ids.as_ref(), Some(actor.channel_id.as_str()))
            && (!self.channel.is_nsfw || actor.channel_is_nsfw)
    }

    fn guild_allows(&self, actor: &ActorAttributes) -> bool {
        if !listed(self.guild.authorized_ids.as_ref(), actor.guild_id.as_deref()) {
            return false;
        }
        if self.guild.modules.is_empty() {
            return true;
        }
        actor.guild_id.is_some()
            && self
                .guild
                .modules
                .iter()
                .all(|requirement| requirement.is_met(&actor.modules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actor() -> ActorAttributes {
        ActorAttributes {
            user_id: "u1".to_string(),
            channel_id: "c1".to_string(),
            guild_id: Some("g1".to_string()),
            ..ActorAttributes::default()
        }
    }

    fn with_module(mut actor: ActorAttributes, is_active: bool, settings: Json) -> ActorAttributes {
        actor
            .modules
            .insert(ModuleName::Eco, ModuleState { is_active, settings });
        actor
    }

    #[test]
    fn test_empty_policy_allows_everyone() {
        assert!(AccessPolicy::default().allows(&actor()));
        let dm = ActorAttributes {
            guild_id: None,
            ..actor()
        };
        assert!(AccessPolicy::default().allows(&dm));
    }

    #[test]
    fn test_developer_flag() {
        let policy = AccessPolicy::default().developer_only();
        assert!(!policy.allows(&actor()));
        let developer = ActorAttributes {
            is_developer: true,
            ..actor()
        };
        assert!(policy.allows(&developer));
    }

    #[test]
    fn test_module_and_setting() {
        let policy = AccessPolicy::default().require_setting(ModuleName::Eco, "is_rob_enabled");

        assert!(!policy.allows(&actor()));
        assert!(!policy.allows(&with_module(actor(), false, json!({ "is_rob_enabled": true }))));
        assert!(!policy.allows(&with_module(actor(), true, json!({ "is_rob_enabled": false }))));
        assert!(!policy.allows(&with_module(actor(), true, json!({}))));
        assert!(policy.allows(&with_module(actor(), true, json!({ "is_rob_enabled": true }))));

        let module_only = AccessPolicy::default().require_module(ModuleName::Eco);
        assert!(module_only.allows(&with_module(actor(), true, json!({}))));
    }

    #[test]
    fn test_all_dimensions_are_anded() {
        let mut policy = AccessPolicy::default().require_permissions(0b100);
        policy.channel.authorized_ids = Some(vec!["c1".to_string()]);
        policy.guild.authorized_ids = Some(vec!["g1".to_string()]);

        let allowed = ActorAttributes {
            permissions: 0b110,
            ..actor()
        };
        assert!(policy.allows(&allowed));

        let wrong_channel = ActorAttributes {
            channel_id: "c2".to_string(),
            ..allowed.clone()
        };
        assert!(!policy.allows(&wrong_channel));

        let missing_bit = ActorAttributes {
            permissions: 0b010,
            ..allowed.clone()
        };
        assert!(!policy.allows(&missing_bit));

        let in_dm = ActorAttributes {
            guild_id: None,
            ..allowed
        };
        assert!(!policy.allows(&in_dm));
    }

    #[test]
    fn test_nsfw_channel() {
        let mut policy = AccessPolicy::default();
        policy.channel.is_nsfw = true;
        assert!(!policy.allows(&actor()));
        let nsfw = ActorAttributes {
            channel_is_nsfw: true,
            ..actor()
        };
        assert!(policy.allows(&nsfw));
    }
}
