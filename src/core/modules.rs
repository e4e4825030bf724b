//! Guild module toggles and typed settings.
//!
//! Each guild has one row per [`ModuleName`] holding an `is_active` flag and a
//! JSON settings blob. The blob is decoded into the typed settings structs below;
//! missing keys fall back to their defaults so older rows keep working when a
//! new setting is introduced.

use crate::{
    core::access::{GuildModules, ModuleState},
    entities::{GuildModule, ModuleName, guild_module},
    errors::{Error, Result},
};
use sea_orm::{
    Set,
    prelude::*,
    sea_query::OnConflict,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};

/// Economy module settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcoSettings {
    pub is_work_enabled: bool,
    pub is_rob_enabled: bool,
    pub work_cooldown_minutes: i64,
    pub work_min_gain: i64,
    pub work_max_gain: i64,
    pub rob_cooldown_minutes: i64,
    /// Protection window of a member after being targeted
    pub robbed_cooldown_minutes: i64,
    pub rob_success_chance: f64,
    /// Share of the target wallet taken on success
    pub rob_steal_percentage: f64,
    pub coins_from_message_enabled: bool,
    pub message_chance: f64,
    pub message_min_gain: i64,
    pub message_max_gain: i64,
    pub booster_factor: f64,
    pub tag_supporter_factor: f64,
    /// Maximum discount on vault upgrades for supporters
    pub tag_upgrade_discount: f64,
}

impl Default for EcoSettings {
    fn default() -> Self {
        Self {
            is_work_enabled: true,
            is_rob_enabled: true,
            work_cooldown_minutes: 120,
            work_min_gain: 100,
            work_max_gain: 250,
            rob_cooldown_minutes: 60,
            robbed_cooldown_minutes: 120,
            rob_success_chance: 0.4,
            rob_steal_percentage: 0.1,
            coins_from_message_enabled: true,
            message_chance: 0.3,
            message_min_gain: 5,
            message_max_gain: 25,
            booster_factor: 0.25,
            tag_supporter_factor: 0.15,
            tag_upgrade_discount: 0.1,
        }
    }
}

/// Leveling module settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSettings {
    pub is_xp_from_message_enabled: bool,
    pub message_chance: f64,
    pub message_min_gain: i64,
    pub message_max_gain: i64,
    /// Level cap, `None` for no cap
    pub max_level: Option<i64>,
    pub booster_factor: f64,
    pub tag_supporter_factor: f64,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            is_xp_from_message_enabled: true,
            message_chance: 0.5,
            message_min_gain: 75,
            message_max_gain: 125,
            max_level: None,
            booster_factor: 0.25,
            tag_supporter_factor: 0.15,
        }
    }
}

/// Daily quest module settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestSettings {
    /// Skip quest progress for members flagged by the spam scorer
    pub use_anti_spam: bool,
}

impl Default for QuestSettings {
    fn default() -> Self {
        Self {
            use_anti_spam: true,
        }
    }
}

/// Random chat event module settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub random_event_cooldown_minutes: i64,
    /// Chance for any message to spawn an event once the cooldown elapsed
    pub random_event_chance: f64,
    pub is_coin_event_enabled: bool,
    pub coins_chance: f64,
    pub coins_min_gain: i64,
    pub coins_max_gain: i64,
    pub is_xp_event_enabled: bool,
    pub xp_chance: f64,
    pub xp_min_gain: i64,
    pub xp_max_gain: i64,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            random_event_cooldown_minutes: 30,
            random_event_chance: 0.02,
            is_coin_event_enabled: true,
            coins_chance: 0.5,
            coins_min_gain: 100,
            coins_max_gain: 500,
            is_xp_event_enabled: true,
            xp_chance: 1.0,
            xp_min_gain: 100,
            xp_max_gain: 400,
        }
    }
}

/// Settings written into a module row the first time a guild uses it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleDefaults {
    pub eco: EcoSettings,
    pub level: LevelSettings,
    pub quest: QuestSettings,
    pub event: EventSettings,
}

impl ModuleDefaults {
    /// Default settings of one module as JSON.
    pub fn settings_for(&self, module: ModuleName) -> Result<Json> {
        let value = match module {
            ModuleName::Eco => serde_json::to_value(&self.eco)?,
            ModuleName::Level => serde_json::to_value(&self.level)?,
            ModuleName::Quest => serde_json::to_value(&self.quest)?,
            ModuleName::Event => serde_json::to_value(&self.event)?,
        };
        Ok(value)
    }
}

/// Decodes the settings blob of a module row into its typed form.
pub fn decode_settings<T: DeserializeOwned>(model: &guild_module::Model) -> Result<T> {
    Ok(serde_json::from_value(model.settings.clone())?)
}

/// Finds the module row of a guild, `None` when the guild never configured it.
pub async fn find_module<C>(
    db: &C,
    guild_id: &str,
    module: ModuleName,
) -> Result<Option<guild_module::Model>>
where
    C: ConnectionTrait,
{
    GuildModule::find_by_id((guild_id.to_string(), module))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds the module row of a guild, inserting an inactive row with default
/// settings when missing.
#[instrument(skip(db, defaults))]
pub async fn find_or_create_module<C>(
    db: &C,
    guild_id: &str,
    module: ModuleName,
    defaults: &ModuleDefaults,
) -> Result<guild_module::Model>
where
    C: ConnectionTrait,
{
    let row = guild_module::ActiveModel {
        guild_id: Set(guild_id.to_string()),
        module: Set(module),
        is_active: Set(false),
        settings: Set(defaults.settings_for(module)?),
    };

    GuildModule::insert(row)
        .on_conflict(
            OnConflict::columns([guild_module::Column::GuildId, guild_module::Column::Module])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    GuildModule::find_by_id((guild_id.to_string(), module))
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("guild module {module:?}")).into())
}

/// Typed settings of a module, falling back to the defaults when the guild
/// has no row for it yet.
pub async fn module_settings<C, T>(
    db: &C,
    guild_id: &str,
    module: ModuleName,
    fallback: T,
) -> Result<T>
where
    C: ConnectionTrait,
    T: DeserializeOwned,
{
    match find_module(db, guild_id, module).await? {
        Some(model) => decode_settings(&model),
        None => Ok(fallback),
    }
}

/// Switches a module on or off.
#[instrument(skip(db, defaults))]
pub async fn set_module_active<C>(
    db: &C,
    guild_id: &str,
    module: ModuleName,
    is_active: bool,
    defaults: &ModuleDefaults,
) -> Result<guild_module::Model>
where
    C: ConnectionTrait,
{
    let model = find_or_create_module(db, guild_id, module, defaults).await?;
    let mut active: guild_module::ActiveModel = model.into();
    active.is_active = Set(is_active);
    Ok(active.update(db).await?)
}

/// Restores the default settings of a module without touching its toggle.
#[instrument(skip(db, defaults))]
pub async fn reset_settings<C>(
    db: &C,
    guild_id: &str,
    module: ModuleName,
    defaults: &ModuleDefaults,
) -> Result<guild_module::Model>
where
    C: ConnectionTrait,
{
    let model = find_or_create_module(db, guild_id, module, defaults).await?;
    let mut active: guild_module::ActiveModel = model.into();
    active.settings = Set(defaults.settings_for(module)?);
    debug!("Reset settings of module {} in guild {}", module.as_str(), guild_id);
    Ok(active.update(db).await?)
}

/// Loads the state of every configured module of a guild, used to evaluate
/// access predicates.
pub async fn guild_modules<C>(db: &C, guild_id: &str) -> Result<GuildModules>
where
    C: ConnectionTrait,
{
    let rows = GuildModule::find()
        .filter(guild_module::Column::GuildId.eq(guild_id))
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.module,
                ModuleState {
                    is_active: row.is_active,
                    settings: row.settings,
                },
            )
        })
        .collect())
}

/// Reads a setting value typed in chat: JSON when it parses, text otherwise.
#[must_use]
pub fn parse_setting_value(raw: &str) -> Json {
    serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_string()))
}

fn validate_settings(module: ModuleName, settings: &Json) -> serde_json::Result<()> {
    match module {
        ModuleName::Eco => serde_json::from_value::<EcoSettings>(settings.clone()).map(drop),
        ModuleName::Level => serde_json::from_value::<LevelSettings>(settings.clone()).map(drop),
        ModuleName::Quest => serde_json::from_value::<QuestSettings>(settings.clone()).map(drop),
        ModuleName::Event => serde_json::from_value::<EventSettings>(settings.clone()).map(drop),
    }
}

/// Changes one setting of a module.
///
/// Rejects keys the module does not know and values that do not fit the
/// setting's type; the stored blob is left untouched in both cases.
#[instrument(skip(db, defaults))]
pub async fn update_setting<C>(
    db: &C,
    guild_id: &str,
    module: ModuleName,
    key: &str,
    value: Json,
    defaults: &ModuleDefaults,
) -> Result<guild_module::Model>
where
    C: ConnectionTrait,
{
    let known = defaults.settings_for(module)?;
    if known.get(key).is_none() {
        return Err(Error::Command {
            message: format!("Unknown setting `{key}` for module {}", module.as_str()),
        });
    }

    let model = find_or_create_module(db, guild_id, module, defaults).await?;
    let mut settings = match model.settings.clone() {
        Json::Object(map) => Json::Object(map),
        _ => known,
    };
    if let Json::Object(map) = &mut settings {
        map.insert(key.to_string(), value);
    }
    validate_settings(module, &settings).map_err(|err| Error::Command {
        message: format!("Invalid value for `{key}`: {err}"),
    })?;

    let mut active: guild_module::ActiveModel = model.into();
    active.settings = Set(settings);
    debug!("Updated {} of module {} in guild {}", key, module.as_str(), guild_id);
    Ok(active.update(db).await?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: EcoSettings =
            serde_json::from_value(serde_json::json!({ "is_rob_enabled": false })).unwrap();
        assert!(!settings.is_rob_enabled);
        assert_eq!(settings.work_min_gain, EcoSettings::default().work_min_gain);
    }

    #[tokio::test]
    async fn test_find_or_create_module_starts_inactive() -> Result<()> {
        let db = setup_test_db().await?;
        let defaults = ModuleDefaults::default();

        let module = find_or_create_module(&db, "guild", ModuleName::Eco, &defaults).await?;
        assert!(!module.is_active);

        let settings: EcoSettings = decode_settings(&module)?;
        assert_eq!(settings, defaults.eco);

        // Second call returns the same row instead of failing on the key
        let again = find_or_create_module(&db, "guild", ModuleName::Eco, &defaults).await?;
        assert_eq!(again, module);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_active_and_reset_settings() -> Result<()> {
        let db = setup_test_db().await?;
        let defaults = ModuleDefaults::default();

        let module = set_module_active(&db, "guild", ModuleName::Level, true, &defaults).await?;
        assert!(module.is_active);

        let mut active: guild_module::ActiveModel = module.into();
        active.settings = Set(serde_json::json!({ "max_level": 5 }));
        active.update(&db).await?;

        let reset = reset_settings(&db, "guild", ModuleName::Level, &defaults).await?;
        assert!(reset.is_active);
        let settings: LevelSettings = decode_settings(&reset)?;
        assert_eq!(settings.max_level, None);

        let modules = guild_modules(&db, "guild").await?;
        assert!(modules.get(&ModuleName::Level).unwrap().is_active);
        assert!(!modules.contains_key(&ModuleName::Eco));
        Ok(())
    }

    #[tokio::test]
    async fn test_module_settings_fallback() -> Result<()> {
        let db = setup_test_db().await?;
        let settings =
            module_settings(&db, "guild", ModuleName::Quest, QuestSettings::default()).await?;
        assert!(settings.use_anti_spam);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_setting() -> Result<()> {
        let db = setup_test_db().await?;
        let defaults = ModuleDefaults::default();

        let module = update_setting(
            &db,
            "guild",
            ModuleName::Eco,
            "work_min_gain",
            parse_setting_value("300"),
            &defaults,
        )
        .await?;
        let settings: EcoSettings = decode_settings(&module)?;
        assert_eq!(settings.work_min_gain, 300);

        let unknown = update_setting(
            &db,
            "guild",
            ModuleName::Eco,
            "nope",
            parse_setting_value("1"),
            &defaults,
        )
        .await;
        assert!(matches!(unknown, Err(Error::Command { .. })));

        let mistyped = update_setting(
            &db,
            "guild",
            ModuleName::Eco,
            "work_min_gain",
            parse_setting_value("lots"),
            &defaults,
        )
        .await;
        assert!(matches!(mistyped, Err(Error::Command { .. })));

        let module = find_module(&db, "guild", ModuleName::Eco).await?.unwrap();
        assert_eq!(decode_settings::<EcoSettings>(&module)?.work_min_gain, 300);
        Ok(())
    }
}
