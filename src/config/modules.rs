//! Default guild module settings loaded from `config.toml`.
//!
//! The file is optional. When present, each `[eco]`, `[level]`, `[quest]` and
//! `[event]` table overrides the built-in defaults written into a guild module
//! row the first time that guild uses the module.

use crate::core::modules::ModuleDefaults;
use crate::errors::{Error, Result};
use std::path::Path;
use tracing::info;

/// Parses module defaults from TOML text.
pub fn parse_module_defaults(contents: &str) -> Result<ModuleDefaults> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse module defaults: {e}"),
    })
}

/// Loads module defaults from `path`, falling back to the built-in defaults
/// when the file does not exist.
pub fn load_module_defaults<P: AsRef<Path>>(path: P) -> Result<ModuleDefaults> {
    let path = path.as_ref();
    if !path.exists() {
        info!("No {} found, using built-in module defaults", path.display());
        return Ok(ModuleDefaults::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read {}: {e}", path.display()),
    })?;
    parse_module_defaults(&contents)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_parse_partial_overrides() {
        let defaults = parse_module_defaults(
            r"
            [eco]
            work_min_gain = 10
            rob_success_chance = 0.5

            [level]
            max_level = 50
            ",
        )
        .unwrap();

        assert_eq!(defaults.eco.work_min_gain, 10);
        assert_eq!(defaults.eco.rob_success_chance, 0.5);
        assert_eq!(defaults.eco.work_max_gain, 250);
        assert_eq!(defaults.level.max_level, Some(50));
        assert!(defaults.quest.use_anti_spam);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = parse_module_defaults("[eco\nwork_min_gain = ").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let defaults = load_module_defaults("does/not/exist/config.toml").unwrap();
        assert_eq!(defaults, ModuleDefaults::default());
    }
}
