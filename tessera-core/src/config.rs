use serde::Deserialize;
use std::env;

/// Engine-wide tunables. All fields have serde defaults so the engine
/// works without any config files present.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineRules {
    /// Ceiling on the variant matrix size (product of axis value-set
    /// sizes). Configurations above this fail rather than enumerate.
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,

    /// Treat converting a product to its own current type as an error
    /// instead of a trivial success.
    #[serde(default)]
    pub reject_noop_conversion: bool,

    /// Separator used when joining axis values into fallback SKUs.
    #[serde(default = "default_sku_separator")]
    pub sku_separator: String,
}

fn default_max_combinations() -> usize {
    10_000
}

fn default_sku_separator() -> String {
    "-".to_string()
}

impl Default for EngineRules {
    fn default() -> Self {
        Self {
            max_combinations: default_max_combinations(),
            reject_noop_conversion: false,
            sku_separator: default_sku_separator(),
        }
    }
}

impl EngineRules {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            // Environment-specific overrides, e.g. config/production
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `TESSERA__MAX_COMBINATIONS=500`
            .add_source(config::Environment::with_prefix("TESSERA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let rules = EngineRules::default();
        assert_eq!(rules.max_combinations, 10_000);
        assert!(!rules.reject_noop_conversion);
        assert_eq!(rules.sku_separator, "-");
    }

    #[test]
    fn environment_overrides_are_picked_up() {
        env::set_var("TESSERA__MAX_COMBINATIONS", "500");
        let rules = EngineRules::load().unwrap();
        env::remove_var("TESSERA__MAX_COMBINATIONS");

        assert_eq!(rules.max_combinations, 500);
        // Untouched fields keep their serde defaults.
        assert_eq!(rules.sku_separator, "-");
    }
}
