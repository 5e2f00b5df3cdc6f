//! Settings loading.
//!
//! Layers, later wins:
//! 1. `config/default.toml`, compiled into the binary
//! 2. A user TOML file (explicit path, or `<config dir>/quotemate/config.toml` if present)
//! 3. `QUOTEMATE_*` environment variables for secrets and the slicer path

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use super::types::Settings;

const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

pub const ENV_CLI_PATH: &str = "QUOTEMATE_ORCASLICER_CLI";
pub const ENV_TELEGRAM_TOKEN: &str = "QUOTEMATE_TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "QUOTEMATE_TELEGRAM_ADMIN_CHAT_ID";

/// Per-user config file location, e.g. `~/.config/quotemate/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("quotemate").join("config.toml"))
}

impl Settings {
    /// Built-in defaults.
    ///
    /// # Panics
    /// Panics if the embedded TOML is invalid (a build-time bug).
    pub fn defaults() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default.toml must be valid")
    }

    /// Defaults with `overlay` merged on top. Tables merge key by key.
    pub fn from_toml_str(overlay: &str) -> Result<Self> {
        let mut base: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        let overlay: toml::Table = toml::from_str(overlay).context("Invalid config TOML")?;
        merge_tables(&mut base, overlay);
        let settings: Settings = toml::Value::Table(base)
            .try_into()
            .context("Config does not match the expected layout")?;
        Ok(settings)
    }

    /// Load, apply environment overrides and validate.
    ///
    /// An explicit `path` must exist; the default per-user file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.is_file()),
        };

        let mut settings = match file {
            Some(ref p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config {:?}", p))?;
                info!("Loaded config from {:?}", p);
                Self::from_toml_str(&content).with_context(|| format!("In config {:?}", p))?
            }
            None => {
                debug!("No config file, using built-in defaults");
                Self::defaults()
            }
        };

        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Override secrets and the slicer path from the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(cli) = non_empty(ENV_CLI_PATH) {
            self.slicer.cli_path = PathBuf::from(cli);
        }
        if let Some(token) = non_empty(ENV_TELEGRAM_TOKEN) {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat) = non_empty(ENV_TELEGRAM_CHAT_ID) {
            self.telegram.admin_chat_id = Some(chat);
        }
    }

    /// Reject values the pricing formula or the worker cannot use.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pricing;
        if !(p.markup_multiplier.is_finite() && p.markup_multiplier > 0.0) {
            bail!("pricing.markup_multiplier must be > 0, got {}", p.markup_multiplier);
        }
        if !(p.minimum_price.is_finite() && p.minimum_price >= 0.0) {
            bail!("pricing.minimum_price must be >= 0, got {}", p.minimum_price);
        }
        if !(p.additional_time_hours.is_finite() && p.additional_time_hours >= 0.0) {
            bail!(
                "pricing.additional_time_hours must be >= 0, got {}",
                p.additional_time_hours
            );
        }
        if !(p.default_price_per_kg.is_finite() && p.default_price_per_kg >= 0.0) {
            bail!(
                "pricing.default_price_per_kg must be >= 0, got {}",
                p.default_price_per_kg
            );
        }
        for (material, price) in &p.material_prices {
            if !(price.is_finite() && *price >= 0.0) {
                bail!("pricing.material_prices.{} must be >= 0, got {}", material, price);
            }
        }
        if self.slicer.timeout_secs == 0 {
            bail!("slicer.timeout_secs must be > 0");
        }
        if self.worker.max_concurrent_quotes == 0 {
            bail!("worker.max_concurrent_quotes must be > 0");
        }
        Ok(())
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_load() {
        let settings = Settings::defaults();
        assert_eq!(settings.pricing.material_prices.get("PLA"), Some(&25.0));
        assert_eq!(settings.pricing.material_prices.get("PETG"), Some(&30.0));
        assert_eq!(settings.pricing.material_prices.get("ASA"), Some(&35.0));
        assert_eq!(settings.pricing.default_price_per_kg, 25.0);
        assert_eq!(settings.pricing.markup_multiplier, 1.1);
        assert_eq!(settings.pricing.minimum_price, 5.0);
        assert_eq!(settings.pricing.additional_time_hours, 0.5);
        assert_eq!(settings.slicer.timeout_secs, 300);
        assert_eq!(settings.slicer.profiles.filament.len(), 3);
        assert!(settings.telegram.bot_token.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_overlay_merges_nested_tables() {
        let settings = Settings::from_toml_str(
            r#"
            [pricing]
            minimum_price = 8.0

            [pricing.material_prices]
            TPU = 45.0

            [slicer.profiles.filament]
            TPU = "Generic TPU.json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.pricing.minimum_price, 8.0);
        assert_eq!(settings.pricing.markup_multiplier, 1.1);
        assert_eq!(settings.pricing.material_prices.get("TPU"), Some(&45.0));
        assert_eq!(settings.pricing.material_prices.get("PLA"), Some(&25.0));
        assert_eq!(settings.slicer.profiles.filament.len(), 4);
        assert_eq!(settings.slicer.timeout_secs, 300);
    }

    #[test]
    fn test_overlay_rejects_bad_types() {
        let err = Settings::from_toml_str("[slicer]\ntimeout_secs = \"soon\"\n").unwrap_err();
        assert!(err.to_string().contains("layout"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_TELEGRAM_TOKEN, "123:abc"),
            (ENV_TELEGRAM_CHAT_ID, "-1001"),
            (ENV_CLI_PATH, "  "),
        ]);
        let mut settings = Settings::defaults();
        let original_cli = settings.slicer.cli_path.clone();
        settings.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(settings.telegram.admin_chat_id.as_deref(), Some("-1001"));
        assert_eq!(settings.slicer.cli_path, original_cli);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::defaults();
        settings.pricing.markup_multiplier = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::defaults();
        settings.pricing.minimum_price = -1.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::defaults();
        settings.pricing.material_prices.insert("PLA".into(), f64::NAN);
        assert!(settings.validate().is_err());

        let mut settings = Settings::defaults();
        settings.worker.max_concurrent_quotes = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[worker]\nmax_concurrent_quotes = 2\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.worker.max_concurrent_quotes, 2);
        assert!(settings.worker.validate_models);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        assert!(Settings::load(Some(Path::new("/nonexistent/quotemate.toml"))).is_err());
    }
}
