//! Persisted courier settings.
//!
//! `Settings` is the on-disk, serde-friendly form of the configuration. It is
//! read once at startup, overridden from the environment, and turned into the
//! live [`DeliveryConfig`](crate::DeliveryConfig).

use crate::config::{DEFAULT_HOST, DEFAULT_SCREEN_WIDTH};
use crate::{DeliveryResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Courier settings as stored in `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether events are sent at all.
    pub enable: bool,
    /// Whether failed events are persisted and retried.
    pub retry_on_failure: bool,
    /// Site domain registered with the collector.
    pub domain: String,
    /// Collector base URL; `/event` is appended.
    pub host: String,
    /// User agent override; empty means the built-in default.
    pub user_agent: String,
    /// Reported screen width.
    pub screen_width: u32,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable: true,
            retry_on_failure: true,
            domain: String::new(),
            host: DEFAULT_HOST.to_string(),
            user_agent: String::new(),
            screen_width: DEFAULT_SCREEN_WIDTH,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `paths.config_file()`, falling back to defaults, then
    /// apply environment overrides.
    pub fn load(paths: &Paths) -> DeliveryResult<Self> {
        let config_path = paths.config_file();

        let mut settings = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> DeliveryResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save settings to `paths.config_file()`.
    pub fn save(&self, paths: &Paths) -> DeliveryResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `PLAUSIBLE_*` overrides read through `lookup`.
    ///
    /// Boolean values that do not parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(enable) = lookup("PLAUSIBLE_ENABLE").and_then(|v| parse_bool(&v)) {
            self.enable = enable;
        }
        if let Some(retry) = lookup("PLAUSIBLE_RETRY").and_then(|v| parse_bool(&v)) {
            self.retry_on_failure = retry;
        }
        if let Some(domain) = lookup("PLAUSIBLE_DOMAIN") {
            self.domain = domain;
        }
        if let Some(host) = lookup("PLAUSIBLE_HOST") {
            self.host = host;
        }
        if let Some(user_agent) = lookup("PLAUSIBLE_USER_AGENT") {
            self.user_agent = user_agent;
        }
        if let Some(log_level) = lookup("PLAUSIBLE_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.enable);
        assert!(settings.retry_on_failure);
        assert_eq!(settings.host, DEFAULT_HOST);
        assert_eq!(settings.log_level, DEFAULT_LOG_LEVEL);
        assert!(settings.domain.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "domain": "app.example.com", "enable": false }"#).unwrap();

        let settings = Settings::load_from_file(&path).unwrap();
        assert_eq!(settings.domain, "app.example.com");
        assert!(!settings.enable);
        assert!(settings.retry_on_failure);
        assert_eq!(settings.host, DEFAULT_HOST);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let settings = Settings {
            domain: "roundtrip.example".to_string(),
            retry_on_failure: false,
            screen_width: 412,
            ..Default::default()
        };
        settings.save(&paths).unwrap();

        let loaded = Settings::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut settings = Settings::load_from_file(&paths.config_file())
            .unwrap_or_default();
        settings.apply_overrides(|_| None);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PLAUSIBLE_ENABLE", "off"),
            ("PLAUSIBLE_RETRY", "not-a-bool"),
            ("PLAUSIBLE_DOMAIN", "env.example"),
            ("PLAUSIBLE_HOST", "https://stats.example/api"),
            ("PLAUSIBLE_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert!(!settings.enable);
        assert!(settings.retry_on_failure);
        assert_eq!(settings.domain, "env.example");
        assert_eq!(settings.host, "https://stats.example/api");
        assert_eq!(settings.log_level, "debug");
        assert!(settings.user_agent.is_empty());
    }
}
