//! File system paths for the courier.

use crate::{DeliveryError, DeliveryResult};
use std::path::{Path, PathBuf};

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".plausible";

/// Manages file system paths for the courier.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.plausible)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.plausible`.
    pub fn new() -> DeliveryResult<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            DeliveryError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the settings file path (~/.plausible/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the durable queue directory (~/.plausible/events).
    pub fn event_dir(&self) -> PathBuf {
        self.base_dir.join("events")
    }

    /// Get the logs directory (~/.plausible/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.plausible/logs/courier.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("courier.jsonl")
    }

    /// Ensure the base and logs directories exist.
    ///
    /// The event directory is owned by the queue, which creates it lazily.
    pub fn ensure_dirs(&self) -> DeliveryResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-plausible");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), base.as_path());
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.event_dir(), base.join("events"));
        assert_eq!(paths.logs_dir(), base.join("logs"));
        assert_eq!(paths.log_file(), base.join("logs/courier.jsonl"));
    }

    #[test]
    fn test_paths_default_under_home() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), home.join(".plausible").as_path());
    }

    #[test]
    fn test_ensure_dirs_is_idempotent() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("plausible"));

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(paths.base_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
        assert!(!paths.event_dir().exists());
    }
}
