//! CLI command implementations.

mod pending;
mod replay;
mod send;

pub use pending::pending;
pub use replay::replay;
pub use send::send;

use anyhow::Result;
use plausible_courier::{
    DeliveryConfig, DeliveryEngine, FileQueue, HttpTransport, Paths, RetryPolicy, Settings,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Settings overrides taken from global flags.
#[derive(Debug, Default)]
pub struct Overrides {
    pub domain: Option<String>,
    pub host: Option<String>,
    pub user_agent: Option<String>,
    pub no_retry: bool,
}

/// Everything a command needs: paths, effective settings and live config.
pub struct Context {
    pub paths: Paths,
    pub settings: Settings,
    pub config: Arc<DeliveryConfig>,
}

impl Context {
    /// Load settings from the base directory, then apply flag overrides.
    pub fn load(base_dir: Option<PathBuf>, overrides: Overrides) -> Result<Self> {
        let paths = match base_dir {
            Some(dir) => Paths::with_base_dir(dir),
            None => Paths::new()?,
        };
        paths.ensure_dirs()?;

        let mut settings = Settings::load(&paths)?;
        if let Some(domain) = overrides.domain {
            settings.domain = domain;
        }
        if let Some(host) = overrides.host {
            settings.host = host;
        }
        if let Some(user_agent) = overrides.user_agent {
            settings.user_agent = user_agent;
        }
        if overrides.no_retry {
            settings.retry_on_failure = false;
        }

        let config = Arc::new(DeliveryConfig::from_settings(&settings, &paths)?);
        Ok(Self {
            paths,
            settings,
            config,
        })
    }

    pub fn queue(&self) -> FileQueue {
        FileQueue::new(self.config.event_dir())
    }

    /// Engine over the HTTP transport and the file queue.
    pub fn engine(&self, policy: RetryPolicy) -> Result<DeliveryEngine> {
        let transport = Arc::new(HttpTransport::new(self.config.clone())?);
        Ok(DeliveryEngine::new(
            self.config.clone(),
            transport,
            Arc::new(self.queue()),
            policy,
            Handle::current(),
        ))
    }
}

/// Policy for a one-shot process: one attempt, and a failed event is queued
/// for `plausible replay` right away instead of waiting out the backoff.
pub fn prompt_policy() -> RetryPolicy {
    RetryPolicy {
        retry_delays: Vec::new(),
        trailing_wait: Duration::ZERO,
        ..RetryPolicy::default()
    }
}

/// Parse a `key=value` property.
pub fn parse_prop(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prop() {
        assert_eq!(
            parse_prop("plan=pro").unwrap(),
            ("plan".to_string(), "pro".to_string())
        );
        assert_eq!(
            parse_prop("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_prop("empty=").unwrap().1, "");
        assert!(parse_prop("novalue").is_err());
        assert!(parse_prop("=value").is_err());
    }

    #[test]
    fn test_prompt_policy_never_waits() {
        let policy = prompt_policy();
        assert_eq!(policy.max_attempts(), 1);
        assert!(policy.trailing_wait.is_zero());
        assert_eq!(policy.attempt_timeout, RetryPolicy::default().attempt_timeout);
    }

    #[test]
    fn test_overrides_apply_over_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path());
        Settings {
            domain: "file.example".to_string(),
            ..Default::default()
        }
        .save(&paths)
        .unwrap();

        let ctx = Context::load(
            Some(dir.path().to_path_buf()),
            Overrides {
                host: Some("https://stats.example/api".to_string()),
                no_retry: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(ctx.config.domain(), "file.example");
        assert_eq!(ctx.config.host(), "https://stats.example/api");
        assert!(!ctx.config.retry_on_failure());
        assert_eq!(ctx.config.event_dir(), paths.event_dir().as_path());
    }
}
