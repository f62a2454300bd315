//! Live delivery configuration.
//!
//! [`DeliveryConfig`] is shared between the facade and every delivery task.
//! Each field is read atomically on every attempt, so toggling `enable` or
//! changing the host takes effect for the next attempt of any in-flight event.

use crate::{DeliveryError, DeliveryResult, Paths, Settings};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::{Host, Url};

/// Default collector base URL.
pub const DEFAULT_HOST: &str = "https://plausible.io/api";

/// Screen width reported when the embedding application does not know better.
pub const DEFAULT_SCREEN_WIDTH: u32 = 1280;

/// User agent sent when none is configured.
pub fn default_user_agent() -> String {
    format!(
        "plausible-courier/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Thread-safe configuration provider consumed by the delivery engine.
#[derive(Debug)]
pub struct DeliveryConfig {
    enable: AtomicBool,
    retry_on_failure: AtomicBool,
    domain: RwLock<String>,
    host: RwLock<String>,
    user_agent: RwLock<String>,
    event_dir: PathBuf,
    screen_width: u32,
}

impl DeliveryConfig {
    /// Create a config with defaults: enabled, retrying, default host and
    /// user agent, empty domain.
    pub fn new(event_dir: impl Into<PathBuf>, screen_width: u32) -> Self {
        Self {
            enable: AtomicBool::new(true),
            retry_on_failure: AtomicBool::new(true),
            domain: RwLock::new(String::new()),
            host: RwLock::new(DEFAULT_HOST.to_string()),
            user_agent: RwLock::new(default_user_agent()),
            event_dir: event_dir.into(),
            screen_width,
        }
    }

    /// Build the live config from persisted settings.
    pub fn from_settings(settings: &Settings, paths: &Paths) -> DeliveryResult<Self> {
        let config = Self::new(paths.event_dir(), settings.screen_width);
        config.set_enable(settings.enable);
        config.set_retry_on_failure(settings.retry_on_failure);
        config.set_domain(&settings.domain)?;
        config.set_host(&settings.host);
        config.set_user_agent(&settings.user_agent);
        Ok(config)
    }

    pub fn enable(&self) -> bool {
        self.enable.load(Ordering::SeqCst)
    }

    pub fn set_enable(&self, enable: bool) {
        self.enable.store(enable, Ordering::SeqCst);
    }

    pub fn retry_on_failure(&self) -> bool {
        self.retry_on_failure.load(Ordering::SeqCst)
    }

    /// Resending later skews analytics: the Events API has no timestamp
    /// field, so a retried event is recorded at resend time.
    pub fn set_retry_on_failure(&self, retry: bool) {
        self.retry_on_failure.store(retry, Ordering::SeqCst);
    }

    pub fn domain(&self) -> String {
        self.domain.read().clone()
    }

    /// Set the site domain. Must be empty or a bare host name.
    pub fn set_domain(&self, domain: &str) -> DeliveryResult<()> {
        validate_domain(domain)?;
        *self.domain.write() = domain.to_string();
        Ok(())
    }

    pub fn host(&self) -> String {
        self.host.read().clone()
    }

    /// Set the collector base URL. Blank resets to [`DEFAULT_HOST`].
    pub fn set_host(&self, host: &str) {
        let host = host.trim();
        *self.host.write() = if host.is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host.to_string()
        };
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.read().clone()
    }

    /// Set the user agent. Blank resets to [`default_user_agent`].
    ///
    /// The collector derives its unique-visitor hash and device report from
    /// this value.
    pub fn set_user_agent(&self, user_agent: &str) {
        let user_agent = user_agent.trim();
        *self.user_agent.write() = if user_agent.is_empty() {
            default_user_agent()
        } else {
            user_agent.to_string()
        };
    }

    pub fn event_dir(&self) -> &Path {
        &self.event_dir
    }

    pub fn screen_width(&self) -> u32 {
        self.screen_width
    }
}

fn validate_domain(domain: &str) -> DeliveryResult<()> {
    if domain.is_empty() {
        return Ok(());
    }

    let invalid = || DeliveryError::Config(format!("Invalid domain: {domain:?}"));
    if domain.contains(['/', '?', '#', '@', ' ']) {
        return Err(invalid());
    }
    let url = Url::parse(&format!("https://{domain}")).map_err(|_| invalid())?;
    match url.host() {
        Some(Host::Domain(_)) | Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => Ok(()),
        None => Err(invalid()),
    }
}

/// Backoff schedule and attempt bound for the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before each retry attempt; one retry per entry.
    pub retry_delays: Vec<Duration>,
    /// Wait after the last failed retry before the loop gives up. No attempt
    /// follows it; the persisted record is left for the next replay.
    pub trailing_wait: Duration,
    /// Upper bound on a single delivery attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(60),
                Duration::from_secs(360),
            ],
            trailing_wait: Duration::from_secs(600),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Maximum attempts per event within one process lifetime.
    pub fn max_attempts(&self) -> usize {
        1 + self.retry_delays.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> DeliveryConfig {
        DeliveryConfig::new("/tmp/plausible-events", 123)
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert!(config.enable());
        assert!(config.retry_on_failure());
        assert_eq!(config.host(), DEFAULT_HOST);
        assert_eq!(config.user_agent(), default_user_agent());
        assert_eq!(config.domain(), "");
        assert_eq!(config.screen_width(), 123);
        assert_eq!(config.event_dir(), Path::new("/tmp/plausible-events"));
    }

    #[test]
    fn test_blank_host_and_user_agent_reset_to_defaults() {
        let config = config();
        config.set_host("https://stats.example/api");
        config.set_user_agent("test user agent");
        assert_eq!(config.host(), "https://stats.example/api");
        assert_eq!(config.user_agent(), "test user agent");

        config.set_host("   ");
        config.set_user_agent("");
        assert_eq!(config.host(), DEFAULT_HOST);
        assert_eq!(config.user_agent(), default_user_agent());
    }

    #[test]
    fn test_domain_validation() {
        let config = config();
        config.set_domain("test.example.com").unwrap();
        assert_eq!(config.domain(), "test.example.com");

        config.set_domain("").unwrap();
        assert_eq!(config.domain(), "");

        assert!(config.set_domain("not a domain").is_err());
        assert!(config.set_domain("example.com/path").is_err());
        assert_eq!(config.domain(), "");
    }

    #[test]
    fn test_flags_toggle() {
        let config = config();
        config.set_enable(false);
        config.set_retry_on_failure(false);
        assert!(!config.enable());
        assert!(!config.retry_on_failure());
    }

    #[test]
    fn test_from_settings() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let settings = Settings {
            enable: false,
            domain: "settings.example".to_string(),
            host: String::new(),
            user_agent: "custom-agent/1.0".to_string(),
            screen_width: 390,
            ..Default::default()
        };

        let config = DeliveryConfig::from_settings(&settings, &paths).unwrap();
        assert!(!config.enable());
        assert_eq!(config.domain(), "settings.example");
        assert_eq!(config.host(), DEFAULT_HOST);
        assert_eq!(config.user_agent(), "custom-agent/1.0");
        assert_eq!(config.screen_width(), 390);
        assert_eq!(config.event_dir(), paths.event_dir().as_path());
    }

    #[test]
    fn test_from_settings_rejects_bad_domain() {
        let paths = Paths::with_base_dir("/tmp/plausible-bad-domain");
        let settings = Settings {
            domain: "bad domain".to_string(),
            ..Default::default()
        };
        assert!(DeliveryConfig::from_settings(&settings, &paths).is_err());
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.retry_delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(60),
                Duration::from_secs(360)
            ]
        );
        assert_eq!(policy.trailing_wait, Duration::from_secs(600));
        assert_eq!(policy.max_attempts(), 4);
    }
}
