//! Application-facing client.

use crate::event::{stringify_props, PAGEVIEW};
use crate::{
    DeliveryConfig, DeliveryEngine, DeliveryResult, Event, FileQueue, HttpTransport, RetryPolicy,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info};

/// Fire-and-forget analytics client.
///
/// Every tracking call returns immediately; delivery, retry and persistence
/// happen on background tasks owned by the [`DeliveryEngine`].
///
/// ```rust,ignore
/// let config = Arc::new(DeliveryConfig::from_settings(&settings, &paths)?);
/// let plausible = Plausible::start(config, Handle::current())?;
/// plausible.page_view("/home", "", Props::new());
/// plausible.event("signup", "/welcome", "", [("plan", "pro")]);
/// ```
#[derive(Debug)]
pub struct Plausible {
    config: Arc<DeliveryConfig>,
    engine: DeliveryEngine,
}

impl Plausible {
    /// Wire the HTTP transport and the file queue under the configured event
    /// directory, then replay whatever a previous run left behind.
    pub fn start(config: Arc<DeliveryConfig>, runtime: Handle) -> DeliveryResult<Self> {
        let transport = Arc::new(HttpTransport::new(config.clone())?);
        let queue = Arc::new(FileQueue::new(config.event_dir()));
        let engine = DeliveryEngine::new(
            config.clone(),
            transport,
            queue,
            RetryPolicy::default(),
            runtime,
        );

        info!(
            host = %config.host(),
            event_dir = %config.event_dir().display(),
            "Plausible client started"
        );

        let client = Self::with_parts(config, engine);
        client.engine.start_replay();
        Ok(client)
    }

    /// Build a client around an existing engine. No replay is started.
    pub fn with_parts(config: Arc<DeliveryConfig>, engine: DeliveryEngine) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &Arc<DeliveryConfig> {
        &self.config
    }

    pub fn engine(&self) -> &DeliveryEngine {
        &self.engine
    }

    /// Turn sending on or off. Takes effect on the next attempt of every
    /// in-flight event.
    pub fn enable(&self, enable: bool) {
        self.config.set_enable(enable);
    }

    pub fn set_user_agent(&self, user_agent: &str) {
        self.config.set_user_agent(user_agent);
    }

    pub fn set_host(&self, host: &str) {
        self.config.set_host(host);
    }

    pub fn set_domain(&self, domain: &str) -> DeliveryResult<()> {
        self.config.set_domain(domain)
    }

    /// Record a page view.
    pub fn page_view<I, K, V>(&self, url: &str, referrer: &str, props: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.event(PAGEVIEW, url, referrer, props);
    }

    /// Record a custom event. An empty `props` sends no props at all.
    pub fn event<I, K, V>(&self, name: &str, url: &str, referrer: &str, props: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let props = stringify_props(props);
        let props = (!props.is_empty()).then_some(props);

        match Event::new(
            self.config.domain(),
            name,
            url,
            referrer,
            self.config.screen_width(),
            props,
        ) {
            Ok(event) => self.engine.submit(event),
            Err(e) => error!(name, url, error = %e, "Dropping event with invalid URL"),
        }
    }

    /// Wait for every in-flight delivery to finish.
    pub async fn flush(&self) {
        self.engine.flush().await;
    }

    /// Cancel in-flight deliveries. Persisted records are replayed on the
    /// next start.
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}
