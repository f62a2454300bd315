//! Single-shot HTTP delivery of one event.

use crate::{DeliveryConfig, DeliveryError, DeliveryResult, Event};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Request timeout for the HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Performs exactly one delivery attempt per call.
///
/// Implementations never retry or persist. Dropping the returned future
/// abandons the in-flight request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, event: &Event) -> DeliveryResult<()>;
}

/// Transport posting to `<host>/event` with reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<DeliveryConfig>,
}

impl HttpTransport {
    /// Create a transport with the default request timeout.
    pub fn new(config: Arc<DeliveryConfig>) -> DeliveryResult<Self> {
        Self::with_timeout(config, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(config: Arc<DeliveryConfig>, timeout: Duration) -> DeliveryResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    /// The endpoint for the currently configured host.
    pub fn endpoint(&self) -> DeliveryResult<Url> {
        event_endpoint(&self.config.host())
    }
}

/// Append the `event` path segment to the collector base URL.
pub fn event_endpoint(host: &str) -> DeliveryResult<Url> {
    let mut url = Url::parse(host)?;
    url.path_segments_mut()
        .map_err(|_| DeliveryError::InvalidUrl(format!("{host} cannot be a base URL")))?
        .pop_if_empty()
        .push("event");
    Ok(url)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, event: &Event) -> DeliveryResult<()> {
        let url = self.endpoint()?;

        debug!(url = %url, name = %event.name(), "Posting event");

        let response = self
            .client
            .post(url)
            .header(USER_AGENT, self.config.user_agent())
            .header(CONTENT_TYPE, "application/json")
            .body(event.to_json()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
