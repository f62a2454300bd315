//! Event model and boundary normalization.
//!
//! An [`Event`] is built once at the API boundary, where the URL is made
//! fully-qualified and custom props are flattened to strings. After that the
//! value is immutable: retries and replays send exactly the same payload, and
//! the JSON written to the queue is the same JSON sent on the wire.

use crate::error::DeliveryResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Reserved event name for page views.
pub const PAGEVIEW: &str = "pageview";

/// Scheme used when the caller's URL has none.
const DEFAULT_SCHEME: &str = "app";

/// Authority used when the caller's URL has none.
const DEFAULT_AUTHORITY: &str = "localhost";

/// Custom event properties, already flattened to strings.
pub type Props = BTreeMap<String, String>;

/// One analytics occurrence to report to the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    domain: String,
    name: String,
    url: String,
    #[serde(default)]
    referrer: String,
    screen_width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    props: Option<Props>,
}

impl Event {
    /// Build an event, normalizing `url` so it always carries a scheme and an
    /// authority (`login` becomes `app://localhost/login`).
    pub fn new(
        domain: impl Into<String>,
        name: impl Into<String>,
        url: &str,
        referrer: impl Into<String>,
        screen_width: u32,
        props: Option<Props>,
    ) -> DeliveryResult<Self> {
        Ok(Self {
            domain: domain.into(),
            name: name.into(),
            url: normalize_url(url)?,
            referrer: referrer.into(),
            screen_width,
            props,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn referrer(&self) -> &str {
        &self.referrer
    }

    pub fn screen_width(&self) -> u32 {
        self.screen_width
    }

    pub fn props(&self) -> Option<&Props> {
        self.props.as_ref()
    }

    /// Whether this is the reserved `pageview` event.
    pub fn is_page_view(&self) -> bool {
        self.name == PAGEVIEW
    }

    /// Canonical JSON form, shared by the wire body and persisted records.
    pub fn to_json(&self) -> DeliveryResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an event from its canonical JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Flatten arbitrary scalar props to their string representation.
pub fn stringify_props<I, K, V>(props: I) -> Props
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    props
        .into_iter()
        .map(|(k, v)| (k.into(), v.to_string()))
        .collect()
}

/// Make `raw` fully-qualified.
///
/// URLs that already have a scheme and a host are returned untouched. A
/// missing scheme becomes `app`, a missing authority becomes `localhost`.
pub fn normalize_url(raw: &str) -> DeliveryResult<String> {
    let raw = raw.trim();

    if let Some((scheme, port, tail)) = split_blank_authority(raw) {
        let mut normalized = format!("{}://{}{}", scheme, DEFAULT_AUTHORITY, port);
        if !tail.starts_with('/') {
            normalized.push('/');
        }
        normalized.push_str(tail);
        Url::parse(&normalized)?;
        return Ok(normalized);
    }

    match Url::parse(raw) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(raw.to_string()),
        Ok(url) => {
            let mut normalized = format!("{}://{}", url.scheme(), DEFAULT_AUTHORITY);
            let path = url.path();
            if !path.starts_with('/') {
                normalized.push('/');
            }
            normalized.push_str(path);
            if let Some(query) = url.query() {
                normalized.push('?');
                normalized.push_str(query);
            }
            if let Some(fragment) = url.fragment() {
                normalized.push('#');
                normalized.push_str(fragment);
            }
            Ok(normalized)
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(&format!("{}://{}/", DEFAULT_SCHEME, DEFAULT_AUTHORITY))?;
            Ok(base.join(raw)?.to_string())
        }
        Err(e) => Err(e.into()),
    }
}

/// Splits `scheme://` URLs whose authority is empty or only a port into
/// scheme, port and the remaining path, query and fragment.
fn split_blank_authority(raw: &str) -> Option<(&str, &str, &str)> {
    let (scheme, rest) = raw.split_once("://")?;
    let valid_scheme = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(end);
    (valid_scheme && (authority.is_empty() || authority.starts_with(':')))
        .then_some((scheme, authority, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(props: Option<Props>) -> Event {
        Event::new("test.example.com", "signup", "/welcome", "https://ref.example", 123, props)
            .unwrap()
    }

    #[test]
    fn test_blank_authority_defaults_to_localhost() {
        assert_eq!(normalize_url("http:///path").unwrap(), "http://localhost/path");
        assert_eq!(normalize_url("https://").unwrap(), "https://localhost/");
        assert_eq!(normalize_url("http://?tab=2").unwrap(), "http://localhost/?tab=2");
        assert_eq!(normalize_url("http://:8080/x").unwrap(), "http://localhost:8080/x");
    }

    #[test]
    fn test_relative_path_gets_app_scheme_and_localhost() {
        assert_eq!(normalize_url("eventUrl").unwrap(), "app://localhost/eventUrl");
        assert_eq!(normalize_url("/login").unwrap(), "app://localhost/login");
        assert_eq!(normalize_url("").unwrap(), "app://localhost/");
    }

    #[test]
    fn test_absolute_url_is_untouched() {
        assert_eq!(
            normalize_url("https://example.com/pricing?plan=pro").unwrap(),
            "https://example.com/pricing?plan=pro"
        );
        assert_eq!(normalize_url("https://example.com").unwrap(), "https://example.com");
    }

    #[test]
    fn test_scheme_without_authority_gets_localhost() {
        assert_eq!(normalize_url("app:/settings").unwrap(), "app://localhost/settings");
        assert_eq!(
            normalize_url("myapp:screen?tab=2").unwrap(),
            "myapp://localhost/screen?tab=2"
        );
    }

    #[test]
    fn test_authority_without_scheme_gets_app() {
        assert_eq!(
            normalize_url("//shop.example/cart").unwrap(),
            "app://shop.example/cart"
        );
    }

    #[test]
    fn test_event_new_normalizes_url() {
        let event = sample_event(None);
        assert_eq!(event.url(), "app://localhost/welcome");
        assert_eq!(event.domain(), "test.example.com");
        assert_eq!(event.screen_width(), 123);
        assert!(!event.is_page_view());
    }

    #[test]
    fn test_stringify_props_uses_display_form() {
        let props = stringify_props([("count", 3.to_string()), ("flag", true.to_string())]);
        assert_eq!(props.get("count").map(String::as_str), Some("3"));
        assert_eq!(props.get("flag").map(String::as_str), Some("true"));

        let mixed = stringify_props(vec![("ratio", 0.5)]);
        assert_eq!(mixed.get("ratio").map(String::as_str), Some("0.5"));
    }

    #[test]
    fn test_wire_field_names() {
        let event = sample_event(Some(stringify_props([("plan", "pro")])));
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["domain"], "test.example.com");
        assert_eq!(value["name"], "signup");
        assert_eq!(value["url"], "app://localhost/welcome");
        assert_eq!(value["referrer"], "https://ref.example");
        assert_eq!(value["screen_width"], 123);
        assert_eq!(value["props"]["plan"], "pro");
    }

    #[test]
    fn test_absent_props_are_omitted() {
        let json = sample_event(None).to_json().unwrap();
        assert!(!json.contains("props"));
    }

    #[test]
    fn test_json_roundtrip_is_field_for_field_equal() {
        let event = sample_event(Some(stringify_props([("plan", "pro"), ("seats", "4")])));
        let decoded = Event::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_missing_referrer_defaults_to_empty() {
        let json = r#"{"domain":"d.example","name":"pageview","url":"app://localhost/","screen_width":10}"#;
        let event = Event::from_json(json).unwrap();
        assert_eq!(event.referrer(), "");
        assert!(event.is_page_view());
        assert!(event.props().is_none());
    }
}
