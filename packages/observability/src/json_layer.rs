//! JSONL layer.
//!
//! One object per event: `timestamp` (RFC 3339, microseconds), `level`,
//! `service`, `pid`, `target`, `message`, plus `fields` and `span` when
//! present.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// A single structured log line.
#[derive(Debug, Serialize)]
pub struct LogEntry<'a> {
    pub timestamp: String,
    pub level: &'static str,
    pub service: &'a str,
    pub pid: u32,
    pub target: &'a str,
    pub message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<&'static str>,
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl EntryVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EntryVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

/// Layer writing one JSON object per event through `W`.
pub struct JsonLayer<W> {
    service: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: impl Into<String>, make_writer: W) -> Self {
        Self {
            service: service.into(),
            pid: std::process::id(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: metadata.level().as_str(),
            service: &self.service,
            pid: self.pid,
            target: metadata.target(),
            message: visitor.message,
            fields: visitor.fields,
            span: ctx.event_span(event).map(|span| span.name()),
        };

        if let Ok(line) = serde_json::to_string(&entry) {
            let mut writer = self.make_writer.make_writer();
            let _ = writeln!(writer, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::AppendMakeWriter;
    use tempfile::tempdir;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_event_is_written_as_one_json_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.jsonl");
        let writer = AppendMakeWriter::open(&path).unwrap();
        let subscriber = tracing_subscriber::registry().with(JsonLayer::new("courier", writer));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(record = "event_01.json", attempt = 2u64, "Retry failed");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);

        let value: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["service"], "courier");
        assert_eq!(value["message"], "Retry failed");
        assert_eq!(value["fields"]["record"], "event_01.json");
        assert_eq!(value["fields"]["attempt"], 2);
        assert_eq!(value["pid"], std::process::id());
        assert!(value.get("span").is_none());
    }

    #[test]
    fn test_span_name_is_recorded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.jsonl");
        let writer = AppendMakeWriter::open(&path).unwrap();
        let subscriber = tracing_subscriber::registry().with(JsonLayer::new("cli", writer));

        tracing::subscriber::with_default(subscriber, || {
            let _guard = tracing::info_span!("replay").entered();
            tracing::info!("Replay finished");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(value["span"], "replay");
        assert!(value.get("fields").is_none());
    }
}
