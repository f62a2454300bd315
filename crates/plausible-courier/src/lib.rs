//! Reliable delivery of analytics events to a Plausible-compatible collector.
//!
//! This crate provides:
//! - Plausible: fire-and-forget client facade
//! - DeliveryEngine: network-first delivery with a bounded retry loop and
//!   startup replay
//! - DurableQueue: on-disk (or in-memory) store of events awaiting retry
//! - Transport: single-shot HTTP delivery

mod client;
mod config;
mod engine;
mod error;
mod event;
mod paths;
mod queue;
mod settings;
mod transport;

#[cfg(test)]
mod tests;

pub use client::Plausible;
pub use config::{
    default_user_agent, DeliveryConfig, RetryPolicy, DEFAULT_HOST, DEFAULT_SCREEN_WIDTH,
};
pub use engine::{DeliveryEngine, DeliveryOutcome, ReplayReport};
pub use error::{DeliveryError, DeliveryResult};
pub use event::{normalize_url, stringify_props, Event, Props, PAGEVIEW};
pub use paths::Paths;
pub use queue::{DurableQueue, FileQueue, MemoryQueue, RecordId};
pub use settings::{Settings, DEFAULT_LOG_LEVEL};
pub use transport::{event_endpoint, HttpTransport, Transport, DEFAULT_REQUEST_TIMEOUT};
