//! List pending events.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use plausible_courier::{DurableQueue, RecordId};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct PendingEntry {
    record: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// List queued records without touching them. Corrupt records are reported.
pub async fn pending(ctx: &Context, format: &OutputFormat) -> Result<()> {
    let queue = ctx.queue();
    let mut records = queue.list_pending().await?;
    records.sort();

    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let entry = match queue.read(&record).await {
            Ok(event) => PendingEntry {
                record,
                name: Some(event.name().to_string()),
                url: Some(event.url().to_string()),
                error: None,
            },
            Err(e) => PendingEntry {
                record,
                name: None,
                url: None,
                error: Some(e.to_string()),
            },
        };
        entries.push(entry);
    }

    match format {
        OutputFormat::Json => output::print_json(&entries)?,
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No pending events");
                return Ok(());
            }
            println!("{:<42} {:<16} URL", "Record", "Name");
            println!("{}", "-".repeat(90));
            for entry in &entries {
                match (&entry.name, &entry.url, &entry.error) {
                    (Some(name), Some(url), _) => {
                        println!("{:<42} {:<16} {}", entry.record.as_str(), name, url)
                    }
                    (_, _, error) => println!(
                        "{:<42} corrupt: {}",
                        entry.record.as_str(),
                        error.as_deref().unwrap_or("unknown error")
                    ),
                }
            }
            println!("\n{} pending event(s) in {}", entries.len(), queue.dir().display());
        }
    }
    Ok(())
}
