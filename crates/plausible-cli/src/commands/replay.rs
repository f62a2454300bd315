//! Replay pending events.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use plausible_courier::RetryPolicy;

/// Give every pending record one attempt and report the counts.
pub async fn replay(ctx: &Context, format: &OutputFormat) -> Result<()> {
    let engine = ctx.engine(RetryPolicy::default())?;
    let report = engine.replay().await?;

    match format {
        OutputFormat::Json => output::print_json(&report)?,
        OutputFormat::Text => {
            println!("Replay finished");
            output::print_row("Delivered", report.delivered);
            output::print_row("Failed", report.failed);
            output::print_row("Discarded", report.discarded);
            output::print_row("Skipped", report.skipped);
        }
    }
    Ok(())
}
