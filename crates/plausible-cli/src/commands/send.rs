//! Deliver a single event.

use super::{prompt_policy, Context};
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use plausible_courier::{DeliveryOutcome, Event, RetryPolicy};

/// Build an event from flags and deliver it inline.
///
/// Without `wait` a failed event is queued after one attempt. With `wait`
/// the full retry schedule runs in-process first.
pub async fn send(
    ctx: &Context,
    name: &str,
    url: &str,
    referrer: &str,
    props: Vec<(String, String)>,
    wait: bool,
    format: &OutputFormat,
) -> Result<()> {
    let props = (!props.is_empty()).then(|| props.into_iter().collect());
    let event = Event::new(
        ctx.config.domain(),
        name,
        url,
        referrer,
        ctx.config.screen_width(),
        props,
    )?;

    if ctx.config.domain().is_empty() {
        tracing::warn!("No domain configured; the collector will reject this event");
    }

    let policy = if wait {
        RetryPolicy::default()
    } else {
        prompt_policy()
    };
    let engine = ctx.engine(policy)?;
    let outcome = engine.deliver(event).await;

    match format {
        OutputFormat::Json => output::print_json(&outcome)?,
        OutputFormat::Text => match &outcome {
            DeliveryOutcome::Delivered { attempts } => {
                println!("Delivered after {attempts} attempt(s)");
            }
            DeliveryOutcome::Pending { attempts, record } => {
                println!("Not delivered after {attempts} attempt(s); queued as {record}");
                println!("Run 'plausible replay' to try again");
            }
            DeliveryOutcome::Disabled => println!("Sending is disabled; event discarded"),
            DeliveryOutcome::Dropped { .. } => {}
        },
    }

    if let DeliveryOutcome::Dropped { attempts } = outcome {
        bail!("Event dropped after {attempts} attempt(s)");
    }
    Ok(())
}
