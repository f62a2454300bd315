//! Network-first delivery engine.
//!
//! Every submitted event gets its own task. The task tries to post the event
//! right away; if that fails and retries are enabled, the event is written to
//! the [`DurableQueue`] and retried on the [`RetryPolicy`] schedule. Records
//! that outlive the retry loop are picked up by [`DeliveryEngine::replay`] on
//! the next start.
//!
//! Retried and replayed events carry no origination time, so the collector
//! records them at resend time.

use crate::{DeliveryConfig, DeliveryError, DeliveryResult, DurableQueue, Event, RecordId};
use crate::{RetryPolicy, Transport};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::task::Poll;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Terminal result of one in-process delivery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The collector accepted the event.
    Delivered { attempts: usize },
    /// Delivery failed and nothing was kept: retries were disabled, the
    /// failure was not a transport failure, or the retry loop ran out
    /// without a persisted record.
    Dropped { attempts: usize },
    /// Retries were exhausted; the record stays queued for the next replay.
    Pending { attempts: usize, record: RecordId },
    /// Sending is disabled; nothing was attempted or kept.
    Disabled,
}

/// Counters from one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Records delivered and removed.
    pub delivered: usize,
    /// Records left in place after a failed attempt or read.
    pub failed: usize,
    /// Corrupt records removed.
    pub discarded: usize,
    /// Records left in place because sending is disabled.
    pub skipped: usize,
}

/// Result of a single gated attempt.
enum Attempt {
    Sent,
    Skipped,
    Failed(DeliveryError),
}

enum DeliveryState<'a> {
    New,
    Pending {
        claim: Option<Claim<'a>>,
        retry: usize,
    },
}

/// Marks a record as owned by a live retry loop so replay leaves it alone.
/// Released on drop, including when the task is cancelled.
struct Claim<'a> {
    claimed: &'a Mutex<HashSet<RecordId>>,
    record: RecordId,
}

impl<'a> Claim<'a> {
    fn new(claimed: &'a Mutex<HashSet<RecordId>>, record: RecordId) -> Self {
        claimed.lock().insert(record.clone());
        Self { claimed, record }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claimed.lock().remove(&self.record);
    }
}

struct EngineInner {
    config: Arc<DeliveryConfig>,
    transport: Arc<dyn Transport>,
    queue: Arc<dyn DurableQueue>,
    policy: RetryPolicy,
    claimed: Mutex<HashSet<RecordId>>,
}

/// Delivery engine; owns the durable queue and all delivery tasks.
///
/// Dropping the engine cancels in-flight tasks. Their records stay on disk
/// and are replayed on the next start.
pub struct DeliveryEngine {
    inner: Arc<EngineInner>,
    tasks: Mutex<JoinSet<()>>,
    runtime: Handle,
}

impl DeliveryEngine {
    /// Create an engine. Background tasks are spawned on `runtime`.
    pub fn new(
        config: Arc<DeliveryConfig>,
        transport: Arc<dyn Transport>,
        queue: Arc<dyn DurableQueue>,
        policy: RetryPolicy,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                transport,
                queue,
                policy,
                claimed: Mutex::new(HashSet::new()),
            }),
            tasks: Mutex::new(JoinSet::new()),
            runtime,
        }
    }

    pub fn config(&self) -> &Arc<DeliveryConfig> {
        &self.inner.config
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Schedule delivery of `event` and return immediately.
    pub fn submit(&self, event: Event) {
        let inner = self.inner.clone();
        let mut tasks = self.tasks.lock();
        reap_finished(&mut tasks);
        tasks.spawn_on(
            async move {
                inner.deliver(event).await;
            },
            &self.runtime,
        );
    }

    /// Run the delivery protocol for `event` on the current task.
    pub async fn deliver(&self, event: Event) -> DeliveryOutcome {
        self.inner.deliver(event).await
    }

    /// Start one replay pass in the background.
    pub fn start_replay(&self) {
        let inner = self.inner.clone();
        let mut tasks = self.tasks.lock();
        reap_finished(&mut tasks);
        tasks.spawn_on(
            async move {
                if let Err(e) = inner.replay().await {
                    error!(error = %e, "Replay of pending events failed");
                }
            },
            &self.runtime,
        );
    }

    /// Give every persisted record one delivery attempt.
    pub async fn replay(&self) -> DeliveryResult<ReplayReport> {
        self.inner.replay().await
    }

    /// Wait until every background task has finished, including tasks
    /// submitted while waiting. The task set stays in place, so
    /// [`shutdown`](Self::shutdown) still reaches every task mid-flush.
    pub async fn flush(&self) {
        std::future::poll_fn(|cx| {
            let mut tasks = self.tasks.lock();
            loop {
                match tasks.poll_join_next(cx) {
                    Poll::Ready(Some(result)) => log_join_result(result),
                    Poll::Ready(None) => return Poll::Ready(()),
                    Poll::Pending => return Poll::Pending,
                }
            }
        })
        .await
    }

    /// Cancel all background tasks. Records of interrupted retry loops stay
    /// queued.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            info!(tasks = tasks.len(), "Cancelling in-flight deliveries");
        }
        tasks.abort_all();
    }

    /// Number of background tasks not yet reaped.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.tasks.lock();
        reap_finished(&mut tasks);
        tasks.len()
    }
}

impl std::fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        log_join_result(result);
    }
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Delivery task panicked");
        }
    }
}

impl EngineInner {
    /// One attempt, gated on the enable flag and bounded by the attempt
    /// timeout.
    async fn attempt(&self, event: &Event) -> Attempt {
        if !self.config.enable() {
            warn!(name = %event.name(), "Plausible disabled, not sending event");
            return Attempt::Skipped;
        }

        let timeout = self.policy.attempt_timeout;
        match tokio::time::timeout(timeout, self.transport.post(event)).await {
            Ok(Ok(())) => Attempt::Sent,
            Ok(Err(e)) => Attempt::Failed(e),
            Err(_) => Attempt::Failed(DeliveryError::Timeout(timeout.as_secs())),
        }
    }

    async fn deliver(&self, event: Event) -> DeliveryOutcome {
        let mut attempts = 0;
        let mut state = DeliveryState::New;

        loop {
            state = match state {
                DeliveryState::New => {
                    attempts += 1;
                    match self.attempt(&event).await {
                        Attempt::Sent => {
                            debug!(name = %event.name(), "Event delivered");
                            return DeliveryOutcome::Delivered { attempts };
                        }
                        Attempt::Skipped => return DeliveryOutcome::Disabled,
                        Attempt::Failed(e) if !e.is_transport_failure() => {
                            error!(name = %event.name(), error = %e, "Event cannot be sent; dropping");
                            return DeliveryOutcome::Dropped { attempts };
                        }
                        Attempt::Failed(e) => {
                            if !self.config.retry_on_failure() {
                                warn!(
                                    name = %event.name(),
                                    error = %e,
                                    "Failed to send event, retries disabled; dropping"
                                );
                                return DeliveryOutcome::Dropped { attempts };
                            }

                            // Claimed before the record becomes visible to replay.
                            let claim = Claim::new(&self.claimed, RecordId::generate());
                            let persisted = self.queue.persist_as(&claim.record, &event).await;
                            let claim = match persisted {
                                Ok(()) => {
                                    warn!(
                                        name = %event.name(),
                                        record = %claim.record,
                                        error = %e,
                                        "Failed to send event, queued for retry"
                                    );
                                    Some(claim)
                                }
                                Err(persist_err) => {
                                    error!(
                                        name = %event.name(),
                                        error = %e,
                                        persist_error = %persist_err,
                                        "Failed to send event and to persist it; retrying in memory"
                                    );
                                    None
                                }
                            };
                            DeliveryState::Pending { claim, retry: 0 }
                        }
                    }
                }

                DeliveryState::Pending { claim, retry } => {
                    let Some(delay) = self.policy.retry_delays.get(retry).copied() else {
                        return self.give_up(claim, attempts).await;
                    };

                    tokio::time::sleep(delay).await;
                    attempts += 1;

                    match self.attempt(&event).await {
                        Attempt::Sent => {
                            self.release(claim).await;
                            info!(name = %event.name(), attempts, "Event delivered after retry");
                            return DeliveryOutcome::Delivered { attempts };
                        }
                        Attempt::Skipped => {
                            self.release(claim).await;
                            return DeliveryOutcome::Disabled;
                        }
                        Attempt::Failed(e) if !e.is_transport_failure() => {
                            self.release(claim).await;
                            error!(name = %event.name(), error = %e, "Event cannot be sent; dropping");
                            return DeliveryOutcome::Dropped { attempts };
                        }
                        Attempt::Failed(e) => {
                            warn!(
                                name = %event.name(),
                                attempt = attempts,
                                error = %e,
                                "Retry failed"
                            );
                            DeliveryState::Pending {
                                claim,
                                retry: retry + 1,
                            }
                        }
                    }
                }
            };
        }
    }

    /// Delete the record of a consumed event.
    async fn release(&self, claim: Option<Claim<'_>>) {
        let Some(claim) = claim else {
            return;
        };
        if let Err(e) = self.queue.delete(&claim.record).await {
            warn!(record = %claim.record, error = %e, "Failed to delete delivered record");
        }
    }

    /// Wait out the trailing delay, then leave the record for replay.
    async fn give_up(&self, claim: Option<Claim<'_>>, attempts: usize) -> DeliveryOutcome {
        if !self.policy.trailing_wait.is_zero() {
            tokio::time::sleep(self.policy.trailing_wait).await;
        }

        match claim {
            Some(claim) => {
                warn!(
                    record = %claim.record,
                    attempts,
                    "Retries exhausted, leaving event for next replay"
                );
                DeliveryOutcome::Pending {
                    attempts,
                    record: claim.record.clone(),
                }
            }
            None => {
                error!(attempts, "Retries exhausted and event was never persisted; dropping");
                DeliveryOutcome::Dropped { attempts }
            }
        }
    }

    async fn replay(&self) -> DeliveryResult<ReplayReport> {
        let records = self.queue.list_pending().await?;
        let mut report = ReplayReport::default();

        if !records.is_empty() {
            info!(count = records.len(), "Replaying pending events");
        }

        for record in records {
            if self.claimed.lock().contains(&record) {
                debug!(record = %record, "Record owned by a live retry loop, skipping");
                continue;
            }

            let event = match self.queue.read(&record).await {
                Ok(event) => event,
                Err(e @ DeliveryError::Decode { .. }) => {
                    error!(record = %record, error = %e, "Failed to decode event JSON, discarding");
                    if let Err(e) = self.queue.delete(&record).await {
                        warn!(record = %record, error = %e, "Failed to delete corrupt record");
                    }
                    report.discarded += 1;
                    continue;
                }
                Err(DeliveryError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(record = %record, "Record vanished before replay");
                    continue;
                }
                Err(e) => {
                    warn!(record = %record, error = %e, "Failed to read pending record");
                    report.failed += 1;
                    continue;
                }
            };

            match self.attempt(&event).await {
                Attempt::Sent => {
                    if let Err(e) = self.queue.delete(&record).await {
                        warn!(record = %record, error = %e, "Failed to delete replayed record");
                    }
                    report.delivered += 1;
                }
                Attempt::Skipped => report.skipped += 1,
                Attempt::Failed(e) => {
                    debug!(record = %record, error = %e, "Replay attempt failed, keeping record");
                    report.failed += 1;
                }
            }
        }

        if report != ReplayReport::default() {
            info!(
                delivered = report.delivered,
                failed = report.failed,
                discarded = report.discarded,
                skipped = report.skipped,
                "Replay finished"
            );
        }
        Ok(report)
    }
}
