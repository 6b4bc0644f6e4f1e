//! Per-sink delivery queue with pacing and bounded retry.
//!
//! One drain loop owns each queue, so a sink never sees overlapping calls:
//!
//! ```text
//! enqueue ──► inbox (unbounded) ──► pending (FIFO) ──► [pace] ──► SinkAdapter::deliver
//!                                       ▲                              │ failure
//!                                       └──── waiting (backoff) ◄──────┘
//! ```
//!
//! Failed items rejoin the tail once their backoff elapses. The backoff grows
//! with the sink's consecutive-error count, not the item's own retry count, so
//! a struggling sink slows the whole queue down.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::collaborator::{DeliveryOutcome, SinkAdapter};
use crate::policy::{BackoffConfig, BackoffPolicy};
use crate::shutdown::{shutdown_signalled, sleep_until_opt};
use crate::types::DeliveryItem;

/// Configuration for one sink's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Minimum spacing between two calls to the sink, in milliseconds.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Per-call timeout, in milliseconds. A timeout counts as a failure.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Retries allowed per item. A failure with this many retries already
    /// spent drops the item, so it gets `max_retries + 1` calls in total.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "BackoffConfig::delivery")]
    pub backoff: BackoffConfig,
}

fn default_min_interval_ms() -> u64 { 2_000 }
fn default_delivery_timeout_ms() -> u64 { 10_000 }
fn default_max_retries() -> u32 { 5 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            max_retries: default_max_retries(),
            backoff: BackoffConfig::delivery(),
        }
    }
}

impl QueueConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

/// Per-item lifecycle notifications emitted by a drain loop.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryReport {
    Delivered {
        sink: String,
        entity_key: String,
        /// Total calls made for this item, including the successful one.
        attempts: u32,
        /// Time from enqueue to the start of the successful call.
        waited: Duration,
    },
    Retrying {
        sink: String,
        entity_key: String,
        retries: u32,
        delay: Duration,
    },
    /// Permanent failure: the item hit the retry ceiling and was discarded.
    Dropped {
        sink: String,
        entity_key: String,
        retries: u32,
        reason: String,
    },
}

/// Counters returned when a drain loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub delivered: u64,
    pub retried: u64,
    pub dropped: u64,
    /// Items still queued or waiting when the loop was told to stop.
    pub abandoned: u64,
}

/// Producer side of a [`DeliveryQueue`]. Cheap to clone.
#[derive(Clone)]
pub struct QueueHandle {
    sink: Arc<str>,
    tx: mpsc::UnboundedSender<DeliveryItem>,
}

impl QueueHandle {
    /// Append `item` to the tail. Never blocks.
    ///
    /// Returns `false` if the drain loop has already stopped.
    pub fn enqueue(&self, item: DeliveryItem) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn sink_name(&self) -> &str {
        &self.sink
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle").field("sink", &self.sink).finish()
    }
}

/// Drain loop state for a single sink.
pub struct DeliveryQueue {
    sink: Arc<dyn SinkAdapter>,
    sink_name: Arc<str>,
    config: QueueConfig,
    backoff: BackoffPolicy,
    inbox: mpsc::UnboundedReceiver<DeliveryItem>,
    inbox_open: bool,
    pending: VecDeque<DeliveryItem>,
    /// Failed items and the instant they may rejoin `pending`.
    waiting: Vec<(Instant, DeliveryItem)>,
    last_attempt: Option<Instant>,
    paused_until: Option<Instant>,
    consecutive_errors: u32,
    shutdown: watch::Receiver<bool>,
    stopping: bool,
    reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
    stats: QueueStats,
}

impl DeliveryQueue {
    /// Create a queue for `sink`. The loop does nothing until [`spawn`](Self::spawn)
    /// or [`run`](Self::run) is called; items enqueued before that are kept.
    pub fn new(
        sink: Arc<dyn SinkAdapter>,
        config: QueueConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, QueueHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let sink_name: Arc<str> = Arc::from(sink.name());
        let handle = QueueHandle {
            sink: Arc::clone(&sink_name),
            tx,
        };
        let queue = Self {
            backoff: BackoffPolicy::new(&config.backoff),
            sink,
            sink_name,
            config,
            inbox,
            inbox_open: true,
            pending: VecDeque::new(),
            waiting: Vec::new(),
            last_attempt: None,
            paused_until: None,
            consecutive_errors: 0,
            shutdown,
            stopping: false,
            reports: None,
            stats: QueueStats::default(),
        };
        (queue, handle)
    }

    /// Send [`DeliveryReport`]s to `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<DeliveryReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Run the drain loop on a new Tokio task.
    pub fn spawn(self) -> JoinHandle<QueueStats> {
        tokio::spawn(self.run())
    }

    /// Drain until shutdown is signalled, or until every handle is dropped and
    /// nothing is left to deliver.
    pub async fn run(mut self) -> QueueStats {
        tracing::info!(sink = %self.sink_name, "delivery queue started");

        loop {
            if self.stopping || *self.shutdown.borrow() {
                break;
            }

            self.drain_inbox();
            self.promote_due();

            if self.pending.is_empty() {
                if !self.inbox_open && self.waiting.is_empty() {
                    break;
                }
                self.wait_for_work().await;
                continue;
            }

            if let Some(ready_at) = self.next_slot() {
                if Instant::now() < ready_at {
                    tokio::select! {
                        _ = time::sleep_until(ready_at) => {}
                        _ = shutdown_signalled(&mut self.shutdown) => self.stopping = true,
                    }
                    continue;
                }
            }

            if let Some(item) = self.pending.pop_front() {
                self.deliver(item).await;
            }
        }

        self.inbox.close();
        self.drain_inbox();
        self.stats.abandoned = (self.pending.len() + self.waiting.len()) as u64;
        if self.stats.abandoned > 0 {
            tracing::warn!(
                sink = %self.sink_name,
                abandoned = self.stats.abandoned,
                "delivery queue stopped with undelivered items"
            );
        }
        tracing::info!(
            sink = %self.sink_name,
            delivered = self.stats.delivered,
            retried = self.stats.retried,
            dropped = self.stats.dropped,
            "delivery queue stopped"
        );
        self.stats
    }

    /// Earliest instant the next call may start.
    fn next_slot(&self) -> Option<Instant> {
        let paced = self.last_attempt.map(|t| t + self.config.min_interval());
        match (paced, self.paused_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn drain_inbox(&mut self) {
        loop {
            match self.inbox.try_recv() {
                Ok(item) => self.pending.push_back(item),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.inbox_open = false;
                    break;
                }
            }
        }
    }

    fn promote_due(&mut self) {
        if self.waiting.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.waiting.len() {
            if self.waiting[i].0 <= now {
                due.push(self.waiting.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|(at, _)| *at);
        self.pending.extend(due.into_iter().map(|(_, item)| item));
    }

    async fn wait_for_work(&mut self) {
        let next_due = self.waiting.iter().map(|(at, _)| *at).min();
        let inbox_open = self.inbox_open;

        tokio::select! {
            item = self.inbox.recv(), if inbox_open => match item {
                Some(item) => self.pending.push_back(item),
                None => self.inbox_open = false,
            },
            _ = sleep_until_opt(next_due) => {}
            _ = shutdown_signalled(&mut self.shutdown) => self.stopping = true,
        }
    }

    async fn deliver(&mut self, item: DeliveryItem) {
        let started = Instant::now();
        self.last_attempt = Some(started);
        tracing::debug!(
            sink = %self.sink_name,
            entity = %item.entity_key,
            attempt = item.retries + 1,
            queued = self.pending.len(),
            "delivering"
        );

        let outcome = match time::timeout(
            self.config.delivery_timeout(),
            self.sink.deliver(&item.payload),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::Failed {
                reason: format!("timed out after {}ms", self.config.delivery_timeout_ms),
            },
        };

        match outcome {
            DeliveryOutcome::Delivered => {
                let waited = started.saturating_duration_since(item.enqueued_at);
                self.consecutive_errors = 0;
                self.stats.delivered += 1;
                tracing::info!(
                    sink = %self.sink_name,
                    entity = %item.entity_key,
                    queued_ms = waited.as_millis() as u64,
                    latency_ms = started.elapsed().as_millis() as u64,
                    remaining = self.pending.len() + self.waiting.len(),
                    "delivered"
                );
                self.report(DeliveryReport::Delivered {
                    sink: self.sink_name.to_string(),
                    entity_key: item.entity_key,
                    attempts: item.retries + 1,
                    waited,
                });
            }
            DeliveryOutcome::RateLimited { retry_after } => {
                // The limit is shared by every item headed to this sink.
                self.paused_until = Some(Instant::now() + retry_after);
                self.on_failure(
                    item,
                    format!("rate limited, retry after {}ms", retry_after.as_millis()),
                    Some(retry_after),
                );
            }
            DeliveryOutcome::Failed { reason } => self.on_failure(item, reason, None),
        }
    }

    fn on_failure(&mut self, mut item: DeliveryItem, reason: String, hint: Option<Duration>) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);

        if item.retries >= self.config.max_retries {
            self.stats.dropped += 1;
            tracing::error!(
                sink = %self.sink_name,
                entity = %item.entity_key,
                retries = item.retries,
                reason = %reason,
                "delivery failed permanently, dropping item"
            );
            self.report(DeliveryReport::Dropped {
                sink: self.sink_name.to_string(),
                entity_key: item.entity_key,
                retries: item.retries,
                reason,
            });
            return;
        }

        item.retries += 1;
        let mut delay = self.backoff.delay(self.consecutive_errors - 1);
        if let Some(hint) = hint {
            delay = delay.max(hint);
        }
        self.stats.retried += 1;
        tracing::warn!(
            sink = %self.sink_name,
            entity = %item.entity_key,
            retries = item.retries,
            consecutive_errors = self.consecutive_errors,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "delivery failed, requeueing"
        );
        self.report(DeliveryReport::Retrying {
            sink: self.sink_name.to_string(),
            entity_key: item.entity_key.clone(),
            retries: item.retries,
            delay,
        });
        self.waiting.push((Instant::now() + delay, item));
    }

    fn report(&self, report: DeliveryReport) {
        if let Some(tx) = &self.reports {
            let _ = tx.send(report);
        }
    }
}
