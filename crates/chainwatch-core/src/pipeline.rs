//! Notification pipeline: extraction → dedup → fan-out to sink queues.
//!
//! ```text
//! Notification ──spawn──► EntityExtractor::resolve
//!                               │ keys
//!                               ▼
//!                     Deduplicator::check_and_mark
//!                               │ new keys
//!              ┌────────────────┼─────────────────┐
//!              ▼                ▼                 ▼
//!        QueueHandle #1   QueueHandle #n   EntityStore (fire-and-forget)
//! ```
//!
//! Extraction runs on its own task so the frame loop keeps servicing the
//! socket while a lookup is slow.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::collaborator::{EntityExtractor, EntityStore};
use crate::dedup::Deduplicator;
use crate::error::ExtractError;
use crate::queue::QueueHandle;
use crate::types::{DeliveryItem, Entity, Notification};

/// Turns a discovered entity into the message sent to sinks.
pub trait MessageRenderer: Send + Sync + 'static {
    fn render(&self, entity: &Entity) -> String;
}

/// pump.fun page for `mint`.
pub fn pump_fun_link(mint: &str) -> String {
    format!("https://pump.fun/{mint}")
}

/// BullX terminal page for `mint` on Solana mainnet.
pub fn bullx_link(mint: &str) -> String {
    format!("https://neo.bullx.io/terminal?chainId=1399811149&address={mint}")
}

/// Renders a mint address with pump.fun and BullX links.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkRenderer;

impl MessageRenderer for LinkRenderer {
    fn render(&self, entity: &Entity) -> String {
        let mint = &entity.key;
        format!(
            "📄 New Ca: **{mint}**\n {}\n {}\n",
            pump_fun_link(mint),
            bullx_link(mint)
        )
    }
}

/// Counters snapshot for the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub notifications: u64,
    /// Notifications for transactions that failed on-chain.
    pub skipped_failed: u64,
    /// Notifications whose signature was still being processed.
    pub repeated_signatures: u64,
    pub extraction_failures: u64,
    pub keys_extracted: u64,
    pub new_entities: u64,
    pub duplicates: u64,
    pub store_failures: u64,
}

/// Shared pipeline state. Wrap in an `Arc` and call
/// [`handle_notification`](Pipeline::handle_notification) from the frame loop.
pub struct Pipeline {
    extractor: Arc<dyn EntityExtractor>,
    dedup: Arc<Deduplicator>,
    queues: Vec<QueueHandle>,
    store: Option<Arc<dyn EntityStore>>,
    renderer: Arc<dyn MessageRenderer>,
    /// Signatures whose extraction task has not finished yet.
    in_flight: Mutex<HashSet<String>>,
    stats: Arc<Mutex<PipelineStats>>,
}

impl Pipeline {
    pub fn new(extractor: Arc<dyn EntityExtractor>, dedup: Arc<Deduplicator>) -> Self {
        Self {
            extractor,
            dedup,
            queues: Vec::new(),
            store: None,
            renderer: Arc::new(LinkRenderer),
            in_flight: Mutex::new(HashSet::new()),
            stats: Arc::new(Mutex::new(PipelineStats::default())),
        }
    }

    /// Fan new entities out to this sink queue.
    pub fn with_queue(mut self, queue: QueueHandle) -> Self {
        self.queues.push(queue);
        self
    }

    /// Record every new entity in `store`.
    pub fn with_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn MessageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Returns a snapshot of current counters.
    pub fn stats(&self) -> PipelineStats {
        lock(&self.stats).clone()
    }

    /// Number of signatures currently being resolved.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Accept a notification from the frame loop.
    ///
    /// Returns the spawned extraction task, or `None` when the notification
    /// was filtered out without a lookup.
    pub fn handle_notification(self: &Arc<Self>, notification: Notification) -> Option<JoinHandle<usize>> {
        lock(&self.stats).notifications += 1;

        if notification.is_failed() {
            debug!(signature = %notification.signature, "skipping failed transaction");
            lock(&self.stats).skipped_failed += 1;
            return None;
        }

        if !lock(&self.in_flight).insert(notification.signature.clone()) {
            debug!(signature = %notification.signature, "signature already in flight");
            lock(&self.stats).repeated_signatures += 1;
            return None;
        }

        info!(
            signature = %notification.signature,
            slot = ?notification.slot,
            log_lines = notification.logs.len(),
            "new transaction"
        );
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let new = this.process(&notification.signature).await;
            lock(&this.in_flight).remove(&notification.signature);
            new
        }))
    }

    /// Resolve `signature` and emit every entity not seen before.
    /// Returns the number of new entities.
    pub async fn process(&self, signature: &str) -> usize {
        let keys = match self.extractor.resolve(signature).await {
            Ok(keys) => keys,
            Err(ExtractError::NotFound) => {
                debug!(signature, "transaction not found, nothing to extract");
                Vec::new()
            }
            Err(e) => {
                warn!(signature, error = %e, "extraction failed");
                lock(&self.stats).extraction_failures += 1;
                return 0;
            }
        };

        lock(&self.stats).keys_extracted += keys.len() as u64;
        if keys.is_empty() {
            debug!(signature, "no token mints in transaction");
        }

        let mut new = 0;
        for key in keys {
            if !self.dedup.check_and_mark(&key) {
                debug!(mint = %key, "already emitted");
                lock(&self.stats).duplicates += 1;
                continue;
            }
            new += 1;
            self.emit(Entity::new(key, signature));
        }
        lock(&self.stats).new_entities += new as u64;
        new
    }

    fn emit(&self, entity: Entity) {
        info!(mint = %entity.key, signature = %entity.source, "new token mint");

        let payload = self.renderer.render(&entity);
        for queue in &self.queues {
            let item = DeliveryItem::new(payload.clone(), entity.key.clone());
            if !queue.enqueue(item) {
                warn!(sink = queue.sink_name(), mint = %entity.key, "sink queue is stopped");
            }
        }

        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                match store.append(&entity).await {
                    Ok(()) => debug!(store = store.name(), mint = %entity.key, "entity stored"),
                    Err(e) => {
                        error!(store = store.name(), mint = %entity.key, error = %e, "failed to store entity");
                        lock(&stats).store_failures += 1;
                    }
                }
            });
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_renderer_format() {
        let entity = Entity::new("Mint111", "sig");
        let msg = LinkRenderer.render(&entity);
        assert!(msg.starts_with("📄 New Ca: **Mint111**\n"));
        assert!(msg.contains("https://pump.fun/Mint111"));
        assert!(msg.contains("address=Mint111"));
        assert_eq!(
            msg,
            "📄 New Ca: **Mint111**\n https://pump.fun/Mint111\n https://neo.bullx.io/terminal?chainId=1399811149&address=Mint111\n"
        );
    }
}
