//! Traits for the external systems ChainWatch talks to.
//!
//! # Thread Safety
//! Implementations must be `Send + Sync`; they are shared as `Arc<dyn ...>`
//! between the frame loop, extraction tasks and queue drain loops.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ExtractError, StoreError};
use crate::types::Entity;

/// Resolves a transaction signature into candidate entity keys.
#[async_trait]
pub trait EntityExtractor: Send + Sync + 'static {
    /// Return the entity keys referenced by the transaction, in discovery order.
    ///
    /// Implementations may retry internally but must give up after a bounded
    /// number of attempts.
    async fn resolve(&self, signature: &str) -> Result<Vec<String>, ExtractError>;
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The sink asked us to wait at least `retry_after` before the next call.
    RateLimited { retry_after: Duration },
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// A downstream system that accepts one rendered message per call.
#[async_trait]
pub trait SinkAdapter: Send + Sync + 'static {
    /// Deliver one message. Must not retry internally; the queue owns retries.
    async fn deliver(&self, message: &str) -> DeliveryOutcome;

    /// Identifier used in logs and reports.
    fn name(&self) -> &str;
}

/// Append-only record of discovered entities.
#[async_trait]
pub trait EntityStore: Send + Sync + 'static {
    async fn append(&self, entity: &Entity) -> Result<(), StoreError>;

    fn name(&self) -> &str;
}
