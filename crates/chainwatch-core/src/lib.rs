//! chainwatch-core: foundation types and engines for ChainWatch.
//!
//! # Overview
//!
//! ChainWatch follows a stream of on-chain log notifications, resolves each
//! one into token mint addresses, and forwards every mint it has not seen
//! before to rate-limited outbound sinks. The core crate defines:
//!
//! - [`policy`] module: the exponential [`BackoffPolicy`]
//! - [`Deduplicator`]: process-wide check-and-mark set
//! - [`EntityExtractor`] / [`SinkAdapter`] / [`EntityStore`]: collaborator traits
//! - [`DeliveryQueue`]: per-sink paced FIFO with bounded retry
//! - [`Pipeline`]: notification → extraction → dedup → fan-out
//! - [`WatchConfig`]: the serde configuration tree

pub mod collaborator;
pub mod config;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod queue;
pub mod shutdown;
pub mod store;
pub mod types;

pub use collaborator::{DeliveryOutcome, EntityExtractor, EntityStore, SinkAdapter};
pub use config::WatchConfig;
pub use dedup::Deduplicator;
pub use error::{ConfigError, ExtractError, StoreError};
pub use pipeline::{bullx_link, pump_fun_link, LinkRenderer, MessageRenderer, Pipeline, PipelineStats};
pub use policy::{BackoffConfig, BackoffPolicy};
pub use queue::{DeliveryQueue, DeliveryReport, QueueConfig, QueueHandle, QueueStats};
pub use shutdown::{shutdown_signalled, sleep_until_opt};
pub use store::MemoryStore;
pub use types::{Commitment, DeliveryItem, Entity, Notification, Subscription, SubscriptionFilter};
