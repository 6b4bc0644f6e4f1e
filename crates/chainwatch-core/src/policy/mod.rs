//! Timing policies shared by the connection manager and the delivery queues.
//!
//! ```text
//! reconnect:  attempt → BackoffPolicy(reconnect preset) → sleep → connect
//! delivery:   consecutive errors → BackoffPolicy(sink preset) → requeue at tail
//! ```

pub mod backoff;

pub use backoff::{BackoffConfig, BackoffPolicy};
