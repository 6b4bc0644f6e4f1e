//! Core data model: subscriptions, notifications, entities, delivery items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

/// Finality level requested for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    #[default]
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transactions a `logsSubscribe` request selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionFilter {
    /// Transactions mentioning any of the given program/account addresses.
    Mentions(Vec<String>),
    /// Every transaction except simple votes.
    All,
    /// Every transaction including votes.
    AllWithVotes,
}

impl SubscriptionFilter {
    /// The filter object as the node expects it in `params[0]`.
    pub fn to_param(&self) -> Value {
        match self {
            Self::Mentions(addrs) => serde_json::json!({ "mentions": addrs }),
            Self::All => Value::String("all".into()),
            Self::AllWithVotes => Value::String("allWithVotes".into()),
        }
    }
}

/// A topic subscription reissued on every (re)connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub filter: SubscriptionFilter,
    #[serde(default)]
    pub commitment: Commitment,
}

impl Subscription {
    /// Subscribe to transactions that mention `address`.
    pub fn mentions(address: impl Into<String>, commitment: Commitment) -> Self {
        Self {
            filter: SubscriptionFilter::Mentions(vec![address.into()]),
            commitment,
        }
    }

    /// Catch-all stream.
    pub fn all(commitment: Commitment) -> Self {
        Self {
            filter: SubscriptionFilter::All,
            commitment,
        }
    }
}

/// A decoded `logsNotification`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Subscription id assigned by the node, when present.
    pub subscription: Option<u64>,
    /// Slot from the notification context.
    pub slot: Option<u64>,
    /// Transaction signature.
    pub signature: String,
    /// Transaction error, `None` when the transaction succeeded.
    pub err: Option<Value>,
    pub logs: Vec<String>,
}

impl Notification {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            subscription: None,
            slot: None,
            signature: signature.into(),
            err: None,
            logs: vec![],
        }
    }

    /// Returns `true` if the transaction failed on-chain.
    pub fn is_failed(&self) -> bool {
        self.err.is_some()
    }
}

/// A discovered entity, keyed by its dedup key (a token mint address).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub key: String,
    /// Signature of the transaction the entity was discovered in.
    pub source: String,
    pub discovered_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(key: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
            discovered_at: Utc::now(),
        }
    }
}

/// One rendered message waiting in a sink's queue.
#[derive(Debug, Clone)]
pub struct DeliveryItem {
    pub payload: String,
    /// Dedup key of the entity the payload was rendered from.
    pub entity_key: String,
    pub enqueued_at: Instant,
    /// Failed delivery attempts so far.
    pub retries: u32,
}

impl DeliveryItem {
    pub fn new(payload: impl Into<String>, entity_key: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            entity_key: entity_key.into(),
            enqueued_at: Instant::now(),
            retries: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_filter_param() {
        let sub = Subscription::mentions("infwiWUCBtdDG61p285W5uaxC3VpvwP3Ww1KEbkLSx9", Commitment::Finalized);
        assert_eq!(
            sub.filter.to_param(),
            serde_json::json!({ "mentions": ["infwiWUCBtdDG61p285W5uaxC3VpvwP3Ww1KEbkLSx9"] })
        );
    }

    #[test]
    fn catch_all_filter_param() {
        assert_eq!(SubscriptionFilter::All.to_param(), serde_json::json!("all"));
        assert_eq!(SubscriptionFilter::AllWithVotes.to_param(), serde_json::json!("allWithVotes"));
    }

    #[test]
    fn subscription_from_config_json() {
        let sub: Subscription = serde_json::from_str(
            r#"{ "filter": { "mentions": ["abc"] }, "commitment": "processed" }"#,
        )
        .unwrap();
        assert_eq!(sub, Subscription::mentions("abc", Commitment::Processed));

        let sub: Subscription = serde_json::from_str(r#"{ "filter": "all" }"#).unwrap();
        assert_eq!(sub, Subscription::all(Commitment::Finalized));
    }
}
