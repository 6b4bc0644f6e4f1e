//! Signature → token mint resolution over Solana JSON-RPC.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_retry::RetryIf;

use chainwatch_core::config::ExtractorConfig;
use chainwatch_core::policy::{BackoffConfig, BackoffPolicy};
use chainwatch_core::types::Commitment;
use chainwatch_core::{EntityExtractor, ExtractError};

use crate::error::{LookupError, ProviderError};

/// JSON-RPC "invalid params"; retrying the same request cannot help.
const INVALID_PARAMS: i64 = -32602;

/// Resolves signatures with `getTransaction` and collects the token mints
/// found in the transaction's token balances.
///
/// A `null` result usually means the node has not caught up to the requested
/// commitment yet, so it is retried like a network error. When every attempt
/// comes back `null` the signature resolves to [`ExtractError::NotFound`].
pub struct SolanaTxExtractor {
    url: String,
    http: reqwest::Client,
    commitment: Commitment,
    max_attempts: u32,
    backoff: BackoffPolicy,
    next_id: AtomicU64,
}

impl SolanaTxExtractor {
    pub fn new(url: impl Into<String>, config: &ExtractorConfig) -> Result<Self, ProviderError> {
        if config.max_attempts == 0 {
            return Err(ProviderError::Invalid("extractor.max_attempts must be at least 1".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            url: url.into(),
            http,
            commitment: config.commitment,
            max_attempts: config.max_attempts,
            backoff: BackoffPolicy::new(&BackoffConfig {
                base_ms: config.retry_base_ms,
                factor: 2.0,
                cap_ms: config.retry_cap_ms,
            }),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Waits between attempts; one fewer entry than `max_attempts`.
    fn retry_schedule(&self) -> impl Iterator<Item = Duration> {
        let policy = self.backoff.clone();
        (0..self.max_attempts.saturating_sub(1)).map(move |n| policy.delay(n))
    }

    async fn lookup_once(&self, signature: &str) -> Result<Vec<String>, LookupError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": "getTransaction",
            "params": [
                signature,
                {
                    "encoding": "jsonParsed",
                    "commitment": self.commitment,
                    "maxSupportedTransactionVersion": 0
                }
            ]
        });

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LookupError::Http(format!("HTTP {status}: {body}")));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;

        if let Some(err) = payload.get("error") {
            return Err(LookupError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        match payload.get("result") {
            None | Some(Value::Null) => Err(LookupError::Missing),
            Some(tx) => Ok(extract_mints(tx)),
        }
    }
}

#[async_trait]
impl EntityExtractor for SolanaTxExtractor {
    async fn resolve(&self, signature: &str) -> Result<Vec<String>, ExtractError> {
        let mut attempt = 0u32;
        let result = RetryIf::start(
            self.retry_schedule(),
            || self.lookup_once(signature),
            |e: &LookupError| {
                attempt += 1;
                let retry = !matches!(e, LookupError::Rpc { code: INVALID_PARAMS, .. });
                if retry && attempt < self.max_attempts {
                    tracing::debug!(signature, attempt, error = %e, "getTransaction failed, retrying");
                }
                retry
            },
        )
        .await;

        match result {
            Ok(mints) => {
                tracing::debug!(signature, mints = mints.len(), "transaction resolved");
                Ok(mints)
            }
            Err(LookupError::Missing) => Err(ExtractError::NotFound),
            Err(e) => {
                tracing::warn!(signature, url = %self.url, error = %e, "getTransaction gave up");
                Err(ExtractError::Transient(e.to_string()))
            }
        }
    }
}

/// Unique mints from `meta.preTokenBalances` then `meta.postTokenBalances`,
/// in first-seen order.
pub fn extract_mints(tx: &Value) -> Vec<String> {
    let meta = tx.get("meta");
    let mut seen = HashSet::new();
    let mut mints = Vec::new();

    for field in ["preTokenBalances", "postTokenBalances"] {
        let balances = meta
            .and_then(|m| m.get(field))
            .and_then(Value::as_array)
            .into_iter()
            .flatten();
        for balance in balances {
            if let Some(mint) = balance.get("mint").and_then(Value::as_str) {
                if seen.insert(mint) {
                    mints.push(mint.to_string());
                }
            }
        }
    }
    mints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_unique_mints_in_order() {
        let tx = json!({
            "meta": {
                "preTokenBalances": [
                    { "accountIndex": 1, "mint": "MintA" },
                    { "accountIndex": 2, "mint": "MintB" },
                    { "accountIndex": 3, "mint": "MintA" }
                ],
                "postTokenBalances": [
                    { "accountIndex": 1, "mint": "MintA" },
                    { "accountIndex": 4, "mint": "MintC" }
                ]
            }
        });
        assert_eq!(extract_mints(&tx), vec!["MintA", "MintB", "MintC"]);
    }

    #[test]
    fn missing_meta_yields_nothing() {
        assert!(extract_mints(&json!({})).is_empty());
        assert!(extract_mints(&json!({ "meta": null })).is_empty());
        assert!(extract_mints(&json!({ "meta": { "preTokenBalances": [] } })).is_empty());
    }

    #[test]
    fn entries_without_mint_are_skipped() {
        let tx = json!({ "meta": { "preTokenBalances": [{ "accountIndex": 0 }, { "mint": "M" }] } });
        assert_eq!(extract_mints(&tx), vec!["M"]);
    }

    #[test]
    fn schedule_has_one_wait_per_retry() {
        let config = ExtractorConfig {
            max_attempts: 4,
            retry_base_ms: 100,
            retry_cap_ms: 250,
            ..ExtractorConfig::default()
        };
        let extractor = SolanaTxExtractor::new("http://127.0.0.1:1", &config).unwrap();
        let waits: Vec<_> = extractor.retry_schedule().collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(250),
            ]
        );
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let config = ExtractorConfig {
            max_attempts: 0,
            ..ExtractorConfig::default()
        };
        assert!(matches!(
            SolanaTxExtractor::new("http://127.0.0.1:1", &config),
            Err(ProviderError::Invalid(_))
        ));
    }
}
