//! Discord-style webhook sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde_json::{json, Value};

use chainwatch_core::{DeliveryOutcome, SinkAdapter};

use crate::error::ProviderError;

/// Wait used when a 429 carries no usable hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Longest wait honoured from a 429 hint; larger values are clamped.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

const BODY_SNIPPET: usize = 200;

/// Posts each message as `{"content": message}`.
///
/// The sink makes exactly one HTTP call per [`deliver`](SinkAdapter::deliver);
/// pacing and retries belong to the delivery queue.
pub struct WebhookSink {
    name: String,
    url: String,
    http: reqwest::Client,
}

impl WebhookSink {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl SinkAdapter for WebhookSink {
    async fn deliver(&self, message: &str) -> DeliveryOutcome {
        let resp = match self
            .http
            .post(&self.url)
            .json(&json!({ "content": message }))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return DeliveryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let status = resp.status();
        if status.is_success() {
            return DeliveryOutcome::Delivered;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let header = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = resp.json::<Value>().await.ok();
            let retry_after = parse_retry_after(header.as_deref(), body.as_ref());
            tracing::warn!(
                sink = %self.name,
                retry_after_ms = retry_after.as_millis() as u64,
                "webhook rate limited"
            );
            return DeliveryOutcome::RateLimited { retry_after };
        }

        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(BODY_SNIPPET).collect();
        DeliveryOutcome::Failed {
            reason: format!("HTTP {}: {snippet}", status.as_u16()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Resolve the wait requested by a 429 response.
///
/// The `Retry-After` header wins (seconds, fractions allowed), then a JSON
/// `retry_after` field in the body, then [`DEFAULT_RETRY_AFTER`]. Hints above
/// [`MAX_RETRY_AFTER`] are clamped to it.
pub fn parse_retry_after(header: Option<&str>, body: Option<&Value>) -> Duration {
    header
        .and_then(|h| h.trim().parse::<f64>().ok())
        .or_else(|| body.and_then(|b| b.get("retry_after")).and_then(Value::as_f64))
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.min(MAX_RETRY_AFTER.as_secs_f64()))
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}
