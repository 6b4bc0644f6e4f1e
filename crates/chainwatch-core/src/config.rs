//! Watcher configuration, loaded from a JSON file.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::BackoffConfig;
use crate::queue::QueueConfig;
use crate::types::{Commitment, Subscription};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Streaming endpoint, e.g. "wss://api.mainnet-beta.solana.com".
    pub ws_url: String,
    /// JSON-RPC endpoint used to resolve signatures.
    pub rpc_url: String,
    /// Subscriptions reissued on every connect.
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    /// Outbound sinks; each gets its own delivery queue.
    pub sinks: Vec<SinkConfig>,
    /// Optional spreadsheet store. Discoveries are kept in memory when absent.
    #[serde(default)]
    pub sheets: Option<SheetsConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

/// Connection lifecycle tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Interval between client pings while open.
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// Delay between consecutive subscribe requests after open.
    #[serde(default = "default_subscribe_stagger_ms")]
    pub subscribe_stagger_ms: u64,
    /// Reconnects allowed before the watcher gives up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// When set, a ping unanswered for this long is treated as a dead
    /// connection. Disabled by default: only transport errors trigger reconnect.
    #[serde(default)]
    pub pong_timeout_ms: Option<u64>,
    #[serde(default = "BackoffConfig::reconnect")]
    pub backoff: BackoffConfig,
    /// Overrides the `User-Agent` sent on the upgrade request.
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_handshake_timeout_ms() -> u64 { 30_000 }
fn default_keepalive_interval_ms() -> u64 { 30_000 }
fn default_subscribe_stagger_ms() -> u64 { 1_000 }
fn default_max_reconnect_attempts() -> u32 { 20 }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            subscribe_stagger_ms: default_subscribe_stagger_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            pong_timeout_ms: None,
            backoff: BackoffConfig::reconnect(),
            user_agent: None,
        }
    }
}

impl ConnectionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn subscribe_stagger(&self) -> Duration {
        Duration::from_millis(self.subscribe_stagger_ms)
    }

    pub fn pong_timeout(&self) -> Option<Duration> {
        self.pong_timeout_ms.map(Duration::from_millis)
    }
}

/// Signature resolution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Commitment passed to `getTransaction`.
    #[serde(default)]
    pub commitment: Commitment,
    /// Total lookups per signature before giving up.
    #[serde(default = "default_extract_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_extract_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_extract_retry_cap_ms")]
    pub retry_cap_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_extract_attempts() -> u32 { 10 }
fn default_extract_retry_base_ms() -> u64 { 500 }
fn default_extract_retry_cap_ms() -> u64 { 5_000 }
fn default_request_timeout_ms() -> u64 { 15_000 }

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            commitment: Commitment::Finalized,
            max_attempts: default_extract_attempts(),
            retry_base_ms: default_extract_retry_base_ms(),
            retry_cap_ms: default_extract_retry_cap_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// One webhook sink and its queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub name: String,
    pub webhook_url: String,
    #[serde(flatten)]
    pub queue: QueueConfig,
}

/// Spreadsheet append target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    /// OAuth bearer token with the spreadsheets scope.
    pub access_token: String,
    #[serde(default = "default_sheets_api_base")]
    pub api_base: String,
}

fn default_sheet_name() -> String { "TokenContracts".into() }
fn default_sheets_api_base() -> String { "https://sheets.googleapis.com".into() }

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter directives, e.g. `"info,chainwatch_ws=debug"`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

impl WatchConfig {
    /// Read, parse and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "ws_url must be a ws:// or wss:// URL, got {:?}",
                self.ws_url
            )));
        }
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::Invalid("rpc_url is empty".into()));
        }
        if self.subscriptions.is_empty() {
            return Err(ConfigError::Invalid("no subscriptions configured".into()));
        }
        if self.connection.keepalive_interval_ms == 0 {
            return Err(ConfigError::Invalid("keepalive_interval_ms must be > 0".into()));
        }
        if self.connection.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid("handshake_timeout_ms must be > 0".into()));
        }
        if self.extractor.max_attempts == 0 {
            return Err(ConfigError::Invalid("extractor.max_attempts must be > 0".into()));
        }
        if self.sinks.is_empty() {
            return Err(ConfigError::Invalid("no sinks configured".into()));
        }

        let mut names = HashSet::new();
        for sink in &self.sinks {
            if !names.insert(sink.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate sink name {:?}", sink.name)));
            }
            if sink.webhook_url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("sink {:?} has no webhook_url", sink.name)));
            }
            if sink.queue.min_interval_ms == 0 || sink.queue.delivery_timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "sink {:?}: min_interval_ms and delivery_timeout_ms must be > 0",
                    sink.name
                )));
            }
            if sink.queue.max_retries == 0 {
                return Err(ConfigError::Invalid(format!(
                    "sink {:?}: max_retries must be > 0",
                    sink.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionFilter;

    const MINIMAL: &str = r#"{
        "ws_url": "wss://node.example/ws",
        "rpc_url": "https://node.example",
        "subscriptions": [
            { "filter": { "mentions": ["infwiWUCBtdDG61p285W5uaxC3VpvwP3Ww1KEbkLSx9"] } },
            { "filter": { "mentions": ["HcBxoEUVA1FQNmbrnvgA48WS8PRH1stErmUS8uxhARKp"] } }
        ],
        "sinks": [
            { "name": "contracts", "webhook_url": "https://discord.example/api/webhooks/1/x" }
        ]
    }"#;

    #[test]
    fn defaults_fill_in() {
        let cfg = WatchConfig::from_json(MINIMAL).unwrap();
        assert_eq!(cfg.subscriptions.len(), 2);
        assert!(matches!(cfg.subscriptions[0].filter, SubscriptionFilter::Mentions(_)));
        assert_eq!(cfg.connection, ConnectionConfig::default());
        assert_eq!(cfg.connection.max_reconnect_attempts, 20);
        assert_eq!(cfg.sinks[0].queue, QueueConfig::default());
        assert_eq!(cfg.sinks[0].queue.min_interval_ms, 2_000);
        assert!(cfg.sheets.is_none());
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn flattened_queue_settings() {
        let cfg = WatchConfig::from_json(
            r#"{
                "ws_url": "ws://localhost:8900",
                "rpc_url": "http://localhost:8899",
                "subscriptions": [{ "filter": "all", "commitment": "processed" }],
                "sinks": [{
                    "name": "alerts",
                    "webhook_url": "http://localhost:9000/hook",
                    "min_interval_ms": 500,
                    "max_retries": 3,
                    "backoff": { "base_ms": 200, "cap_ms": 1000 }
                }]
            }"#,
        )
        .unwrap();
        let q = &cfg.sinks[0].queue;
        assert_eq!(q.min_interval_ms, 500);
        assert_eq!(q.max_retries, 3);
        assert_eq!(q.backoff.base_ms, 200);
        assert_eq!(q.backoff.factor, 2.0);
        assert_eq!(q.delivery_timeout_ms, 10_000);
    }

    #[test]
    fn rejects_duplicate_sinks() {
        let mut cfg = WatchConfig::from_json(MINIMAL).unwrap();
        cfg.sinks.push(cfg.sinks[0].clone());
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_http_stream_url() {
        let text = MINIMAL.replace("wss://node.example/ws", "https://node.example/ws");
        assert!(matches!(WatchConfig::from_json(&text), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_missing_subscriptions() {
        let mut cfg = WatchConfig::from_json(MINIMAL).unwrap();
        cfg.subscriptions.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn log_directives() {
        let mut log = LogConfig::default();
        log.components.insert("chainwatch-ws".into(), "debug".into());
        assert_eq!(log.directives(), "info,chainwatch_ws=debug");
    }
}
