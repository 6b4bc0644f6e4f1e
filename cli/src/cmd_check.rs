use std::path::Path;

use anyhow::{Context, Result};

use chainwatch_core::WatchConfig;

const REDACTED: &str = "<redacted>";

pub fn run(path: &Path) -> Result<()> {
    let config = WatchConfig::from_file(path)
        .with_context(|| format!("config {} is not usable", path.display()))?;

    println!("{}", serde_json::to_string_pretty(&redacted(config))?);
    eprintln!("config OK");
    Ok(())
}

/// Copy of `config` safe to print.
fn redacted(mut config: WatchConfig) -> WatchConfig {
    if let Some(sheets) = config.sheets.as_mut() {
        sheets.access_token = REDACTED.into();
    }
    for sink in &mut config.sinks {
        sink.webhook_url = REDACTED.into();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_hidden() {
        let config = WatchConfig::from_json(
            r#"{
                "ws_url": "wss://node.example",
                "rpc_url": "https://node.example",
                "subscriptions": [{ "filter": "all" }],
                "sinks": [{ "name": "discord", "webhook_url": "https://discord.com/api/webhooks/1/secret" }],
                "sheets": { "spreadsheet_id": "abc", "access_token": "ya29.secret" }
            }"#,
        )
        .unwrap();

        let text = serde_json::to_string(&redacted(config)).unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains("wss://node.example"));
    }
}
