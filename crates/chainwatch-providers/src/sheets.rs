//! Google Sheets append-only entity log.

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{json, Value};

use chainwatch_core::config::SheetsConfig;
use chainwatch_core::{bullx_link, pump_fun_link, Entity, EntityStore, StoreError};

use crate::error::ProviderError;

/// Appends one row per discovered entity:
/// `[Token Address, Discovery Time, Transaction ID, Pump.fun Link, BullX Link]`.
pub struct SheetsStore {
    endpoint: String,
    access_token: String,
    http: reqwest::Client,
}

impl SheetsStore {
    pub fn new(config: &SheetsConfig) -> Result<Self, ProviderError> {
        if config.spreadsheet_id.trim().is_empty() {
            return Err(ProviderError::Invalid("sheets.spreadsheet_id is empty".into()));
        }
        let http = reqwest::Client::builder().build()?;
        let endpoint = format!(
            "{}/v4/spreadsheets/{}/values/{}!A:E:append?valueInputOption=RAW",
            config.api_base.trim_end_matches('/'),
            config.spreadsheet_id,
            config.sheet_name,
        );
        Ok(Self {
            endpoint,
            access_token: config.access_token.clone(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Row cells for `entity`, in column order.
pub fn entity_row(entity: &Entity) -> Vec<String> {
    vec![
        entity.key.clone(),
        entity.discovered_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        entity.source.clone(),
        pump_fun_link(&entity.key),
        bullx_link(&entity.key),
    ]
}

#[async_trait]
impl EntityStore for SheetsStore {
    async fn append(&self, entity: &Entity) -> Result<(), StoreError> {
        let body: Value = json!({ "values": [entity_row(entity)] });
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Rejected { status, body });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "sheets"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn config() -> SheetsConfig {
        SheetsConfig {
            spreadsheet_id: "sheet123".into(),
            sheet_name: "TokenContracts".into(),
            access_token: "token".into(),
            api_base: "https://sheets.googleapis.com/".into(),
        }
    }

    #[test]
    fn row_layout() {
        let mut entity = Entity::new("MintZ", "sigZ");
        entity.discovered_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let row = entity_row(&entity);
        assert_eq!(row[0], "MintZ");
        assert_eq!(row[1], "2024-03-01T12:30:00.000Z");
        assert_eq!(row[2], "sigZ");
        assert_eq!(row[3], "https://pump.fun/MintZ");
        assert!(row[4].ends_with("address=MintZ"));
    }

    #[test]
    fn endpoint_targets_sheet_range() {
        let store = SheetsStore::new(&config()).unwrap();
        assert_eq!(
            store.endpoint(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet123/values/TokenContracts!A:E:append?valueInputOption=RAW"
        );
    }

    #[test]
    fn empty_spreadsheet_id_is_rejected() {
        let mut cfg = config();
        cfg.spreadsheet_id = " ".into();
        assert!(SheetsStore::new(&cfg).is_err());
    }
}
