//! chainwatch-providers: concrete collaborators for ChainWatch.
//!
//! - [`SolanaTxExtractor`] resolves a signature via `getTransaction` and
//!   returns the token mints it touched
//! - [`WebhookSink`] posts messages to a Discord-style webhook
//! - [`SheetsStore`] appends discovered mints to a Google spreadsheet

pub mod error;
pub mod extractor;
pub mod sheets;
pub mod webhook;

pub use error::ProviderError;
pub use extractor::{extract_mints, SolanaTxExtractor};
pub use sheets::{entity_row, SheetsStore};
pub use webhook::{parse_retry_after, WebhookSink, DEFAULT_RETRY_AFTER, MAX_RETRY_AFTER};
