use thiserror::Error;

/// Errors raised while building a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid provider setting: {0}")]
    Invalid(String),
}

/// One failed `getTransaction` lookup.
#[derive(Debug, Clone, Error, PartialEq)]
pub(crate) enum LookupError {
    /// The node returned `result: null`.
    #[error("transaction not available yet")]
    Missing,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}
