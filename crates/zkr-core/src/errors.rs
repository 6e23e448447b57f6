use crate::translation::ProviderKind;

/// Core error type for the relay bot.
///
/// Adapter crates map their specific errors (HTTP, gateway, database) into this
/// type so the core can decide between a user-facing message, a silent no-op and
/// a retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("translation credentials rejected: {}", format_kinds(.0))]
    Authorization(Vec<ProviderKind>),

    #[error("link limit exceeded: component would hold {size} channels (limit {limit})")]
    LimitExceeded { limit: usize, size: usize },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dispatch to channel {channel} failed: {reason}")]
    Dispatch { channel: u64, reason: String },

    #[error("translation error: {0}")]
    Translation(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::Authorization(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Transport failures are worth another attempt; rejected credentials and
    /// provider-side refusals are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::External(_))
    }
}

fn format_kinds(kinds: &[ProviderKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;
