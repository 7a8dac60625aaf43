use thiserror::Error;

/// Error taxonomy for the sync core.
///
/// Store failures are never fatal to the process: best-effort callers log
/// them and leave the local mirrors as they are (or as they were optimistically
/// altered), per the ledger's documented policies.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Network-level failure talking to the hosted store.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store rejected request ({status}): {body}")]
    Api { status: u16, body: String },

    /// Identity provider failure (sign-in, sign-up, token refresh).
    #[error("auth error: {0}")]
    Auth(String),

    /// A required field is missing or empty. Raised before any network call.
    #[error("missing required field: {0}")]
    Validation(&'static str),

    /// Realtime feed failure (connect, join, or wire decode).
    #[error("realtime feed error: {0}")]
    Realtime(String),

    /// Required configuration is absent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The runtime's command channel is gone.
    #[error("sync runtime is no longer running")]
    Closed,
}

pub type Result<T> = std::result::Result<T, CoreError>;
