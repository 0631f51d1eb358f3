use thiserror::Error;

/// Errors surfaced by a [`super::ProviderAdapter`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The vendor CLI exited non-zero, or could not be spawned.
    #[error("cloud command failed: {0}")]
    Command(String),

    /// The vendor CLI timed out.
    #[error("cloud command timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The instance has no address because it is not running.
    #[error("instance is not running; no address available")]
    NotRunning,

    /// The CLI's JSON response didn't contain the field we expected.
    #[error("unexpected response from provider: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse provider response: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
