use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// Network or backend failure; the caller may retry the same request.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Rejected credentials; surfaced for re-authentication, never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("subscription closed")]
    Closed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
