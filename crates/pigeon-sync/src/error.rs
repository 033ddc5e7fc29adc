use thiserror::Error;

use pigeon_db::DbError;
use pigeon_remote::RemoteError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("local store error: {0}")]
    Db(#[from] DbError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("not signed in")]
    NotSignedIn,

    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// A retryable failure left the local mirror untouched; the caller may
    /// repeat the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
