use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(#[from] serde_json::Error),

    #[error("could not resolve a data directory for the local store")]
    DataDir,
}
