use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid database configuration: {0}")]
    Configuration(#[source] sqlx::Error),

    #[error("database unreachable: {0}")]
    Connectivity(#[source] sqlx::Error),
}
