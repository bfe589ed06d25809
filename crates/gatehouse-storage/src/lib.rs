// Persistence collaborator for the gateway
//
// The gateway only depends on the `Persistence` trait; `Database` is the
// Postgres implementation used by the binary.

pub mod database;
pub mod error;

pub use database::{Database, DatabaseOptions};
pub use error::StorageError;

use async_trait::async_trait;

/// Persistence layer as seen by the startup sequencer.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Open the connection and confirm the backend answers.
    ///
    /// Returns on success, fails with a connectivity error otherwise.
    async fn init_db(&self) -> Result<(), StorageError>;
}
