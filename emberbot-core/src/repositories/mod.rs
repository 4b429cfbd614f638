// emberbot-core/src/repositories/mod.rs

pub mod sqlite;

use async_trait::async_trait;

use crate::Error;
use crate::models::CustomCommand;

/// Persistent storage for custom chat commands.
#[async_trait]
pub trait CommandRepository: Send + Sync {
    /// Inserts the command, replacing content and mod flag if the name is
    /// already taken. A single atomic statement.
    async fn upsert_command(&self, cmd: &CustomCommand) -> Result<(), Error>;

    /// Case-insensitive lookup by name.
    async fn get_command_by_name(&self, name: &str) -> Result<Option<CustomCommand>, Error>;

    /// Returns whether a row was actually deleted.
    async fn delete_command(&self, name: &str) -> Result<bool, Error>;

    async fn list_commands(&self) -> Result<Vec<CustomCommand>, Error>;
}

pub use sqlite::SqliteCommandRepository;
