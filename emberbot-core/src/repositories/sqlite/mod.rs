// emberbot-core/src/repositories/sqlite/mod.rs

pub mod commands;

pub use commands::SqliteCommandRepository;
