
// File: emberbot-core/src/services/mod.rs

pub(crate) mod builtin_commands;
pub mod command_service;
pub mod message_sender;
pub mod message_service;

pub use command_service::{CommandResponse, CommandService};
pub use message_sender::{ChatTransport, MessageSender};
pub use message_service::MessageService;
