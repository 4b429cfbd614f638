// emberbot-core/src/models/mod.rs

pub mod command;
pub mod subscription;

pub use command::{CustomCommand, MAX_COMMAND_CONTENT_LEN, MAX_COMMAND_NAME_LEN};
pub use subscription::{EventSubscription, EventTopic, SubscriptionStatus};
