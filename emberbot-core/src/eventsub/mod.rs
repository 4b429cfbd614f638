// emberbot-core/src/eventsub/mod.rs

pub mod dedup;
pub mod events;
pub mod receiver;
pub mod signature;
pub mod subscriptions;

pub use dedup::SeenMessageCache;
pub use receiver::{EventSubState, eventsub_router};
pub use subscriptions::{SubscriptionManager, lookup_broadcaster_id};
