// emberbot-core/src/tasks/mod.rs

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::info;

use crate::services::MessageService;

/// Clears the greeter's seen-users set once a day.
pub fn spawn_seen_users_reset_task(message_service: Arc<MessageService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(24 * 60 * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("daily seen-users reset");
            message_service.clear_seen_users();
        }
    })
}
