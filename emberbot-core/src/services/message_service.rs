// emberbot-core/src/services/message_service.rs

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Error;
use crate::services::command_service::CommandService;
use crate::services::message_sender::MessageSender;

/// Words treated as a greeting when they appear as a standalone token.
const GREETINGS: &[&str] = &["hi", "hello", "heyo", "yo", "hey", "salut", "suh"];

/// Ingests chat messages: command dispatch first, the first-time greeter as
/// a fallback for ordinary chatter.
pub struct MessageService {
    command_service: Arc<CommandService>,
    sender: Arc<MessageSender>,
    shutdown: CancellationToken,
    seen_users: Mutex<HashSet<String>>,
}

impl MessageService {
    pub fn new(
        command_service: Arc<CommandService>,
        sender: Arc<MessageSender>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            command_service,
            sender,
            shutdown,
            seen_users: Mutex::new(HashSet::new()),
        }
    }

    pub async fn process_incoming_message(
        &self,
        user_name: &str,
        text: &str,
    ) -> Result<(), Error> {
        match self.command_service.handle_chat_line(user_name, text).await {
            Ok(Some(response)) => {
                for line in &response.texts {
                    self.sender.send(line).await?;
                }
                if response.shutdown {
                    info!("shutting down at moderator request");
                    self.shutdown.cancel();
                }
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                // A broken command must not take the chat loop down.
                error!("command dispatch failed: {}", e);
                return Ok(());
            }
        }

        if Self::is_greeting(text) && self.mark_seen(user_name) {
            self.sender.send(&format!("Hi {user_name} :)")).await?;
        }
        Ok(())
    }

    fn is_greeting(text: &str) -> bool {
        text.split_whitespace().any(|word| {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            GREETINGS.contains(&word.as_str())
        })
    }

    /// Returns true the first time a user is seen.
    fn mark_seen(&self, user_name: &str) -> bool {
        self.seen_users
            .lock()
            .unwrap()
            .insert(user_name.to_lowercase())
    }

    /// Forgets who has been greeted; the daily reset task calls this so
    /// regulars get greeted again on their next visit.
    pub fn clear_seen_users(&self) {
        self.seen_users.lock().unwrap().clear();
        debug!("seen users cleared");
    }
}
