// emberbot-core/src/services/message_sender.rs

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::Error;

/// Upper bound the channel accepts for a single chat line; also the cap on
/// stored command content.
pub const MAX_CHAT_MESSAGE_LEN: usize = 500;

/// Outbound side of the chat connection. The concrete transport lives
/// outside the core so tests can capture messages instead of a socket.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<(), Error>;
}

/// Wraps the transport and enforces the channel message-length limit.
pub struct MessageSender {
    transport: Arc<dyn ChatTransport>,
}

impl MessageSender {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, text: &str) -> Result<(), Error> {
        if text.chars().count() > MAX_CHAT_MESSAGE_LEN {
            warn!(
                "truncating over-long chat message ({} chars)",
                text.chars().count()
            );
            let truncated: String = text.chars().take(MAX_CHAT_MESSAGE_LEN).collect();
            return self.transport.send_message(&truncated).await;
        }
        self.transport.send_message(text).await
    }
}
