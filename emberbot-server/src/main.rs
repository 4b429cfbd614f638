// emberbot-server/src/main.rs

mod config;
mod irc;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use emberbot_core::Database;
use emberbot_core::auth::{AuthorizationFlow, CredentialStore};
use emberbot_core::eventsub::{
    EventSubState, SeenMessageCache, SubscriptionManager, eventsub_router, lookup_broadcaster_id,
};
use emberbot_core::repositories::SqliteCommandRepository;
use emberbot_core::services::{ChatTransport, CommandService, MessageSender, MessageService};
use emberbot_core::tasks::spawn_seen_users_reset_task;

use crate::config::Config;
use crate::irc::IrcChatTransport;

/// Message ids are kept for ten minutes; the platform redelivers within
/// that window.
const DEDUP_RETENTION_SECS: i64 = 600;
const DEDUP_MAX_ENTRIES: usize = 4096;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_path).await?;
    db.migrate().await?;

    let credentials = Arc::new(CredentialStore::new(
        config.client_id.clone(),
        config.client_secret.clone(),
    ));
    let broadcaster_id = lookup_broadcaster_id(&credentials, &config.channel).await?;
    info!(
        "resolved broadcaster id {} for channel {}",
        broadcaster_id, config.channel
    );

    let subscriptions = Arc::new(SubscriptionManager::new(
        Arc::clone(&credentials),
        config.eventsub_callback(),
        config.webhook_secret.clone(),
        broadcaster_id,
    ));
    let auth_flow = Arc::new(AuthorizationFlow::new(
        config.client_id.clone(),
        config.callback_url.clone(),
    ));
    let shutdown = CancellationToken::new();

    let (chat, mut chat_rx) =
        IrcChatTransport::connect(&config.bot_username, &config.chat_token, &config.channel)
            .await?;
    let sender = Arc::new(MessageSender::new(chat as Arc<dyn ChatTransport>));

    let command_repo = Arc::new(SqliteCommandRepository::new(db.pool().clone()));
    let command_service = Arc::new(CommandService::new(
        command_repo,
        Arc::clone(&subscriptions),
        Arc::clone(&auth_flow),
        config.moderators.clone(),
        config.cooldown_seconds,
    ));
    let message_service = Arc::new(MessageService::new(
        command_service,
        Arc::clone(&sender),
        shutdown.clone(),
    ));

    let state = Arc::new(EventSubState {
        webhook_secret: config.webhook_secret.clone(),
        dedup: SeenMessageCache::new(DEDUP_RETENTION_SECS, DEDUP_MAX_ENTRIES),
        subscriptions: Arc::clone(&subscriptions),
        sender: Arc::clone(&sender),
        credentials: Arc::clone(&credentials),
        auth_flow: Arc::clone(&auth_flow),
        shutdown: shutdown.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await?;
    info!("webhook listener on {}", addr);
    let router = eventsub_router(state);
    let server_shutdown = shutdown.clone();
    let webhook_server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    let _seen_users_reset = spawn_seen_users_reset_task(Arc::clone(&message_service));

    // Chat loop: runs until a moderator disconnects the bot or the chat
    // stream ends.
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = chat_rx.recv() => {
                match event {
                    Some(msg) => {
                        if let Err(e) = message_service
                            .process_incoming_message(&msg.user_name, &msg.text)
                            .await
                        {
                            error!("failed to handle chat message: {}", e);
                        }
                    }
                    None => {
                        info!("chat stream ended, shutting down");
                        shutdown.cancel();
                        break;
                    }
                }
            }
        }
    }

    // The webhook listener must be fully stopped before the store closes so
    // a late delivery cannot touch a closed pool.
    match webhook_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("webhook listener error: {}", e),
        Err(e) => error!("webhook listener task failed: {}", e),
    }
    db.close().await;
    info!("goodbye");
    Ok(())
}
