// emberbot-server/src/config.rs

use std::env;

use emberbot_core::Error;

/// Process configuration, loaded once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Account the bot signs in to chat as.
    pub bot_username: String,
    /// Channel (login name, no leading '#') the bot joins and watches.
    pub channel: String,
    pub client_id: String,
    pub client_secret: String,
    /// OAuth token for the chat connection.
    pub chat_token: String,
    /// Publicly reachable base URL of the webhook listener.
    pub callback_url: String,
    pub http_port: u16,
    /// Secret shared with the platform for signing webhook deliveries.
    pub webhook_secret: String,
    /// Users allowed to run moderator commands, lowercased.
    pub moderators: Vec<String>,
    pub cooldown_seconds: i64,
    pub database_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self {
            bot_username: require("BOT_USERNAME")?,
            channel: require("CHANNEL")?.trim_start_matches('#').to_string(),
            client_id: require("CLIENT_ID")?,
            client_secret: require("CLIENT_SECRET")?,
            chat_token: require("CHAT_OAUTH_TOKEN")?,
            callback_url: require("CALLBACK_URL")?,
            http_port: require("HTTP_PORT")?
                .parse()
                .map_err(|_| Error::Parse("HTTP_PORT must be a port number".into()))?,
            webhook_secret: require("WEBHOOK_SECRET")?,
            moderators: require("MODS")?
                .split(',')
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
            cooldown_seconds: env::var("COOLDOWN_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| Error::Parse("COOLDOWN_SECONDS must be a number".into()))?,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "emberbot.db".to_string()),
        })
    }

    /// Where the platform posts webhook deliveries.
    pub fn eventsub_callback(&self) -> String {
        format!("{}/eventsub", self.callback_url.trim_end_matches('/'))
    }
}

fn require(key: &str) -> Result<String, Error> {
    env::var(key).map_err(|_| Error::Parse(format!("missing required environment variable {key}")))
}
