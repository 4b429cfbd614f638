// emberbot-server/src/irc.rs
//
// Minimal Twitch IRC chat transport: one TCP connection, a read loop that
// hands parsed PRIVMSGs to the rest of the bot over a channel, and a shared
// write half for outbound lines.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use emberbot_core::Error;
use emberbot_core::services::ChatTransport;

const IRC_ADDR: &str = "irc.chat.twitch.tv:6667";

/// A parsed PRIVMSG from the joined channel.
#[derive(Debug, Clone)]
pub struct ChatMessageEvent {
    pub user_name: String,
    pub text: String,
}

pub struct IrcChatTransport {
    writer: Mutex<OwnedWriteHalf>,
    channel: String,
}

impl IrcChatTransport {
    /// Connects, authenticates and joins the channel; returns the transport
    /// plus the stream of inbound chat messages.
    pub async fn connect(
        username: &str,
        oauth_token: &str,
        channel: &str,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ChatMessageEvent>), Error> {
        let stream = TcpStream::connect(IRC_ADDR).await?;
        let (read_half, write_half) = stream.into_split();
        let channel = format!("#{}", channel.trim_start_matches('#'));

        let transport = Arc::new(Self {
            writer: Mutex::new(write_half),
            channel: channel.clone(),
        });

        let pass = if oauth_token.starts_with("oauth:") {
            oauth_token.to_string()
        } else {
            format!("oauth:{oauth_token}")
        };
        transport.send_raw(&format!("PASS {pass}")).await?;
        transport.send_raw(&format!("NICK {username}")).await?;
        transport.send_raw(&format!("JOIN {channel}")).await?;

        let (tx, rx) = mpsc::channel(64);
        let reader_transport = Arc::clone(&transport);
        tokio::spawn(async move {
            read_loop(read_half, reader_transport, tx).await;
        });

        info!("joined {}", channel);
        Ok((transport, rx))
    }

    async fn send_raw(&self, line: &str) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for IrcChatTransport {
    async fn send_message(&self, text: &str) -> Result<(), Error> {
        self.send_raw(&format!("PRIVMSG {} :{}", self.channel, text))
            .await
    }
}

async fn read_loop(
    read_half: OwnedReadHalf,
    transport: Arc<IrcChatTransport>,
    tx: mpsc::Sender<ChatMessageEvent>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                // Answer server pings to keep the connection alive.
                if line.starts_with("PING") {
                    if let Err(e) = transport.send_raw("PONG :tmi.twitch.tv").await {
                        warn!("failed to answer PING: {}", e);
                    }
                    continue;
                }
                if let Some(event) = parse_privmsg(&line) {
                    if tx.send(event).await.is_err() {
                        // Receiver dropped, we are shutting down.
                        break;
                    }
                }
            }
            Ok(None) => {
                info!("chat connection closed by server");
                break;
            }
            Err(e) => {
                warn!("chat read error: {}", e);
                break;
            }
        }
    }
}

/// `:name!name@name.tmi.twitch.tv PRIVMSG #channel :message text`
fn parse_privmsg(line: &str) -> Option<ChatMessageEvent> {
    let rest = line.strip_prefix(':')?;
    let (prefix, rest) = rest.split_once(' ')?;
    let (command, rest) = rest.split_once(' ')?;
    if command != "PRIVMSG" {
        return None;
    }
    let user_name = prefix.split('!').next()?.to_string();
    let (_target, text) = rest.split_once(" :")?;
    Some(ChatMessageEvent {
        user_name,
        text: text.trim_end().to_string(),
    })
}
