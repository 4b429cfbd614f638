// emberbot-core/src/services/command_service.rs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::Error;
use crate::auth::AuthorizationFlow;
use crate::eventsub::SubscriptionManager;
use crate::repositories::CommandRepository;
use crate::services::builtin_commands::{BuiltinContext, handle_builtin_command};

/// Response from the dispatcher: chat lines to emit, in order, plus whether
/// the caller should begin an orderly shutdown once they are sent.
#[derive(Debug, Clone, Default)]
pub struct CommandResponse {
    pub texts: Vec<String>,
    pub shutdown: bool,
}

impl CommandResponse {
    pub(crate) fn say(text: impl Into<String>) -> Self {
        Self {
            texts: vec![text.into()],
            shutdown: false,
        }
    }
}

/// Tracks when each command was last invoked by a non-moderator.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_use: HashMap<String, DateTime<Utc>>,
}

impl CooldownTracker {
    /// Test-and-set: `true` grants the invocation and records `now` as the
    /// command's last use.
    pub fn try_acquire(
        &mut self,
        command_name: &str,
        now: DateTime<Utc>,
        cooldown_seconds: i64,
    ) -> bool {
        if let Some(last) = self.last_use.get(command_name) {
            if now.signed_duration_since(*last).num_seconds() < cooldown_seconds {
                return false;
            }
        }
        self.last_use.insert(command_name.to_string(), now);
        true
    }
}

pub struct CommandService {
    command_repo: Arc<dyn CommandRepository>,
    subscriptions: Arc<SubscriptionManager>,
    auth_flow: Arc<AuthorizationFlow>,
    moderators: HashSet<String>,
    cooldown_seconds: i64,
    cooldowns: Mutex<CooldownTracker>,
}

impl CommandService {
    pub fn new(
        command_repo: Arc<dyn CommandRepository>,
        subscriptions: Arc<SubscriptionManager>,
        auth_flow: Arc<AuthorizationFlow>,
        moderators: Vec<String>,
        cooldown_seconds: i64,
    ) -> Self {
        Self {
            command_repo,
            subscriptions,
            auth_flow,
            moderators: moderators.into_iter().map(|m| m.to_lowercase()).collect(),
            cooldown_seconds,
            cooldowns: Mutex::new(CooldownTracker::default()),
        }
    }

    pub fn is_moderator(&self, user_name: &str) -> bool {
        self.moderators.contains(&user_name.to_lowercase())
    }

    /// Processes one chat message; `Ok(None)` means the message is not a
    /// command, is unknown, or the invoker is not allowed to run it.
    pub async fn handle_chat_line(
        &self,
        user_name: &str,
        message_text: &str,
    ) -> Result<Option<CommandResponse>, Error> {
        let text = message_text.trim();
        if !text.starts_with('!') {
            return Ok(None);
        }

        // Parse command and arguments.
        let parts: Vec<&str> = text.split_whitespace().collect();
        let cmd_part = parts[0].trim_start_matches('!').to_lowercase();
        if cmd_part.is_empty() {
            return Ok(None);
        }
        let args = &parts[1..];
        let is_moderator = self.is_moderator(user_name);
        debug!(
            "command '{}' from '{}' (moderator: {})",
            cmd_part, user_name, is_moderator
        );

        // Built-ins resolve first and shadow stored commands.
        let ctx = BuiltinContext {
            invoker: user_name,
            is_moderator,
            command_repo: self.command_repo.as_ref(),
            subscriptions: &self.subscriptions,
            auth_flow: &self.auth_flow,
        };
        if let Some(response) = handle_builtin_command(&cmd_part, args, &ctx).await? {
            return Ok(Some(response));
        }

        // Stored command lookup, keyed case-insensitively.
        let Some(cmd) = self.command_repo.get_command_by_name(&cmd_part).await? else {
            debug!("no command found matching '{}'", cmd_part);
            return Ok(None);
        };

        if cmd.is_mod_only && !is_moderator {
            debug!(
                "user '{}' lacks permission to use '!{}'",
                user_name, cmd.command_name
            );
            return Ok(None);
        }

        // Moderators bypass cooldowns; everyone else goes through the
        // test-and-set.
        if !is_moderator {
            let now = Utc::now();
            let mut cooldowns = self.cooldowns.lock().unwrap();
            if !cooldowns.try_acquire(&cmd.command_name, now, self.cooldown_seconds) {
                debug!("command '!{}' is on cooldown", cmd.command_name);
                return Ok(None);
            }
        }

        Ok(Some(CommandResponse::say(cmd.content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn cooldown_gates_until_the_window_passes() {
        let mut tracker = CooldownTracker::default();
        let t0 = Utc::now();
        assert!(tracker.try_acquire("kappa", t0, 30));
        assert!(!tracker.try_acquire("kappa", t0 + Duration::seconds(29), 30));
        assert!(tracker.try_acquire("kappa", t0 + Duration::seconds(30), 30));
    }

    #[test]
    fn cooldowns_are_tracked_per_command() {
        let mut tracker = CooldownTracker::default();
        let t0 = Utc::now();
        assert!(tracker.try_acquire("kappa", t0, 30));
        assert!(tracker.try_acquire("lurk", t0, 30));
        assert!(!tracker.try_acquire("kappa", t0, 30));
    }
}
