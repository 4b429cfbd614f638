// emberbot-core/src/services/builtin_commands.rs
//
// The fixed built-in command set. These shadow stored commands of the same
// name and, apart from `so`, all require moderator privilege.

use tracing::{debug, error, info};

use crate::Error;
use crate::auth::AuthorizationFlow;
use crate::eventsub::SubscriptionManager;
use crate::models::{CustomCommand, EventTopic, MAX_COMMAND_CONTENT_LEN, MAX_COMMAND_NAME_LEN};
use crate::repositories::CommandRepository;
use crate::services::command_service::CommandResponse;

const BUILTIN_NAMES: &[&str] = &[
    "addcom",
    "delcom",
    "auth",
    "so",
    "disconnect",
    "esfollow",
    "essub",
    "nukeeventsubs",
];

pub(crate) struct BuiltinContext<'a> {
    pub invoker: &'a str,
    pub is_moderator: bool,
    pub command_repo: &'a dyn CommandRepository,
    pub subscriptions: &'a SubscriptionManager,
    pub auth_flow: &'a AuthorizationFlow,
}

/// Dispatches the built-in command set. `Ok(None)` means the name is not a
/// built-in and lookup should continue in the command store.
pub(crate) async fn handle_builtin_command(
    name: &str,
    args: &[&str],
    ctx: &BuiltinContext<'_>,
) -> Result<Option<CommandResponse>, Error> {
    if !BUILTIN_NAMES.contains(&name) {
        return Ok(None);
    }

    // `so` is the only built-in open to everyone.
    if name != "so" && !ctx.is_moderator {
        debug!(
            "user '{}' lacks moderator privilege for '!{}'",
            ctx.invoker, name
        );
        return Ok(Some(CommandResponse::default()));
    }

    let response = match name {
        "so" => shoutout(args),
        "addcom" => add_command(args, ctx).await?,
        "delcom" => delete_command(args, ctx).await?,
        "esfollow" => subscribe_topics(&[EventTopic::Follow], ctx).await,
        "essub" => subscribe_topics(&[EventTopic::Subscribe, EventTopic::Cheer], ctx).await,
        "nukeeventsubs" => {
            info!("removing all event subscriptions at {}'s request", ctx.invoker);
            ctx.subscriptions.revoke_all().await;
            CommandResponse::say("All event subscriptions removed.")
        }
        "auth" => begin_authorization(ctx),
        "disconnect" => disconnect(ctx).await,
        _ => return Ok(None),
    };
    Ok(Some(response))
}

fn shoutout(args: &[&str]) -> CommandResponse {
    match args.first() {
        Some(target) => {
            CommandResponse::say(format!("Check out {target} at https://twitch.tv/{target} !"))
        }
        None => CommandResponse::default(),
    }
}

/// `!addcom [mod] <name> <content...>`; overwrites an existing name.
async fn add_command(
    args: &[&str],
    ctx: &BuiltinContext<'_>,
) -> Result<CommandResponse, Error> {
    let (is_mod_only, rest) = match args.first() {
        Some(&"mod") => (true, &args[1..]),
        _ => (false, args),
    };
    let Some((name, content_parts)) = rest.split_first() else {
        return Ok(CommandResponse::say("Usage: !addcom [mod] <name> <content>"));
    };
    let content = content_parts.join(" ");
    if content.is_empty() {
        return Ok(CommandResponse::say("Usage: !addcom [mod] <name> <content>"));
    }
    if name.chars().count() > MAX_COMMAND_NAME_LEN {
        return Ok(CommandResponse::say(format!(
            "Command names are limited to {MAX_COMMAND_NAME_LEN} characters."
        )));
    }
    if content.chars().count() > MAX_COMMAND_CONTENT_LEN {
        return Ok(CommandResponse::say(format!(
            "Command content is limited to {MAX_COMMAND_CONTENT_LEN} characters."
        )));
    }

    let cmd = CustomCommand::new(name, &content, is_mod_only);
    ctx.command_repo.upsert_command(&cmd).await?;
    info!("command '!{}' saved by {}", cmd.command_name, ctx.invoker);
    Ok(CommandResponse::say(format!("Command !{} saved.", cmd.command_name)))
}

/// `!delcom <name>`; silent no-op when the name does not exist.
async fn delete_command(
    args: &[&str],
    ctx: &BuiltinContext<'_>,
) -> Result<CommandResponse, Error> {
    let Some(name) = args.first() else {
        return Ok(CommandResponse::default());
    };
    let name = name.to_lowercase();
    if ctx.command_repo.delete_command(&name).await? {
        info!("command '!{}' deleted by {}", name, ctx.invoker);
        Ok(CommandResponse::say(format!("Command !{name} deleted.")))
    } else {
        debug!("delcom: '!{}' does not exist", name);
        Ok(CommandResponse::default())
    }
}

async fn subscribe_topics(
    topics: &[EventTopic],
    ctx: &BuiltinContext<'_>,
) -> CommandResponse {
    let mut lines = Vec::new();
    for topic in topics {
        // Independent topics; keep going if one create fails.
        match ctx.subscriptions.create(*topic).await {
            Ok(sub) => {
                info!("subscribed to {} events ({})", topic, sub.external_id);
                lines.push(format!("Subscribed to {topic} events."));
            }
            Err(e) => error!("failed to subscribe to {} events: {}", topic, e),
        }
    }
    CommandResponse {
        texts: lines,
        shutdown: false,
    }
}

fn begin_authorization(ctx: &BuiltinContext<'_>) -> CommandResponse {
    let url = ctx.auth_flow.begin();
    info!("authorization URL (hand to the channel owner): {}", url);
    CommandResponse::say("Authorization URL written to the bot log.")
}

async fn disconnect(ctx: &BuiltinContext<'_>) -> CommandResponse {
    info!("disconnect requested by {}; revoking subscriptions", ctx.invoker);
    ctx.subscriptions.revoke_all().await;
    CommandResponse {
        texts: vec!["/me goes to sleep ResidentSleeper".to_string()],
        shutdown: true,
    }
}
