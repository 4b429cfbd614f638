// emberbot-core/src/eventsub/receiver.rs
//
// HTTP-facing side of EventSub: challenge handshakes, notifications and
// revocations arrive here, get authenticated and deduplicated, and fan out
// to the per-topic announcement handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthorizationFlow, CredentialStore};
use crate::eventsub::dedup::SeenMessageCache;
use crate::eventsub::events::{NotificationEnvelope, parse_notification};
use crate::eventsub::signature::verify_signature;
use crate::eventsub::subscriptions::SubscriptionManager;
use crate::services::message_sender::MessageSender;

const MESSAGE_ID_HEADER: &str = "twitch-eventsub-message-id";
const TIMESTAMP_HEADER: &str = "twitch-eventsub-message-timestamp";
const SIGNATURE_HEADER: &str = "twitch-eventsub-message-signature";
const MESSAGE_TYPE_HEADER: &str = "twitch-eventsub-message-type";

/// Shared state behind the webhook endpoints.
pub struct EventSubState {
    pub webhook_secret: String,
    pub dedup: SeenMessageCache,
    pub subscriptions: Arc<SubscriptionManager>,
    pub sender: Arc<MessageSender>,
    pub credentials: Arc<CredentialStore>,
    pub auth_flow: Arc<AuthorizationFlow>,
    pub shutdown: CancellationToken,
}

pub fn eventsub_router(state: Arc<EventSubState>) -> Router {
    Router::new()
        .route("/eventsub", post(handle_notification))
        .route("/", get(handle_oauth_redirect))
        .with_state(state)
}

async fn handle_notification(
    State(state): State<Arc<EventSubState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // A delivery racing teardown must not touch a store that is closing.
    if state.shutdown.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let (Some(message_id), Some(timestamp), Some(signature), Some(message_type)) = (
        header_str(&headers, MESSAGE_ID_HEADER),
        header_str(&headers, TIMESTAMP_HEADER),
        header_str(&headers, SIGNATURE_HEADER),
        header_str(&headers, MESSAGE_TYPE_HEADER),
    ) else {
        debug!("delivery missing required headers");
        return StatusCode::BAD_REQUEST.into_response();
    };

    if !verify_signature(&state.webhook_secret, message_id, timestamp, &body, signature) {
        warn!("signature verification failed for message {}", message_id);
        return StatusCode::FORBIDDEN.into_response();
    }

    match message_type {
        "webhook_callback_verification" => handle_challenge(&state, &body),
        "notification" => handle_event(&state, message_id, &body).await,
        "revocation" => handle_revocation(&state, &body),
        other => {
            // Unknown message types must not bounce, the platform would
            // retry forever.
            debug!("ignoring unknown message type '{}'", other);
            StatusCode::OK.into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn handle_challenge(state: &EventSubState, body: &[u8]) -> Response {
    let envelope: NotificationEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("malformed challenge body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    let Some(challenge) = envelope.challenge else {
        debug!("verification request without a challenge token");
        return StatusCode::BAD_REQUEST.into_response();
    };

    if state.subscriptions.mark_active(&envelope.subscription.id) {
        info!("subscription {} verified and active", envelope.subscription.id);
    } else {
        warn!(
            "challenge for untracked subscription {}",
            envelope.subscription.id
        );
    }

    // The challenge must be echoed back verbatim, as plain text.
    ([(header::CONTENT_TYPE, "text/plain")], challenge).into_response()
}

async fn handle_event(state: &EventSubState, message_id: &str, body: &[u8]) -> Response {
    if !state.dedup.should_process(message_id) {
        debug!("duplicate delivery {}, acknowledging without dispatch", message_id);
        return StatusCode::OK.into_response();
    }

    let envelope: NotificationEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            // An authenticated but unparseable payload is acknowledged, not
            // bounced; bouncing only provokes platform retries.
            warn!("unrecognized notification payload: {}", e);
            return StatusCode::OK.into_response();
        }
    };

    match parse_notification(&envelope.subscription.sub_type, envelope.event) {
        Ok(Some(event)) => {
            let line = event.announcement();
            if let Err(e) = state.sender.send(&line).await {
                // Let the platform retry this delivery; release the id so
                // the retry is not treated as a duplicate.
                error!(
                    "failed to announce {}: {}",
                    envelope.subscription.sub_type, e
                );
                state.dedup.forget(message_id);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            StatusCode::OK.into_response()
        }
        Ok(None) => {
            debug!(
                "no handler for subscription type '{}'",
                envelope.subscription.sub_type
            );
            StatusCode::OK.into_response()
        }
        Err(e) => {
            warn!(
                "unrecognized {} payload: {}",
                envelope.subscription.sub_type, e
            );
            StatusCode::OK.into_response()
        }
    }
}

fn handle_revocation(state: &EventSubState, body: &[u8]) -> Response {
    match serde_json::from_slice::<NotificationEnvelope>(body) {
        Ok(envelope) => {
            if state.subscriptions.mark_revoked(&envelope.subscription.id) {
                warn!(
                    "subscription {} revoked by the platform (status '{}'); re-subscribe manually",
                    envelope.subscription.id, envelope.subscription.status
                );
            } else {
                debug!("revocation for untracked subscription {}", envelope.subscription.id);
            }
        }
        Err(e) => warn!("malformed revocation body: {}", e),
    }
    StatusCode::OK.into_response()
}

async fn handle_oauth_redirect(
    State(state): State<Arc<EventSubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (Some(code), Some(returned_state)) = (params.get("code"), params.get("state")) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if !state.auth_flow.take_state(returned_state) {
        warn!("authorization redirect with unknown or reused state");
        return StatusCode::FORBIDDEN.into_response();
    }

    match state
        .credentials
        .exchange_code(code, state.auth_flow.redirect_uri())
        .await
    {
        Ok(()) => (StatusCode::OK, "Authorization complete. You can close this tab.").into_response(),
        Err(e) => {
            error!("authorization code exchange failed: {}", e);
            (StatusCode::BAD_GATEWAY, "Authorization failed.").into_response()
        }
    }
}
