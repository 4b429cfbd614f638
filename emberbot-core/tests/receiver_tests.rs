// File: emberbot-core/tests/receiver_tests.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use emberbot_core::Error;
use emberbot_core::auth::{AuthorizationFlow, CredentialStore};
use emberbot_core::eventsub::signature::sign;
use emberbot_core::eventsub::{
    EventSubState, SeenMessageCache, SubscriptionManager, eventsub_router,
};
use emberbot_core::models::{EventTopic, SubscriptionStatus};
use emberbot_core::services::{ChatTransport, MessageSender};

const SECRET: &str = "webhook-secret";
const TIMESTAMP: &str = "2024-11-16T10:11:12.123Z";

/// Captures outbound chat lines; can fail one send on demand.
#[derive(Default)]
struct MockChatTransport {
    sent: Mutex<Vec<String>>,
    fail_next: AtomicBool,
}

impl MockChatTransport {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for MockChatTransport {
    async fn send_message(&self, text: &str) -> Result<(), Error> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::ChatTransport("connection reset".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct Fixture {
    router: Router,
    transport: Arc<MockChatTransport>,
    subscriptions: Arc<SubscriptionManager>,
    auth_flow: Arc<AuthorizationFlow>,
    shutdown: CancellationToken,
}

fn fixture() -> Fixture {
    let credentials = Arc::new(CredentialStore::new(
        "client-id".to_string(),
        "client-secret".to_string(),
    ));
    let subscriptions = Arc::new(SubscriptionManager::new(
        Arc::clone(&credentials),
        "https://bot.example/eventsub".to_string(),
        SECRET.to_string(),
        "4242".to_string(),
    ));
    let auth_flow = Arc::new(AuthorizationFlow::new(
        "client-id".to_string(),
        "https://bot.example/".to_string(),
    ));
    let transport = Arc::new(MockChatTransport::default());
    let shutdown = CancellationToken::new();

    let state = Arc::new(EventSubState {
        webhook_secret: SECRET.to_string(),
        dedup: SeenMessageCache::new(600, 1024),
        subscriptions: Arc::clone(&subscriptions),
        sender: Arc::new(MessageSender::new(
            Arc::clone(&transport) as Arc<dyn ChatTransport>
        )),
        credentials,
        auth_flow: Arc::clone(&auth_flow),
        shutdown: shutdown.clone(),
    });

    Fixture {
        router: eventsub_router(state),
        transport,
        subscriptions,
        auth_flow,
        shutdown,
    }
}

fn delivery(message_id: &str, message_type: &str, body: &str) -> Request<Body> {
    let signature = sign(SECRET, message_id, TIMESTAMP, body.as_bytes());
    Request::builder()
        .method("POST")
        .uri("/eventsub")
        .header("Twitch-Eventsub-Message-Id", message_id)
        .header("Twitch-Eventsub-Message-Timestamp", TIMESTAMP)
        .header("Twitch-Eventsub-Message-Signature", signature)
        .header("Twitch-Eventsub-Message-Type", message_type)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn follow_body(sub_id: &str) -> String {
    serde_json::json!({
        "subscription": {
            "id": sub_id,
            "type": "channel.follow",
            "version": "1",
            "status": "enabled",
            "condition": { "broadcaster_user_id": "4242" },
        },
        "event": {
            "user_id": "1001",
            "user_login": "kyle",
            "user_name": "Kyle",
            "broadcaster_user_id": "4242",
            "broadcaster_user_login": "emberchannel",
            "broadcaster_user_name": "EmberChannel",
            "followed_at": "2024-11-16T10:11:12.123Z",
        },
    })
    .to_string()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn missing_headers_are_rejected_with_400() {
    let fx = fixture();
    let request = Request::builder()
        .method("POST")
        .uri("/eventsub")
        .body(Body::from(follow_body("sub-1")))
        .unwrap();
    let response = fx.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn forged_signature_is_rejected_with_403() {
    let fx = fixture();
    let body = follow_body("sub-1");
    let mut request = delivery("msg-1", "notification", &body);
    request.headers_mut().insert(
        "Twitch-Eventsub-Message-Signature",
        "sha256=0000000000000000000000000000000000000000000000000000000000000000"
            .parse()
            .unwrap(),
    );
    let response = fx.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn challenge_is_echoed_verbatim_and_activates_the_subscription() {
    let fx = fixture();
    fx.subscriptions.track(EventTopic::Follow, "sub-1".to_string());

    let body = serde_json::json!({
        "subscription": {
            "id": "sub-1",
            "type": "channel.follow",
            "version": "1",
            "status": "webhook_callback_verification_pending",
            "condition": { "broadcaster_user_id": "4242" },
        },
        "challenge": "pogchamp-challenge-token",
    })
    .to_string();

    let response = fx
        .router
        .clone()
        .oneshot(delivery("msg-1", "webhook_callback_verification", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/plain")
    );
    assert_eq!(body_text(response).await, "pogchamp-challenge-token");

    let subs = fx.subscriptions.list();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn follow_notification_is_announced_once() {
    let fx = fixture();
    let body = follow_body("sub-1");

    let first = fx
        .router
        .clone()
        .oneshot(delivery("msg-1", "notification", &body))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    // Redelivery of the same message id succeeds without re-announcing.
    let second = fx
        .router
        .clone()
        .oneshot(delivery("msg-1", "notification", &body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    assert_eq!(fx.transport.sent(), vec!["Thank you for following Kyle!"]);
}

#[tokio::test]
async fn failed_announcement_lets_the_platform_retry() {
    let fx = fixture();
    let body = follow_body("sub-1");

    fx.transport.fail_next.store(true, Ordering::SeqCst);
    let failed = fx
        .router
        .clone()
        .oneshot(delivery("msg-1", "notification", &body))
        .await
        .unwrap();
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(fx.transport.sent().is_empty());

    // The retry carries the same message id and must not be treated as a
    // duplicate.
    let retried = fx
        .router
        .clone()
        .oneshot(delivery("msg-1", "notification", &body))
        .await
        .unwrap();
    assert_eq!(retried.status(), StatusCode::OK);
    assert_eq!(fx.transport.sent(), vec!["Thank you for following Kyle!"]);
}

#[tokio::test]
async fn revocation_marks_the_subscription_revoked() {
    let fx = fixture();
    fx.subscriptions.track(EventTopic::Follow, "sub-1".to_string());

    let body = serde_json::json!({
        "subscription": {
            "id": "sub-1",
            "type": "channel.follow",
            "version": "1",
            "status": "authorization_revoked",
            "condition": { "broadcaster_user_id": "4242" },
        },
    })
    .to_string();

    let response = fx
        .router
        .clone()
        .oneshot(delivery("msg-1", "revocation", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fx.subscriptions.list()[0].status, SubscriptionStatus::Revoked);
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn unknown_message_type_is_acknowledged_without_side_effects() {
    let fx = fixture();
    let body = follow_body("sub-1");
    let response = fx
        .router
        .clone()
        .oneshot(delivery("msg-1", "future_message_type", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn unknown_subscription_type_is_acknowledged_without_dispatch() {
    let fx = fixture();
    let body = serde_json::json!({
        "subscription": {
            "id": "sub-7",
            "type": "channel.raid",
            "version": "1",
            "status": "enabled",
            "condition": {},
        },
        "event": { "from_broadcaster_user_name": "Someone" },
    })
    .to_string();

    let response = fx
        .router
        .clone()
        .oneshot(delivery("msg-1", "notification", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn deliveries_during_teardown_get_503() {
    let fx = fixture();
    fx.shutdown.cancel();
    let response = fx
        .router
        .clone()
        .oneshot(delivery("msg-1", "notification", &follow_body("sub-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn oauth_redirect_without_params_is_rejected() {
    let fx = fixture();
    let request = Request::builder()
        .method("GET")
        .uri("/?code=abc")
        .body(Body::empty())
        .unwrap();
    let response = fx.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oauth_redirect_with_unknown_state_is_forbidden() {
    let fx = fixture();
    // No pending nonce at all.
    let request = Request::builder()
        .method("GET")
        .uri("/?code=abc&state=stale-nonce")
        .body(Body::empty())
        .unwrap();
    let response = fx.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A nonce exists but does not match.
    fx.auth_flow.begin();
    let request = Request::builder()
        .method("GET")
        .uri("/?code=abc&state=wrong-nonce")
        .body(Body::empty())
        .unwrap();
    let response = fx.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
