// emberbot-core/src/eventsub/subscriptions.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::Error;
use crate::auth::CredentialStore;
use crate::models::{EventSubscription, EventTopic, SubscriptionStatus};

const SUBSCRIPTIONS_ENDPOINT: &str = "https://api.twitch.tv/helix/eventsub/subscriptions";
const USERS_ENDPOINT: &str = "https://api.twitch.tv/helix/users";

/// Upper bound on any single management-API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tracks the webhook subscriptions the bot has requested and talks to the
/// platform's subscription-management endpoint.
///
/// The tracked map is keyed by topic, which structurally enforces "at most
/// one live subscription per topic": creating a topic that is already
/// tracked deletes the old remote record first.
pub struct SubscriptionManager {
    http: Client,
    credentials: Arc<CredentialStore>,
    callback_url: String,
    webhook_secret: String,
    broadcaster_user_id: String,
    tracked: Mutex<HashMap<EventTopic, EventSubscription>>,
}

impl SubscriptionManager {
    pub fn new(
        credentials: Arc<CredentialStore>,
        callback_url: String,
        webhook_secret: String,
        broadcaster_user_id: String,
    ) -> Self {
        Self {
            http: Client::new(),
            credentials,
            callback_url,
            webhook_secret,
            broadcaster_user_id,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Requests a new webhook subscription for `topic`, superseding any
    /// record already tracked for it. On failure no record is left behind.
    pub async fn create(&self, topic: EventTopic) -> Result<EventSubscription, Error> {
        if let Some(old) = self.take_tracked(topic) {
            if old.status != SubscriptionStatus::Revoked {
                info!(
                    "superseding existing {} subscription {}",
                    topic, old.external_id
                );
                if let Err(e) = self.delete_remote(&old.external_id).await {
                    warn!(
                        "failed to delete superseded {} subscription {}: {}",
                        topic, old.external_id, e
                    );
                }
            }
        }

        let token = self.credentials.bearer_token().await?;
        let body = json!({
            "type": topic.subscription_type(),
            "version": topic.version(),
            "condition": {
                "broadcaster_user_id": self.broadcaster_user_id,
            },
            "transport": {
                "method": "webhook",
                "callback": self.callback_url,
                "secret": self.webhook_secret,
            },
        });

        let response = self
            .http
            .post(SUBSCRIPTIONS_ENDPOINT)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&token)
            .header("Client-Id", self.credentials.client_id())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Platform(format!(
                "subscription create for {topic} returned {status}: {text}"
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        let external_id = payload
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|s| s.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Parse("subscription create response missing data[0].id".into()))?
            .to_string();

        info!("created {} subscription {}", topic, external_id);
        Ok(self.track(topic, external_id))
    }

    /// Records a remotely-confirmed subscription id as PENDING until the
    /// challenge handshake marks it active.
    pub fn track(&self, topic: EventTopic, external_id: String) -> EventSubscription {
        let sub = EventSubscription {
            topic,
            external_id,
            status: SubscriptionStatus::Pending,
            created_at: Utc::now(),
        };
        self.tracked.lock().unwrap().insert(topic, sub.clone());
        sub
    }

    pub fn list(&self) -> Vec<EventSubscription> {
        self.tracked.lock().unwrap().values().cloned().collect()
    }

    /// Marks the subscription with this platform id ACTIVE. Returns false if
    /// the id is not tracked.
    pub fn mark_active(&self, external_id: &str) -> bool {
        self.set_status(external_id, SubscriptionStatus::Active)
    }

    /// Marks the subscription with this platform id REVOKED. The topic stays
    /// tracked so `list` shows what needs a manual re-subscribe.
    pub fn mark_revoked(&self, external_id: &str) -> bool {
        self.set_status(external_id, SubscriptionStatus::Revoked)
    }

    /// Best-effort teardown of every tracked subscription. Individual delete
    /// failures are logged and skipped; local state is cleared regardless,
    /// remote orphans age out on the platform side.
    pub async fn revoke_all(&self) {
        let subs: Vec<EventSubscription> = {
            let mut tracked = self.tracked.lock().unwrap();
            tracked.drain().map(|(_, sub)| sub).collect()
        };
        for sub in subs {
            if sub.status == SubscriptionStatus::Revoked {
                continue;
            }
            match self.delete_remote(&sub.external_id).await {
                Ok(()) => info!("deleted {} subscription {}", sub.topic, sub.external_id),
                Err(e) => warn!(
                    "failed to delete {} subscription {}: {}",
                    sub.topic, sub.external_id, e
                ),
            }
        }
    }

    fn take_tracked(&self, topic: EventTopic) -> Option<EventSubscription> {
        self.tracked.lock().unwrap().remove(&topic)
    }

    fn set_status(&self, external_id: &str, status: SubscriptionStatus) -> bool {
        let mut tracked = self.tracked.lock().unwrap();
        for sub in tracked.values_mut() {
            if sub.external_id == external_id {
                sub.status = status;
                return true;
            }
        }
        false
    }

    async fn delete_remote(&self, external_id: &str) -> Result<(), Error> {
        let token = self.credentials.bearer_token().await?;
        let response = self
            .http
            .delete(SUBSCRIPTIONS_ENDPOINT)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("id", external_id)])
            .bearer_auth(&token)
            .header("Client-Id", self.credentials.client_id())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Platform(format!(
                "subscription delete {} returned {}",
                external_id,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Resolves a channel login to the broadcaster user id needed in
/// subscription conditions.
pub async fn lookup_broadcaster_id(
    credentials: &CredentialStore,
    login: &str,
) -> Result<String, Error> {
    let token = credentials.bearer_token().await?;
    let response = Client::new()
        .get(USERS_ENDPOINT)
        .timeout(REQUEST_TIMEOUT)
        .query(&[("login", login)])
        .bearer_auth(&token)
        .header("Client-Id", credentials.client_id())
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Platform(format!(
            "user lookup for '{login}' returned {}",
            response.status()
        )));
    }

    let payload: serde_json::Value = response.json().await?;
    payload
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|u| u.get("id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Platform(format!("no user found for login '{login}'")))
}
