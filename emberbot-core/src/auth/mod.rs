// emberbot-core/src/auth/mod.rs

use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::Error;

const TOKEN_ENDPOINT: &str = "https://id.twitch.tv/oauth2/token";
const AUTHORIZE_ENDPOINT: &str = "https://id.twitch.tv/oauth2/authorize";

/// Scopes the bot can currently make use of: subscription reads and cheers.
const AUTHORIZATION_SCOPES: &str = "channel:read:subscriptions bits:read";

/// Refresh the app token once it has this little lifetime left.
const REFRESH_MARGIN_SECS: i64 = 600;

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// The bot's OAuth material: client id/secret, the cached app access token
/// used for management-API calls, and the streamer-scoped token produced by
/// the authorization-code flow.
pub struct CredentialStore {
    http: Client,
    client_id: String,
    client_secret: String,
    app_token: RwLock<Option<CachedToken>>,
    user_token: RwLock<Option<String>>,
}

impl CredentialStore {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: Client::new(),
            client_id,
            client_secret,
            app_token: RwLock::new(None),
            user_token: RwLock::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns a bearer token for management-API requests, refreshing when
    /// the cached one is missing or within the expiry margin.
    pub async fn bearer_token(&self) -> Result<String, Error> {
        {
            let guard = self.app_token.read().await;
            if let Some(token) = guard.as_ref() {
                match token.expires_at {
                    Some(expires_at)
                        if expires_at - Utc::now() <= Duration::seconds(REFRESH_MARGIN_SECS) =>
                    {
                        warn!(
                            "app access token expires in ≤{}s, refreshing",
                            REFRESH_MARGIN_SECS
                        );
                    }
                    _ => return Ok(token.access_token.clone()),
                }
            }
        }
        self.refresh().await
    }

    /// Client-credentials grant; replaces the cached app token.
    pub async fn refresh(&self) -> Result<String, Error> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];
        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .timeout(REQUEST_TIMEOUT)
            .form(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "app token request returned {}",
                response.status()
            )));
        }
        let parsed: TokenResponse = response.json().await?;
        let expires_at = parsed
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        let mut guard = self.app_token.write().await;
        *guard = Some(CachedToken {
            access_token: parsed.access_token.clone(),
            expires_at,
        });
        debug!("app access token refreshed");
        Ok(parsed.access_token)
    }

    /// Authorization-code exchange; stores the streamer-scoped token.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<(), Error> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];
        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .timeout(REQUEST_TIMEOUT)
            .form(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "authorization code exchange returned {}",
                response.status()
            )));
        }
        let parsed: TokenResponse = response.json().await?;
        *self.user_token.write().await = Some(parsed.access_token);
        info!("streamer authorization completed");
        Ok(())
    }

    pub async fn user_token(&self) -> Option<String> {
        self.user_token.read().await.clone()
    }
}

/// Single-use state for the authorization-code flow.
///
/// `begin` replaces any pending nonce; `take_state` consumes it on the first
/// match, so a replayed redirect with an old nonce is rejected.
pub struct AuthorizationFlow {
    client_id: String,
    redirect_uri: String,
    pending_state: Mutex<Option<String>>,
}

impl AuthorizationFlow {
    pub fn new(client_id: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            redirect_uri,
            pending_state: Mutex::new(None),
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Generates a fresh state nonce and returns the authorization URL to
    /// hand to the channel owner.
    pub fn begin(&self) -> String {
        let mut bytes = [0u8; 15];
        rand::rng().fill_bytes(&mut bytes);
        let state = hex::encode(bytes);
        *self.pending_state.lock().unwrap() = Some(state.clone());

        format!(
            "{AUTHORIZE_ENDPOINT}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.client_id,
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(AUTHORIZATION_SCOPES),
            state
        )
    }

    /// Consumes the pending nonce iff it matches `state`.
    pub fn take_state(&self, state: &str) -> bool {
        let mut guard = self.pending_state.lock().unwrap();
        match guard.as_deref() {
            Some(pending) if pending == state => {
                *guard = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> AuthorizationFlow {
        AuthorizationFlow::new(
            "client-id".to_string(),
            "https://bot.example/".to_string(),
        )
    }

    fn state_from(url: &str) -> String {
        url.rsplit_once("state=").unwrap().1.to_string()
    }

    #[test]
    fn authorize_url_carries_scopes_and_state() {
        let flow = flow();
        let url = flow.begin();
        assert!(url.starts_with("https://id.twitch.tv/oauth2/authorize?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("channel%3Aread%3Asubscriptions%20bits%3Aread"));
        assert_eq!(state_from(&url).len(), 30);
    }

    #[test]
    fn state_is_consumed_exactly_once() {
        let flow = flow();
        let state = state_from(&flow.begin());
        assert!(!flow.take_state("wrong"));
        assert!(flow.take_state(&state));
        // Replay of the same nonce must fail.
        assert!(!flow.take_state(&state));
    }

    #[test]
    fn a_new_begin_invalidates_the_previous_nonce() {
        let flow = flow();
        let first = state_from(&flow.begin());
        let second = state_from(&flow.begin());
        assert!(!flow.take_state(&first));
        assert!(flow.take_state(&second));
    }
}
