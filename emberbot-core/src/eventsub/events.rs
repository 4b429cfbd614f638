// File: emberbot-core/src/eventsub/events.rs

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::Error;
use crate::models::EventTopic;

/// Subscription metadata carried in every webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionData {
    pub id: String,
    #[serde(rename = "type")]
    pub sub_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub condition: serde_json::Value,
}

/// Top-level body of a webhook delivery:
/// `{ "subscription": { ... }, "event": { ... } }` for notifications, with
/// `challenge` in place of `event` on verification requests.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationEnvelope {
    pub subscription: SubscriptionData,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: serde_json::Value,
}

// --------------------------------------------------------------------------
// Structured `event` payloads for each supported subscription type.
// --------------------------------------------------------------------------

/// "channel.follow" event
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelFollow {
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    pub followed_at: DateTime<Utc>,
}

/// "channel.subscribe" event
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSubscribe {
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    /// "1000" / "2000" / "3000"
    pub tier: String,
    pub is_gift: bool,
}

impl ChannelSubscribe {
    /// Human tier number (1–3) from the platform's tier string.
    pub fn tier_number(&self) -> u32 {
        self.tier.parse::<u32>().unwrap_or(1000) / 1000
    }
}

/// "channel.cheer" event. The user fields are null for anonymous cheers.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelCheer {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_login: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    pub is_anonymous: bool,
    #[serde(default)]
    pub message: String,
    pub bits: u64,
}

impl ChannelCheer {
    pub fn display_name(&self) -> &str {
        if self.is_anonymous {
            return "Anonymous";
        }
        self.user_name.as_deref().unwrap_or("Anonymous")
    }
}

/// A parsed notification the bot knows how to react to.
#[derive(Debug, Clone)]
pub enum EventSubEvent {
    Follow(ChannelFollow),
    Subscribe(ChannelSubscribe),
    Cheer(ChannelCheer),
}

impl EventSubEvent {
    /// The chat line announcing this event.
    pub fn announcement(&self) -> String {
        match self {
            EventSubEvent::Follow(ev) => {
                format!("Thank you for following {}!", ev.user_name)
            }
            EventSubEvent::Subscribe(ev) => {
                format!(
                    "{} subscribed at tier {}! Thank you for the support!",
                    ev.user_name,
                    ev.tier_number()
                )
            }
            EventSubEvent::Cheer(ev) => {
                format!(
                    "{} cheered {} bits! Thank you for the support!",
                    ev.display_name(),
                    ev.bits
                )
            }
        }
    }
}

/// Parses the `event` object of a notification. `Ok(None)` means the
/// subscription type has no handler and the delivery should be acknowledged
/// without side effects.
pub fn parse_notification(
    sub_type: &str,
    event: serde_json::Value,
) -> Result<Option<EventSubEvent>, Error> {
    let Some(topic) = EventTopic::from_subscription_type(sub_type) else {
        return Ok(None);
    };
    let parsed = match topic {
        EventTopic::Follow => EventSubEvent::Follow(serde_json::from_value(event)?),
        EventTopic::Subscribe => EventSubEvent::Subscribe(serde_json::from_value(event)?),
        EventTopic::Cheer => EventSubEvent::Cheer(serde_json::from_value(event)?),
    };
    Ok(Some(parsed))
}
