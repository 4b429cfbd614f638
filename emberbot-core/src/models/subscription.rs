// emberbot-core/src/models/subscription.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// EventSub topics the bot reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Follow,
    Subscribe,
    Cheer,
}

impl EventTopic {
    /// The EventSub subscription type string for this topic.
    pub fn subscription_type(&self) -> &'static str {
        match self {
            EventTopic::Follow => "channel.follow",
            EventTopic::Subscribe => "channel.subscribe",
            EventTopic::Cheer => "channel.cheer",
        }
    }

    pub fn from_subscription_type(sub_type: &str) -> Option<Self> {
        match sub_type {
            "channel.follow" => Some(EventTopic::Follow),
            "channel.subscribe" => Some(EventTopic::Subscribe),
            "channel.cheer" => Some(EventTopic::Cheer),
            _ => None,
        }
    }

    pub fn version(&self) -> &'static str {
        "1"
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventTopic::Follow => "follow",
            EventTopic::Subscribe => "subscribe",
            EventTopic::Cheer => "cheer",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// Created remotely, challenge handshake not yet completed.
    Pending,
    Active,
    Revoked,
}

/// A webhook subscription the bot has requested from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubscription {
    pub topic: EventTopic,
    /// Subscription id assigned by the platform.
    pub external_id: String,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}
