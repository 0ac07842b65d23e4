use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventTimestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCredentials {
    pub user_access_token: String,
    pub bot_access_token: String,
    pub bot_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierCredentials {
    pub account_id: String,
    pub auth_token: String,
}

/// One installed team: credentials, SMS number and channel subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub struct Tenant {
    pub id: String,
    pub revision: String,
    pub team: String,
    pub chat: ChatCredentials,
    pub carrier: Option<CarrierCredentials>,
    pub phone_number: Option<String>,
    /// Channel id to subscribed user ids.
    pub channels: BTreeMap<String, BTreeSet<String>>,
    pub last_event_ts: Option<EventTimestamp>,
    pub channel_event_ts: BTreeMap<String, EventTimestamp>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which high-water mark an incoming chat event is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkScope {
    #[default]
    Team,
    Channel,
}

/// Duplicate suppression for chat events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkPolicy {
    pub enabled: bool,
    pub scope: WatermarkScope,
    /// Accept an event whose timestamp equals the watermark.
    pub allow_equal: bool,
}

impl Default for WatermarkPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: WatermarkScope::Team,
            allow_equal: false,
        }
    }
}

impl WatermarkPolicy {
    #[must_use]
    pub fn admits(&self, watermark: Option<&EventTimestamp>, ts: &EventTimestamp) -> bool {
        match watermark {
            _ if !self.enabled => true,
            None => true,
            Some(mark) if self.allow_equal => ts >= mark,
            Some(mark) => ts > mark,
        }
    }
}

impl Tenant {
    /// Whether the tenant can send and receive SMS.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.carrier.is_some() && self.phone_number.is_some()
    }

    #[must_use]
    pub fn recipients(&self, channel: &str) -> BTreeSet<String> {
        self.channels.get(channel).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn subscriptions_of(&self, user: &str) -> Vec<String> {
        self.channels
            .iter()
            .filter(|(_, users)| users.contains(user))
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    #[must_use]
    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    #[must_use]
    pub fn is_subscribed(&self, user: &str, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|users| users.contains(user))
    }

    /// Returns `false` when the user was already subscribed.
    pub fn subscribe(&mut self, user: &str, channel: &str) -> bool {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(user.to_string())
    }

    /// Returns `false` when the user was not subscribed. An emptied channel
    /// keeps its key.
    pub fn unsubscribe(&mut self, user: &str, channel: &str) -> bool {
        self.channels
            .get_mut(channel)
            .is_some_and(|users| users.remove(user))
    }

    #[must_use]
    pub fn watermark(&self, scope: WatermarkScope, channel: &str) -> Option<&EventTimestamp> {
        match scope {
            WatermarkScope::Team => self.last_event_ts.as_ref(),
            WatermarkScope::Channel => self.channel_event_ts.get(channel),
        }
    }

    /// Claims an event for delivery. Returns `false` for a duplicate, leaving
    /// the tenant untouched.
    pub fn advance_watermark(
        &mut self,
        policy: &WatermarkPolicy,
        channel: &str,
        ts: EventTimestamp,
    ) -> bool {
        if !policy.admits(self.watermark(policy.scope, channel), &ts) {
            return false;
        }
        if !policy.enabled {
            return true;
        }
        match policy.scope {
            WatermarkScope::Team => self.last_event_ts = Some(ts),
            WatermarkScope::Channel => {
                self.channel_event_ts.insert(channel.to_string(), ts);
            }
        }
        true
    }
}

#[cfg(test)]
pub(crate) fn test_tenant(team: &str) -> Tenant {
    let now = Utc::now();
    Tenant {
        id: format!("id-{team}"),
        revision: "1-0".to_string(),
        team: team.to_string(),
        chat: ChatCredentials {
            user_access_token: "xoxp-user".to_string(),
            bot_access_token: "xoxb-bot".to_string(),
            bot_user_id: "UBOT".to_string(),
        },
        carrier: None,
        phone_number: None,
        channels: BTreeMap::new(),
        last_event_ts: None,
        channel_event_ts: BTreeMap::new(),
        created_at: now,
        updated_at: now,
    }
}
