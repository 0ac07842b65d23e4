use std::sync::Arc;

use super::{BridgeSettings, OutboundSms};
use crate::chat::{ChatConnector, TenantChat};
use crate::error::{Error, Result};
use crate::store::{TenantStore, modify_tenant, require_team};
use crate::types::{ChatEvent, ChatEventPayload, EventTimestamp, Tenant};

/// What became of one chat webhook.
#[derive(Debug)]
pub enum EventOutcome {
    /// Endpoint verification; echo the challenge back.
    Challenge(String),
    Skipped(String),
    /// The event was at or below the tenant's watermark.
    Duplicate,
    Delivered(FanoutReport),
}

#[derive(Debug)]
pub struct RecipientFailure {
    pub user: String,
    pub error: Error,
}

/// Result of relaying one channel message to its subscribers.
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub attempted: usize,
    pub sent: usize,
    pub failures: Vec<RecipientFailure>,
}

/// The SMS body for a channel message.
#[must_use]
pub fn format_relay(channel_name: &str, author: &str, text: &str) -> String {
    format!("#{channel_name}:\n{author}: {text}")
}

/// Relays channel messages to every subscriber of the channel.
#[derive(Clone)]
pub struct ChatEventRouter {
    store: Arc<dyn TenantStore>,
    chat: Arc<dyn ChatConnector>,
    outbound: OutboundSms,
    settings: Arc<BridgeSettings>,
}

impl ChatEventRouter {
    #[must_use]
    pub fn new(
        store: Arc<dyn TenantStore>,
        chat: Arc<dyn ChatConnector>,
        outbound: OutboundSms,
        settings: Arc<BridgeSettings>,
    ) -> Self {
        Self {
            store,
            chat,
            outbound,
            settings,
        }
    }

    pub async fn handle(&self, payload: &ChatEventPayload) -> Result<EventOutcome> {
        match payload.kind.as_str() {
            "url_verification" => Ok(EventOutcome::Challenge(
                payload.challenge.clone().unwrap_or_default(),
            )),
            "event_callback" => self.handle_callback(payload).await,
            other => Err(Error::BadRequest(format!("Unknown event type: {other}"))),
        }
    }

    fn skip_reason(&self, event: &ChatEvent) -> Option<String> {
        if event.hidden {
            return Some("hidden event".to_string());
        }
        if event.kind != "message" {
            return Some(format!("unsupported event type {}", event.kind));
        }
        match &event.subtype {
            Some(subtype) if !self.settings.allowed_subtypes.contains(subtype) => {
                Some(format!("unsupported message subtype {subtype}"))
            }
            _ => None,
        }
    }

    async fn handle_callback(&self, payload: &ChatEventPayload) -> Result<EventOutcome> {
        let event = payload
            .event
            .as_ref()
            .ok_or_else(|| Error::Malformed("event callback without an event".to_string()))?;
        let team = payload
            .team_id
            .as_deref()
            .ok_or_else(|| Error::Malformed("event callback without a team_id".to_string()))?;

        if let Some(reason) = self.skip_reason(event) {
            tracing::debug!(team, "Skipping event: {reason}");
            return Ok(EventOutcome::Skipped(reason));
        }

        let (Some(channel), Some(user), Some(ts)) = (&event.channel, &event.user, &event.ts) else {
            return Err(Error::Malformed(format!(
                "message event on {team} is missing its channel, user or ts"
            )));
        };
        let ts: EventTimestamp = ts.parse().map_err(Error::Malformed)?;
        let text = event.text.as_deref().unwrap_or_default();

        tracing::info!(team, channel = %channel, "Received message {ts}");

        let tenant = require_team(self.store.as_ref(), team)?;
        if !tenant.is_provisioned() {
            tracing::warn!(team, "Skipping event for a team without an SMS number");
            return Ok(EventOutcome::Skipped("team has no SMS number".to_string()));
        }

        let policy = self.settings.watermark;
        if !policy.admits(tenant.watermark(policy.scope, channel), &ts) {
            tracing::info!(team, "Skipping potentially duplicate event {ts}");
            return Ok(EventOutcome::Duplicate);
        }

        let chat = TenantChat::new(Arc::clone(&self.chat), &tenant.chat);
        let channel_name = chat.bot().channel_name(channel).await?;
        let author = chat.bot().user_profile(user).await?.real_name;

        // Claiming happens after the lookups so a failed lookup can be redelivered.
        let tenant = if policy.enabled {
            let (claimed, advanced) = modify_tenant(
                self.store.as_ref(),
                team,
                self.settings.conflict_attempts,
                |tenant| tenant.advance_watermark(&policy, channel, ts),
            )?;
            if !advanced {
                tracing::info!(team, "Skipping potentially duplicate event {ts}");
                return Ok(EventOutcome::Duplicate);
            }
            claimed
        } else {
            tenant
        };

        let message = format_relay(&channel_name, &author, text);
        let report = self.fan_out(&chat, &tenant, channel, &message).await;
        Ok(EventOutcome::Delivered(report))
    }

    /// Sends `message` to each subscriber in turn. A failure for one
    /// recipient is recorded and does not stop the others.
    async fn fan_out(
        &self,
        chat: &TenantChat,
        tenant: &Tenant,
        channel: &str,
        message: &str,
    ) -> FanoutReport {
        let recipients = tenant.recipients(channel);
        tracing::info!(
            team = %tenant.team,
            channel,
            "Sending SMS to {} recipients",
            recipients.len()
        );

        let mut report = FanoutReport {
            attempted: recipients.len(),
            ..FanoutReport::default()
        };

        for user in recipients {
            let result = match chat.bot().phone_of(&user).await {
                Ok(Some(number)) => self.outbound.send_for(tenant, &number, message).await,
                Ok(None) => Err(Error::Malformed(format!("{user} has no phone number"))),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => report.sent += 1,
                Err(error) => {
                    tracing::warn!(team = %tenant.team, "Failed to text {user}: {error}");
                    report.failures.push(RecipientFailure { user, error });
                }
            }
        }

        report
    }
}
