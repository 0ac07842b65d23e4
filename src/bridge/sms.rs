use std::sync::Arc;

use crate::carrier::CarrierGateway;
use crate::chat::{ChatConnector, PostMessage, TenantChat};
use crate::error::{Error, Result};
use crate::store::{TenantStore, require_team};
use crate::types::phone::digits;
use crate::types::{InboundSms, Tenant};

/// Sends SMS on behalf of a tenant, from the tenant's own number.
#[derive(Clone)]
pub struct OutboundSms {
    store: Arc<dyn TenantStore>,
    carrier: Arc<dyn CarrierGateway>,
    send_token: Option<Arc<str>>,
}

impl OutboundSms {
    #[must_use]
    pub fn new(store: Arc<dyn TenantStore>, carrier: Arc<dyn CarrierGateway>) -> Self {
        Self {
            store,
            carrier,
            send_token: None,
        }
    }

    /// Token external callers must present to send. Without one, only
    /// in-process callers can send.
    #[must_use]
    pub fn with_send_token(mut self, token: Option<String>) -> Self {
        self.send_token = token.map(Arc::from);
        self
    }

    /// Checks a token presented by an external caller.
    pub fn authorize(&self, presented: Option<&str>) -> Result<()> {
        let Some(expected) = self.send_token.as_deref() else {
            return Err(Error::Unauthorized("outbound sending is disabled".to_string()));
        };
        if presented != Some(expected) {
            tracing::warn!("Rejected outbound SMS request with a bad token");
            return Err(Error::Unauthorized("invalid send token".to_string()));
        }
        Ok(())
    }

    pub async fn send(&self, team: &str, number: &str, message: &str) -> Result<()> {
        let tenant = require_team(self.store.as_ref(), team)?;
        self.send_for(&tenant, number, message).await
    }

    /// Like [`OutboundSms::send`] for a tenant that is already loaded.
    pub async fn send_for(&self, tenant: &Tenant, number: &str, message: &str) -> Result<()> {
        let (Some(carrier), Some(from)) = (&tenant.carrier, tenant.phone_number.as_deref()) else {
            return Err(Error::NotProvisioned(format!(
                "team {} has no SMS number",
                tenant.team
            )));
        };

        let to = digits(number);
        if to.is_empty() {
            return Err(Error::Malformed(format!("'{number}' is not a phone number")));
        }

        tracing::debug!(team = %tenant.team, "Sending SMS to {to}");
        self.carrier.send(carrier, from, &to, message).await
    }
}

/// The `#channel` a text message is addressed to, and what is left of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTag {
    pub channel: String,
    pub text: String,
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Finds the first `#name` tag anywhere in `body`.
///
/// The tag is cut out and the text on either side of it is trimmed and
/// rejoined with a single space. Channel names are lowercased.
#[must_use]
pub fn extract_channel_tag(body: &str) -> Option<ChannelTag> {
    for (start, c) in body.char_indices() {
        if c != '#' {
            continue;
        }

        let rest = &body[start + 1..];
        let len = rest.find(|c: char| !is_tag_char(c)).unwrap_or(rest.len());
        if len == 0 {
            continue;
        }

        let before = body[..start].trim();
        let after = rest[len..].trim();
        let text = match (before.is_empty(), after.is_empty()) {
            (true, _) => after.to_string(),
            (_, true) => before.to_string(),
            _ => format!("{before} {after}"),
        };

        return Some(ChannelTag {
            channel: rest[..len].to_ascii_lowercase(),
            text,
        });
    }
    None
}

/// Where an inbound text message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedSms {
    pub team: String,
    pub channel: String,
    pub user: String,
}

/// Relays carrier webhooks into the sender's workspace.
#[derive(Clone)]
pub struct SmsInboundRouter {
    store: Arc<dyn TenantStore>,
    chat: Arc<dyn ChatConnector>,
}

impl SmsInboundRouter {
    #[must_use]
    pub fn new(store: Arc<dyn TenantStore>, chat: Arc<dyn ChatConnector>) -> Self {
        Self { store, chat }
    }

    pub async fn handle(&self, sms: &InboundSms) -> Result<PostedSms> {
        let tenant = self.resolve_tenant(sms)?;
        let chat = TenantChat::new(Arc::clone(&self.chat), &tenant.chat);

        let sender = chat
            .bot()
            .user_by_phone(&sms.from)
            .await?
            .ok_or_else(|| {
                Error::Unauthorized(format!("Unknown source phone number: {}", digits(&sms.from)))
            })?;

        let tag = extract_channel_tag(&sms.body).ok_or_else(|| {
            Error::Malformed(format!(
                "message from {} does not name a #channel",
                digits(&sms.from)
            ))
        })?;
        if tag.text.is_empty() {
            return Err(Error::Malformed(format!(
                "message from {} to #{} is empty",
                digits(&sms.from),
                tag.channel
            )));
        }

        tracing::info!(team = %tenant.team, user = %sender.id, "Relaying SMS to #{}", tag.channel);
        chat.bot()
            .post_message(&PostMessage {
                channel: format!("#{}", tag.channel),
                text: tag.text,
                username: Some(format!("{} (via SMS)", sender.real_name)),
                icon_url: sender.image_192.clone(),
            })
            .await?;

        Ok(PostedSms {
            team: tenant.team,
            channel: tag.channel,
            user: sender.id,
        })
    }

    /// Resolves the tenant by carrier account and checks that the
    /// destination number does not belong to someone else.
    fn resolve_tenant(&self, sms: &InboundSms) -> Result<Tenant> {
        let tenant = self
            .store
            .find_by_carrier_account(&sms.account_id)?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Unknown account SID {}. Incoming phone number {}",
                    sms.account_id, sms.to
                ))
            })?;

        match self.store.find_by_phone(&sms.to)? {
            Some(owner) if owner.id != tenant.id => {
                return Err(Error::Inconsistent(format!(
                    "account {} belongs to team {} but {} belongs to team {}",
                    sms.account_id, tenant.team, sms.to, owner.team
                )));
            }
            Some(_) => {}
            None => tracing::warn!(
                team = %tenant.team,
                "Incoming number {} is not the team's SMS number",
                sms.to
            ),
        }

        Ok(tenant)
    }
}
