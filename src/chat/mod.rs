//! Chat platform capabilities consumed by the bridge.

mod slack;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ChatCredentials;

pub use slack::{DEFAULT_SLACK_API_BASE, SlackClient, SlackConnector};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    /// Handle, e.g. `alice`.
    pub name: String,
    /// Display name, e.g. `Alice Smith`.
    pub real_name: String,
    pub phone: Option<String>,
    pub image_192: Option<String>,
    pub is_admin: bool,
}

impl UserProfile {
    /// The phone number, if the profile has a non-blank one.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// A message posted under a custom identity rather than the bot's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostMessage {
    /// Channel id or bare channel name.
    pub channel: String,
    pub text: String,
    pub username: Option<String>,
    pub icon_url: Option<String>,
}

/// Directory and messaging calls, bound to one credential.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn channel_name(&self, channel: &str) -> Result<String>;

    async fn user_profile(&self, user: &str) -> Result<UserProfile>;

    /// The user's profile phone, `None` when blank.
    async fn phone_of(&self, user: &str) -> Result<Option<String>>;

    /// The first user whose profile phone matches `phone`.
    async fn user_by_phone(&self, phone: &str) -> Result<Option<UserProfile>>;

    async fn post_message(&self, message: &PostMessage) -> Result<()>;

    async fn is_member(&self, user: &str, channel: &str) -> Result<bool>;

    async fn invite(&self, user: &str, channel: &str) -> Result<()>;

    async fn send_direct_message(&self, user: &str, text: &str) -> Result<()>;
}

/// Hands out directories bound to a given access token.
#[cfg_attr(test, automock)]
pub trait ChatConnector: Send + Sync {
    fn connect(&self, token: &str) -> Arc<dyn ChatDirectory>;
}

/// A tenant's chat access: bot-level by default, installer-level on request.
#[derive(Clone)]
pub struct TenantChat {
    connector: Arc<dyn ChatConnector>,
    credentials: ChatCredentials,
    bot: Arc<dyn ChatDirectory>,
}

impl TenantChat {
    #[must_use]
    pub fn new(connector: Arc<dyn ChatConnector>, credentials: &ChatCredentials) -> Self {
        let bot = connector.connect(&credentials.bot_access_token);
        Self {
            connector,
            credentials: credentials.clone(),
            bot,
        }
    }

    /// The bot-level directory.
    #[must_use]
    pub fn bot(&self) -> &dyn ChatDirectory {
        self.bot.as_ref()
    }

    #[must_use]
    pub fn bot_user_id(&self) -> &str {
        &self.credentials.bot_user_id
    }

    /// A directory bound to the installing user's token. It is a separate
    /// value from [`TenantChat::bot`]; dropping it ends the override.
    #[must_use]
    pub fn elevated(&self) -> Arc<dyn ChatDirectory> {
        self.connector.connect(&self.credentials.user_access_token)
    }

    /// Adds the bot user to `channel` when it is not already a member.
    /// Returns whether an invite was sent.
    pub async fn ensure_bot_in_channel(&self, channel: &str) -> Result<bool> {
        if self.bot().is_member(self.bot_user_id(), channel).await? {
            return Ok(false);
        }

        tracing::info!(channel, bot = self.bot_user_id(), "Inviting bot to channel");
        let elevated = self.elevated();
        elevated.invite(self.bot_user_id(), channel).await?;
        Ok(true)
    }
}
