use serde::{Deserialize, Serialize};

/// Body of a chat platform Events API webhook.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatEventPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: Option<ChatEvent>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

/// Form body of a slash command invocation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlashCommand {
    #[serde(default)]
    pub token: Option<String>,
    pub team_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub command: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub text: String,
}

impl CommandReply {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Form body of the carrier's inbound message webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundSms {
    #[serde(rename = "AccountSid")]
    pub account_id: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboundSmsRequest {
    pub team: String,
    pub number: String,
    pub message: String,
}

/// Tokens obtained from a completed OAuth code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallRequest {
    pub team_id: String,
    pub access_token: String,
    pub bot_access_token: String,
    pub bot_user_id: String,
    /// The user who authorized the install, greeted after installing.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallResponse {
    pub id: String,
    pub team: String,
}
