use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::CarrierGateway;
use crate::error::{Error, Result};
use crate::types::CarrierCredentials;

pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Twilio Programmable Messaging over REST.
#[derive(Debug, Clone)]
pub struct TwilioGateway {
    http: Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl TwilioGateway {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self, account_id: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, account_id
        )
    }
}

#[async_trait]
impl CarrierGateway for TwilioGateway {
    async fn send(
        &self,
        credentials: &CarrierCredentials,
        from: &str,
        to: &str,
        body: &str,
    ) -> Result<()> {
        let resp = self
            .http
            .post(self.messages_url(&credentials.account_id))
            .basic_auth(&credentials.account_id, Some(&credentials.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<TwilioError>(&text)
                .ok()
                .and_then(|e| match (e.code, e.message) {
                    (Some(code), Some(message)) => Some(format!("{code}: {message}")),
                    (None, Some(message)) => Some(message),
                    _ => None,
                })
                .unwrap_or(text);
            return Err(Error::Upstream(format!(
                "carrier rejected message to {to} with status {status}: {reason}"
            )));
        }

        let message: MessageResource = resp.json().await?;
        tracing::debug!(
            sid = %message.sid,
            status = message.status.as_deref().unwrap_or("unknown"),
            "Queued SMS to {to}"
        );
        Ok(())
    }
}
